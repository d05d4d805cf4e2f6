// bundlelens - log signature histograms and gflag drift for support bundles

mod sources;

use bundlelens_analyzer::{load_config, AnalysisRunner, AnalysisSummary, HistogramRequest};
use bundlelens_core::extract::PredicateSpec;
use bundlelens_core::{HistogramView, MessageStats};
use bundlelens_drift::{DiffKind, DriftReport, RelatedReport, ReportRecord};
use chrono::{DateTime, NaiveDateTime, Utc};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Table};
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const DEFAULT_CONFIG: &str = "config/log-rules.toml";

// report id used for files analysed from the command line
const LOCAL_REPORT: &str = "local";

#[derive(Parser)]
#[command(name = "bundlelens")]
#[command(version = "0.1.0")]
#[command(about = "Log signature histograms and configuration drift for support bundles", long_about = None)]
struct Cli {
    /// Rules configuration (TOML)
    #[arg(short, long, env = "BUNDLELENS_CONFIG", default_value = DEFAULT_CONFIG, global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SourceArgs {
    /// Log files; the parent directory names the node
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Year for glog headers, which carry none
    #[arg(short, long, default_value_t = chrono::Datelike::year(&Utc::now()), value_parser = clap::value_parser!(i32).range(1..=9999))]
    year: i32,

    /// Process type for every file instead of inferring it from the name
    #[arg(long)]
    process_type: Option<String>,

    /// Comma-separated regexes used instead of the configured rules; each names its own events
    #[arg(long, value_delimiter = ',')]
    patterns: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration and list rules per process type
    Rules,

    /// Classify log files and print per-signature histograms
    Histogram {
        #[command(flatten)]
        sources: SourceArgs,

        /// Bucket size in minutes
        #[arg(short, long, default_value = "1")]
        interval: u32,

        /// Range start (RFC 3339 or "YYYY-MM-DD HH:MM:SS", UTC)
        #[arg(long, value_parser = parse_time)]
        start: Option<DateTime<Utc>>,

        /// Range end
        #[arg(long, value_parser = parse_time)]
        end: Option<DateTime<Utc>>,

        /// Only this node ("all" for every node)
        #[arg(short, long)]
        node: Option<String>,

        /// Only this process type ("all" for every type)
        #[arg(short, long)]
        process: Option<String>,

        /// Sum every node under "all"
        #[arg(long)]
        merge_nodes: bool,

        /// Sum every process type under "all"
        #[arg(long)]
        merge_processes: bool,

        /// Omit empty buckets
        #[arg(long)]
        sparse: bool,

        /// Print the full view as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the latest observed timestamp and the default query window
    Latest {
        #[command(flatten)]
        sources: SourceArgs,
    },

    /// Flag drift across the report's cluster history
    Drift {
        /// JSON array of stored report records
        #[arg(short, long)]
        records: PathBuf,

        /// Report id
        #[arg(short = 'R', long)]
        report: Uuid,

        #[arg(long)]
        json: bool,
    },

    /// Reports of the same cluster and of the same organization
    Related {
        #[arg(short, long)]
        records: PathBuf,

        #[arg(short = 'R', long)]
        report: Uuid,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    match cli.command {
        Commands::Rules => show_rules(&cli.config)?,
        Commands::Histogram {
            sources,
            interval,
            start,
            end,
            node,
            process,
            merge_nodes,
            merge_processes,
            sparse,
            json,
        } => {
            let request = HistogramRequest {
                interval_minutes: interval,
                start,
                end,
                node,
                process_type: process,
                merge_nodes,
                merge_process_types: merge_processes,
                sparse,
            };
            show_histogram(&cli.config, &sources, &request, json).await?;
        }
        Commands::Latest { sources } => show_latest(&cli.config, &sources).await?,
        Commands::Drift {
            records,
            report,
            json,
        } => show_drift(&cli.config, &records, report, json)?,
        Commands::Related { records, report } => show_related(&cli.config, &records, report)?,
    }
    Ok(())
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|e| format!("invalid time '{}': {}", value, e))
}

fn show_rules(config_path: &Path) -> Result<(), Box<dyn Error>> {
    let config = load_config(config_path)?;
    // compile everything so a bad rule fails here, not mid-analysis
    config.build_registry()?;

    println!("\n{} {}", "Rules:".cyan().bold(), config_path.display());

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Process", "#", "Rule", "Match", "Measures"]);

    for (process_type, process) in &config.processes {
        for (i, rule) in process.rules.iter().enumerate() {
            let matcher = match &rule.predicate {
                PredicateSpec::Contains { text, .. } => format!("contains \"{}\"", text),
                PredicateSpec::Regex { pattern } => format!("regex /{}/", pattern),
            };
            table.add_row(vec![
                process_type.clone(),
                (i + 1).to_string(),
                rule.name.clone(),
                matcher,
                if rule.measurement.is_some() { "yes" } else { "-" }.to_string(),
            ]);
        }
    }
    println!("{table}");
    println!(
        "{} {}",
        "Histogram intervals:".dimmed(),
        format!("{:?}", config.histogram.allowed_intervals).yellow()
    );
    Ok(())
}

async fn analyze(
    config_path: &Path,
    args: &SourceArgs,
) -> Result<(AnalysisRunner, AnalysisSummary), Box<dyn Error>> {
    let runner = if args.patterns.is_empty() {
        AnalysisRunner::from_path(config_path)?
    } else {
        AnalysisRunner::with_patterns(load_config(config_path)?, &args.patterns)?
    };
    let sources = sources::load_sources(&args.files, args.year, args.process_type.as_deref())?;
    let summary = runner.analyze(LOCAL_REPORT, sources).await?;
    Ok((runner, summary))
}

fn print_summary(summary: &AnalysisSummary) {
    println!(
        "{} {} | {} {} | {} {}",
        "Lines:".dimmed(),
        summary.lines.to_string().yellow(),
        "Events:".dimmed(),
        summary.events.to_string().green(),
        "Unmatched:".dimmed(),
        summary.dropped.to_string().yellow()
    );
}

async fn show_histogram(
    config_path: &Path,
    args: &SourceArgs,
    request: &HistogramRequest,
    json: bool,
) -> Result<(), Box<dyn Error>> {
    let (runner, summary) = analyze(config_path, args).await?;
    let view = runner.histogram(LOCAL_REPORT, request)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    println!("\n{}", "Signature histogram".cyan().bold());
    println!("{}", "─".repeat(60).dimmed());
    print_summary(&summary);

    if view.is_empty() {
        println!("{}", "No classified events in range.".yellow());
        return Ok(());
    }
    println!("{}", histogram_table(&view));
    Ok(())
}

fn fmt_measurement(value: Option<f64>) -> String {
    value.map(|v| format!("{:.1}", v)).unwrap_or_else(|| "-".to_string())
}

// peak bucket count and its start
fn peak(stats: &MessageStats) -> String {
    stats
        .histogram
        .iter()
        .max_by_key(|(_, count)| **count)
        .map(|(at, count)| format!("{} @ {}", count, at.format("%m-%d %H:%M")))
        .unwrap_or_else(|| "-".to_string())
}

fn histogram_table(view: &HistogramView) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        "Node", "Process", "Signature", "Count", "Peak", "First", "Last", "Avg", "Min", "Max",
    ]);

    for (node, processes) in view {
        for (process_type, signatures) in processes {
            for (signature, stats) in signatures {
                table.add_row(vec![
                    node.clone(),
                    process_type.clone(),
                    signature.clone(),
                    stats.total_count.to_string(),
                    peak(stats),
                    stats.first_occurrence.format("%Y-%m-%d %H:%M:%S").to_string(),
                    stats.last_occurrence.format("%Y-%m-%d %H:%M:%S").to_string(),
                    fmt_measurement(stats.avg_measurement()),
                    fmt_measurement(stats.min_measurement()),
                    fmt_measurement(stats.max_measurement()),
                ]);
            }
        }
    }
    table
}

async fn show_latest(config_path: &Path, args: &SourceArgs) -> Result<(), Box<dyn Error>> {
    let (runner, summary) = analyze(config_path, args).await?;
    print_summary(&summary);

    match runner.default_window(LOCAL_REPORT)? {
        Some((start, end)) => {
            println!("{} {}", "Latest:".green().bold(), end.to_rfc3339());
            println!(
                "{} {} .. {}",
                "Default window:".dimmed(),
                start.to_rfc3339().cyan(),
                end.to_rfc3339().cyan()
            );
        }
        None => println!("{}", "No classified events.".yellow()),
    }
    Ok(())
}

fn load_records(path: &Path) -> Result<Vec<ReportRecord>, Box<dyn Error>> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn show_drift(
    config_path: &Path,
    records_path: &Path,
    report_id: Uuid,
    json: bool,
) -> Result<(), Box<dyn Error>> {
    let runner = AnalysisRunner::from_path(config_path)?;
    let records = load_records(records_path)?;
    let drift = runner.drift(report_id, &records)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&drift)?);
        return Ok(());
    }

    println!("\n{} {}", "GFlag drift for".cyan().bold(), report_id);
    println!("{}", "─".repeat(60).dimmed());
    if drift.is_empty() {
        println!("{}", "No flag snapshots in this cluster's history.".yellow());
        return Ok(());
    }
    print_drift(&drift);
    Ok(())
}

fn print_drift(drift: &DriftReport) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Node", "Role", "Bundle", "Time", "Type", "Added", "Removed", "Modified"]);

    // busiest nodes first
    for (node, _) in drift.nodes_by_activity() {
        for lineage in drift.lineages.iter().filter(|l| l.node == node) {
            for entry in &lineage.entries {
                let kind = match entry.diff.kind {
                    DiffKind::Initial => "initial".dimmed().to_string(),
                    DiffKind::Delta if entry.diff.is_empty() => "unchanged".to_string(),
                    DiffKind::Delta => "delta".yellow().to_string(),
                };
                table.add_row(vec![
                    lineage.node.clone(),
                    lineage.role.clone(),
                    entry.bundle.clone(),
                    entry.timestamp.format("%Y-%m-%d %H:%M").to_string(),
                    kind,
                    entry.diff.added.len().to_string(),
                    entry.diff.removed.len().to_string(),
                    entry.diff.modified.len().to_string(),
                ]);
            }
        }
    }
    println!("{table}");

    for lineage in &drift.lineages {
        for entry in lineage.entries.iter().filter(|e| !e.diff.is_empty()) {
            println!(
                "\n{} {}/{} {}",
                "▸".cyan(),
                lineage.node,
                lineage.role,
                entry.bundle.dimmed()
            );
            for (name, value) in &entry.diff.added {
                println!("  {} {} = {}", "+".green(), name, value);
            }
            for (name, value) in &entry.diff.removed {
                println!("  {} {} = {}", "-".red(), name, value);
            }
            for (name, change) in &entry.diff.modified {
                println!("  {} {}: {} → {}", "~".yellow(), name, change.old, change.new);
            }
        }
    }

    println!("\n{}", "Per role".dimmed());
    for (role, counts) in &drift.role_summary {
        println!(
            "  {:<12} {} {} {}",
            role,
            format!("+{}", counts.added).green(),
            format!("-{}", counts.removed).red(),
            format!("~{}", counts.modified).yellow()
        );
    }
}

fn related_table(reports: &[RelatedReport]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Report", "Bundle", "Cluster", "Organization", "Created"]);
    for r in reports {
        table.add_row(vec![
            r.id.to_string(),
            r.bundle.clone(),
            r.cluster_name
                .clone()
                .unwrap_or_else(|| r.cluster_uuid.to_string()),
            r.organization.clone(),
            r.created_at.format("%Y-%m-%d %H:%M").to_string(),
        ]);
    }
    table
}

fn show_related(config_path: &Path, records_path: &Path, report_id: Uuid) -> Result<(), Box<dyn Error>> {
    let runner = AnalysisRunner::from_path(config_path)?;
    let records = load_records(records_path)?;
    let related = runner.related(report_id, &records)?;

    println!("\n{}", "Same cluster".cyan().bold());
    if related.same_cluster.is_empty() {
        println!("{}", "None.".yellow());
    } else {
        println!("{}", related_table(&related.same_cluster));
    }

    println!("\n{}", "Same organization, other clusters".cyan().bold());
    if related.same_organization.is_empty() {
        println!("{}", "None.".yellow());
    } else {
        println!("{}", related_table(&related.same_organization));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patterns_split_on_commas() {
        let cli = Cli::try_parse_from([
            "bundlelens",
            "histogram",
            "n1/yb-tserver.INFO",
            "--patterns",
            "took a long time,tablet \\S+ not found",
        ])
        .unwrap();
        let Commands::Histogram { sources, .. } = cli.command else {
            panic!("expected histogram");
        };
        assert_eq!(sources.patterns, vec!["took a long time", "tablet \\S+ not found"]);
    }

    #[test]
    fn test_year_out_of_range_rejected() {
        assert!(Cli::try_parse_from(["bundlelens", "latest", "f.INFO", "--year", "400000"]).is_err());
        assert!(Cli::try_parse_from(["bundlelens", "latest", "f.INFO", "--year", "2024"]).is_ok());
    }
}
