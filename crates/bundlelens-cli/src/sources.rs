// Local log files -> LogSource, one per file

use bundlelens_analyzer::LogSource;
use bundlelens_core::{LineClock, ProcessKind};
use indicatif::{ProgressBar, ProgressStyle};
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// node name is the file's parent directory, e.g. `bundle/n1/yb-tserver.INFO` -> `n1`
pub fn node_name(path: &Path) -> String {
    path.parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .unwrap_or("local")
        .to_string()
}

pub fn process_type(path: &Path, process_override: Option<&str>) -> Result<String, Box<dyn Error>> {
    if let Some(p) = process_override {
        return Ok(p.to_string());
    }
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    let kind = ProcessKind::infer(file_name).ok_or_else(|| {
        format!(
            "cannot infer process type of {} (use --process-type)",
            path.display()
        )
    })?;
    Ok(kind.as_str().to_string())
}

pub fn load_sources(
    files: &[PathBuf],
    year: i32,
    process_override: Option<&str>,
) -> Result<Vec<LogSource>, Box<dyn Error>> {
    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")?
            .progress_chars("#>-"),
    );

    let mut sources = Vec::with_capacity(files.len());
    for path in files {
        let bytes = fs::read(path)?;
        let text = String::from_utf8_lossy(&bytes);
        let node = node_name(path);
        let process_type = process_type(path, process_override)?;

        // each file has its own continuation state
        let mut clock = LineClock::new(year).ok_or_else(|| format!("year {} is out of range", year))?;
        let source = LogSource::from_text(&node, &process_type, &text, &mut clock);
        debug!(file = %path.display(), node = %node, process_type = %process_type, lines = source.lines.len(), "File loaded");
        sources.push(source);
        pb.inc(1);
    }
    pb.finish_and_clear();
    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_and_process_from_path() {
        let path = Path::new("bundle/yb-node-2/yb-tserver.host.log.INFO.20240301-120000.1");
        assert_eq!(node_name(path), "yb-node-2");
        assert_eq!(process_type(path, None).unwrap(), "tserver");
        assert_eq!(process_type(path, Some("master")).unwrap(), "master");
        assert!(process_type(Path::new("dmesg"), None).is_err());
        assert_eq!(node_name(Path::new("yb-master.INFO")), "local");
    }
}
