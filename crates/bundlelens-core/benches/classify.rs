//! Benchmark for classification and histogram queries
//! Run: cargo bench -p bundlelens-core --bench classify

use bundlelens_core::extract::{
    compile_rules, MeasurementSpec, PredicateSpec, RuleSpec, SignatureSpec,
};
use bundlelens_core::{
    classify, EventIndex, HistogramQuery, LineClock, LogLine, RuleRegistry,
};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;

const SLOW_OP: &str = "W0301 12:00:01.250000 2271 log.cc:880] Time spent Fsync log took a long time (512ms)";
const NOT_FOUND: &str = "E0301 12:00:02.000000 2271 tablet_service.cc:310] Tablet 3c1a not found";
const NOISE: &str = "I0301 12:00:03.000000 2271 heartbeater.cc:500] Sending heartbeat to master";

fn tserver_rules() -> Vec<RuleSpec> {
    vec![
        RuleSpec {
            name: "slow_operation".to_string(),
            predicate: PredicateSpec::Contains {
                text: "took a long time".to_string(),
                ignore_case: false,
            },
            signature: SignatureSpec::TokensBefore {
                phrase: "took a long time".to_string(),
                min_tokens: 1,
                max_tokens: 2,
            },
            fallback: Some(SignatureSpec::Fixed {
                name: "slow_operation".to_string(),
            }),
            measurement: Some(MeasurementSpec::Duration),
        },
        RuleSpec {
            name: "tablet_not_found".to_string(),
            predicate: PredicateSpec::Regex {
                pattern: r"tablet \S+ not found".to_string(),
            },
            signature: SignatureSpec::Fixed {
                name: "tablet_not_found".to_string(),
            },
            fallback: None,
            measurement: None,
        },
    ]
}

fn registry() -> RuleRegistry {
    let mut registry = RuleRegistry::new();
    registry.register("tserver", compile_rules(&tserver_rules()).unwrap());
    registry
}

fn bench_classify_single(c: &mut Criterion) {
    let rules = compile_rules(&tserver_rules()).unwrap();
    let clock = LineClock::new(2024).unwrap();

    let mut group = c.benchmark_group("classify_single");
    for (label, raw) in [("slow_op", SLOW_OP), ("not_found", NOT_FOUND), ("noise", NOISE)] {
        let ts = clock.parse_header(raw).unwrap();
        let line = LogLine::new("n1", "tserver", ts, raw);
        group.bench_function(label, |b| b.iter(|| classify(black_box(&line), &rules)));
    }
    group.finish();
}

fn bench_header_parsing(c: &mut Criterion) {
    let clock = LineClock::new(2024).unwrap();

    c.bench_function("glog_header", |b| {
        b.iter(|| clock.parse_header(black_box(SLOW_OP)))
    });
}

fn sample_lines(size: usize) -> Vec<LogLine> {
    let clock = LineClock::new(2024).unwrap();
    let base = clock.parse_header(SLOW_OP).unwrap();
    (0..size)
        .map(|i| {
            let raw = match i % 3 {
                0 => SLOW_OP,
                1 => NOT_FOUND,
                _ => NOISE,
            };
            LogLine::new(
                format!("n{}", i % 3),
                "tserver",
                base + chrono::Duration::seconds(i as i64),
                raw,
            )
        })
        .collect()
}

fn bench_batch_classify(c: &mut Criterion) {
    let registry = registry();
    let batch_sizes = [100, 1000, 10000];

    let mut group = c.benchmark_group("batch_classify");
    for size in batch_sizes {
        let lines = sample_lines(size);

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("tserver", size), &lines, |b, lines| {
            b.iter(|| registry.classify_batch(lines))
        });
    }
    group.finish();
}

fn bench_histogram(c: &mut Criterion) {
    let registry = registry();
    let events = registry.classify_batch(&sample_lines(10_000)).unwrap().events;
    let index = EventIndex::new(events);

    let mut group = c.benchmark_group("histogram");
    for interval in [1u32, 15, 60] {
        let query = HistogramQuery::new(interval);
        group.bench_with_input(BenchmarkId::new("dense", interval), &query, |b, q| {
            b.iter(|| index.histogram(black_box(q)))
        });
    }
    group.bench_function("merged_sparse", |b| {
        let query = HistogramQuery::new(5).merge_nodes().sparse();
        b.iter(|| index.histogram(black_box(&query)))
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_classify_single,
    bench_header_parsing,
    bench_batch_classify,
    bench_histogram,
);

criterion_main!(benches);
