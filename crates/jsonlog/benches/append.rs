use core::fmt;
use std::path::Path;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, SamplingMode, Throughput};
use serde_json::json;

use goatdb_jsonlog::{open, Handle, Options, Record};
use goatdb_vfs::Opfs;

struct Params {
    payload_len: usize,
    records_per_batch: usize,
    batches: usize,
}

impl Params {
    fn total_records(&self) -> u64 {
        (self.records_per_batch * self.batches) as u64
    }
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "payload={} records/batch={} batches={}",
            self.payload_len, self.records_per_batch, self.batches
        )
    }
}

fn record(id: u64, payload_len: usize) -> Record {
    Record::from_value(&json!({ "id": format!("r{id}"), "data": "z".repeat(payload_len) })).unwrap()
}

fn bench_append(c: &mut Criterion, label: &str, params: Params) {
    let id = BenchmarkId::from_parameter(&params);
    c.benchmark_group(label)
        .sample_size(10)
        .sampling_mode(SamplingMode::Flat)
        .throughput(Throughput::Elements(params.total_records()))
        .bench_with_input(id, &params, |b, params| {
            let fs = Opfs::new();
            let mut log = open(&fs, Path::new("/bench.jsonlog"), true, Options::default()).unwrap();
            let mut next_id = 0u64;

            b.iter(|| {
                for _ in 0..params.batches {
                    let batch = (0..params.records_per_batch)
                        .map(|_| {
                            next_id += 1;
                            record(next_id, params.payload_len)
                        })
                        .collect();
                    log.append(batch).unwrap();
                }
                log.flush().unwrap();
            })
        });
}

fn scan_all(log: &mut Handle<Opfs>) -> usize {
    let mut cursor = log.begin_scan().unwrap();
    let mut count = 0;
    loop {
        let (batch, done) = log.scan(&mut cursor).unwrap();
        count += batch.len();
        if done {
            return count;
        }
    }
}

fn bench_scan(c: &mut Criterion, label: &str, params: Params) {
    let id = BenchmarkId::from_parameter(&params);
    c.benchmark_group(label)
        .sample_size(10)
        .sampling_mode(SamplingMode::Flat)
        .throughput(Throughput::Elements(params.total_records()))
        .bench_with_input(id, &params, |b, params| {
            let fs = Opfs::new();
            let mut log = open(&fs, Path::new("/bench.jsonlog"), true, Options::default()).unwrap();
            let mut next_id = 0u64;
            for _ in 0..params.batches {
                let batch = (0..params.records_per_batch)
                    .map(|_| {
                        next_id += 1;
                        record(next_id, params.payload_len)
                    })
                    .collect();
                log.append(batch).unwrap();
            }

            b.iter(|| {
                assert_eq!(scan_all(&mut log) as u64, params.total_records());
            })
        });
}

fn small_records(c: &mut Criterion) {
    bench_append(
        c,
        "append small",
        Params {
            payload_len: 64,
            records_per_batch: 16,
            batches: 64,
        },
    );
}

fn large_records(c: &mut Criterion) {
    bench_append(
        c,
        "append large",
        Params {
            payload_len: 4096,
            records_per_batch: 16,
            batches: 64,
        },
    );
}

fn scan_small_records(c: &mut Criterion) {
    bench_scan(
        c,
        "scan small",
        Params {
            payload_len: 64,
            records_per_batch: 100,
            batches: 100,
        },
    );
}

criterion_group!(benches, small_records, large_records, scan_small_records);
criterion_main!(benches);
