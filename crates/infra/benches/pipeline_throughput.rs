use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use feedcheck_core::{Span, Timestamp};
use feedcheck_infra::pipeline::{
    BenchSink, BufferEntry, ChangeRow, Encoder, Envelope, JsonEncoder, PipelineHarness,
    ResolvedSpan, ScriptedDiscovery,
};
use std::sync::Arc;

const SPANS: [(&str, &str); 4] = [("a", "f"), ("f", "m"), ("m", "t"), ("t", "z")];

fn spans() -> Vec<Span> {
    SPANS
        .iter()
        .map(|(start, end)| Span::new(*start, *end).unwrap())
        .collect()
}

/// `rows` changes, with every span resolved after each block of 100.
fn script(rows: usize) -> Vec<BufferEntry> {
    let mut entries = Vec::with_capacity(rows + rows / 100 * SPANS.len() + SPANS.len());
    for i in 0..rows {
        entries.push(BufferEntry::Row(ChangeRow {
            topic: "orders".to_string(),
            key: format!("[{i}]").into_bytes(),
            value: format!("{{\"id\":{i},\"qty\":{}}}", i % 17).into_bytes(),
            updated: Timestamp::new(i as i64, 0),
        }));
        if i % 100 == 99 {
            entries.extend(resolve_all(i as i64));
        }
    }
    entries.extend(resolve_all(rows as i64));
    entries
}

fn resolve_all(wall: i64) -> impl Iterator<Item = BufferEntry> {
    spans().into_iter().map(move |span| {
        BufferEntry::Resolved(ResolvedSpan {
            span,
            ts: Timestamp::new(wall, 0),
        })
    })
}

fn bench_pipeline_throughput(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("pipeline_throughput");

    for rows in [100usize, 1_000, 10_000] {
        let entries = script(rows);
        group.throughput(Throughput::Elements(rows as u64));
        group.bench_with_input(BenchmarkId::new("wrapped_json", rows), &entries, |b, entries| {
            b.iter(|| {
                rt.block_on(async {
                    let sink = Arc::new(BenchSink::new());
                    let harness = PipelineHarness::new(
                        Arc::new(JsonEncoder::default()),
                        sink.clone(),
                        spans(),
                    )
                    .unwrap();
                    harness
                        .spawn(ScriptedDiscovery::new(entries.clone()))
                        .join()
                        .await
                        .unwrap();
                    black_box(sink.wait_for_emit())
                })
            });
        });
    }

    group.finish();
}

fn bench_row_encoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("row_encoding");
    let row = ChangeRow {
        topic: "orders".to_string(),
        key: b"[42]".to_vec(),
        value: br#"{"id":42,"qty":7,"sku":"A-100"}"#.to_vec(),
        updated: Timestamp::new(1_700_000_000_000_000_000, 3),
    };
    group.throughput(Throughput::Elements(1));

    for (name, envelope) in [
        ("row", Envelope::Row),
        ("wrapped", Envelope::Wrapped { updated: false }),
        ("wrapped_updated", Envelope::Wrapped { updated: true }),
    ] {
        let encoder = JsonEncoder::new(envelope);
        group.bench_function(name, |b| {
            b.iter(|| black_box(encoder.encode_value(black_box(&row)).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_pipeline_throughput, bench_row_encoding);
criterion_main!(benches);
