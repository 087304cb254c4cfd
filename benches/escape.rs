#[macro_use]
extern crate criterion;

use criterion::{BatchSize, Criterion, Throughput};
use tagwriter::escape;

fn bench_escape(c: &mut Criterion) {
    let cases: Vec<(&'static str, String)> = vec![
        ("ascii_short", "HelloWorld1234567890".to_string()),
        ("ascii_long", "a".repeat(4096)),
        (
            "markup_heavy",
            "<div class=\"x\">a &amp; b</div>".repeat(64),
        ),
        ("brackets", "]]>]] >]]".repeat(128)),
    ];

    let mut group = c.benchmark_group("write_text");
    for (name, data) in &cases {
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_function(*name, |b| {
            b.iter_batched(
                || Vec::with_capacity(data.len() * 2),
                |mut out| {
                    escape::write_text(&mut out, data).unwrap();
                    criterion::black_box(&out);
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();

    let mut group = c.benchmark_group("write_attribute_text_dquot");
    for (name, data) in &cases {
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_function(*name, |b| {
            b.iter_batched(
                || Vec::with_capacity(data.len() * 2),
                |mut out| {
                    escape::write_attribute_text_dquot(&mut out, data).unwrap();
                    criterion::black_box(&out);
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();

    let mut group = c.benchmark_group("write_cdata_chunk");
    for (name, data) in &cases {
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_function(*name, |b| {
            b.iter_batched(
                || Vec::with_capacity(data.len() * 2),
                |mut out| {
                    escape::write_cdata_chunk(&mut out, data).unwrap();
                    criterion::black_box(&out);
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

criterion_group!(benches, bench_escape);
criterion_main!(benches);
