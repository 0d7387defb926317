//! Criterion benchmarks for stream framing.
//!
//! Run with:
//! ```bash
//! cargo bench --package trackgate-core --bench frame_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use trackgate_core::protocol::frame::{extract, FrameDecoder};

fn stream_of(frames: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for i in 0..frames {
        out.extend_from_slice(format!("[CS*88000{i:05}*0009*LK,0,0,80]").as_bytes());
    }
    out
}

/// Whole buffers of N frames delivered in one read.
fn bench_extract_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("extract_batch");
    for n in [1usize, 16, 256] {
        let stream = stream_of(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &stream, |b, stream| {
            b.iter(|| extract(black_box(&[]), black_box(stream)))
        });
    }
    group.finish();
}

/// The same stream trickled in small TCP segments.
fn bench_decoder_chunked(c: &mut Criterion) {
    let stream = stream_of(64);
    let mut group = c.benchmark_group("decoder_chunked");
    for chunk in [7usize, 64, 1460] {
        group.bench_with_input(BenchmarkId::from_parameter(chunk), &chunk, |b, &chunk| {
            b.iter(|| {
                let mut decoder = FrameDecoder::new();
                let mut count = 0;
                for piece in stream.chunks(chunk) {
                    count += decoder.feed(black_box(piece)).len();
                }
                count
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_extract_batch, bench_decoder_chunked);
criterion_main!(benches);
