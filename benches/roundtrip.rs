extern crate criterion;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use ablzw::decode::Decoder;
use ablzw::encode::Encoder;

fn corpus(name: &str) -> Vec<u8> {
    match name {
        "runs" => {
            let mut data = Vec::with_capacity(1 << 18);
            for run in 0u32.. {
                if data.len() >= 1 << 18 {
                    break;
                }
                data.extend_from_slice(&[(run % 251) as u8; 97]);
            }
            data
        }
        "random" => {
            let mut state = 0x1u64;
            (0..1 << 18)
                .map(|_| {
                    state = state
                        .wrapping_mul(6364136223846793005)
                        .wrapping_add(1442695040888963407);
                    (state >> 56) as u8
                })
                .collect()
        }
        _ => unreachable!(),
    }
}

fn compress(data: &[u8], max_bits: u8) -> Vec<u8> {
    let mut compressed = Vec::with_capacity(data.len() + 64);
    let mut encoder = Encoder::new(max_bits);
    encoder
        .into_stream(&mut compressed)
        .encode_all(data)
        .status
        .expect("compression failed");
    compressed
}

pub fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    for name in ["runs", "random"] {
        let data = corpus(name);
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_with_input(BenchmarkId::new(name, data.len()), &data, |b, data| {
            b.iter(|| {
                let compressed = compress(data, 12);
                black_box(&compressed);
            })
        });
    }
    group.finish();
}

pub fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    for name in ["runs", "random"] {
        let data = corpus(name);
        let compressed = compress(&data, 12);
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_with_input(
            BenchmarkId::new(name, data.len()),
            &compressed,
            |b, compressed| {
                b.iter(|| {
                    let mut decoder = Decoder::new();
                    let mut restored = Vec::with_capacity(1 << 18);
                    let result = decoder
                        .into_stream(&mut restored)
                        .decode_all(compressed.as_slice());
                    result.status.expect("decompression failed");
                    black_box(&restored);
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
