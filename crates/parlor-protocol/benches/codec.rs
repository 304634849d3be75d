//! Codec benchmarks for parlor-protocol.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use parlor_protocol::{codec, ClientCommand, ServerFrame};

fn bench_encode_chat(c: &mut Criterion) {
    let frame = ServerFrame::chat("alice", "x".repeat(64), 1_700_000_000_000);

    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Elements(1));
    group.bench_function("chat_64B", |b| b.iter(|| codec::encode(black_box(&frame))));
    group.finish();
}

fn bench_decode_command(c: &mut Criterion) {
    let text = codec::encode(&ClientCommand::message("y".repeat(64))).unwrap();

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(text.len() as u64));
    group.bench_function("command_64B", |b| {
        b.iter(|| codec::decode::<ClientCommand>(black_box(&text)))
    });
    group.finish();
}

criterion_group!(benches, bench_encode_chat, bench_decode_command);
criterion_main!(benches);
