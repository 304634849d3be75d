//! Hub fan-out benchmarks.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use parlor_core::{Client, Hub, HubConfig, Payload, RoomSpec};
use parlor_transport::ConnectionId;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;

fn setup(rt: &Runtime, members: usize) -> (Hub, String) {
    rt.block_on(async {
        let hub = Hub::start(HubConfig::default());
        let room = hub
            .create_room(RoomSpec::new("bench", members.max(2)), "bench")
            .unwrap();

        for i in 0..members {
            let client = Client::new(ConnectionId::generate(), format!("user{i}")).in_room(room.id.clone());
            let (tx, mut rx) = mpsc::channel::<Payload>(1024);
            hub.register(&client, tx).await.unwrap();
            // Drain like an outbound pump would
            tokio::spawn(async move { while rx.recv().await.is_some() {} });
        }
        (hub, room.id)
    })
}

fn bench_broadcast(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let payload = Payload::from(r#"{"type":"chat","username":"alice","message":"hello","time":0}"#);

    let mut group = c.benchmark_group("fanout");
    for members in [2, 16, 128] {
        let (hub, room_id) = setup(&rt, members);
        group.throughput(Throughput::Elements(members as u64));
        group.bench_with_input(BenchmarkId::new("broadcast", members), &members, |b, _| {
            b.to_async(&rt).iter(|| {
                let hub = hub.clone();
                let room_id = room_id.clone();
                let payload = payload.clone();
                async move {
                    hub.broadcast(&room_id, payload).await;
                    hub.flush().await.unwrap();
                }
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_broadcast);
criterion_main!(benches);
