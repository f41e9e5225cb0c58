use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use bitswarm_client::core::container::{Container, ValueList, ValueMap};
use bitswarm_client::core::serialization::{decode, encode};

#[allow(clippy::unwrap_used)]
fn room_state(players: usize) -> Container {
    let mut list = ValueList::new();
    for i in 0..players {
        let player = ValueMap::new()
            .with("id", i as i32)
            .unwrap()
            .with("name", format!("player-{i}"))
            .unwrap()
            .with("pos", vec![1.5f32, -2.25, 0.0])
            .unwrap()
            .with("alive", true)
            .unwrap();
        list.push(player).unwrap();
    }
    Container::from(ValueMap::new().with("players", list).unwrap())
}

#[allow(clippy::unwrap_used)]
fn bench_container_encode_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("container_encode_decode");

    for &players in &[1usize, 16, 256] {
        let container = room_state(players);
        let bytes = encode(&container);
        group.throughput(Throughput::Bytes(bytes.len() as u64));

        group.bench_function(format!("encode_{players}_players"), |b| {
            b.iter(|| encode(black_box(&container)))
        });
        group.bench_function(format!("decode_{players}_players"), |b| {
            b.iter(|| {
                let decoded = decode(black_box(&bytes));
                assert!(decoded.is_ok());
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_container_encode_decode);
criterion_main!(benches);
