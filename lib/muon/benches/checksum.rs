use criterion::{criterion_group, criterion_main, Criterion};
use muon::seg::{checksum, verify, Segment};

fn checksum_benchmark(c: &mut Criterion) {
    let wire = Segment::data(87, 88, 0, vec![0xA5; 1464]).to_wire();

    c.bench_function("checksum_full_segment", {
        let wire = wire.clone();
        move |b| b.iter(|| checksum(&wire[..wire.len() - 2]))
    });

    c.bench_function("verify_full_segment", move |b| b.iter(|| verify(&wire)));
}

criterion_group!(benches, checksum_benchmark);
criterion_main!(benches);
