use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use sertee_perf::{append_all, fanout_engine, format_bytes, make_payload, SAMPLE_LINE};

fn bench_append(c: &mut Criterion) {
    let (mut engine, _ids) = fanout_engine(4096, 1);

    let mut group = c.benchmark_group("broadcast");
    group.throughput(Throughput::Bytes(SAMPLE_LINE.len() as u64));

    group.bench_function("append (line)", |b| {
        b.iter(|| append_all(&mut engine, black_box(SAMPLE_LINE)));
    });

    group.finish();
}

fn bench_read_into(c: &mut Criterion) {
    let (mut engine, ids) = fanout_engine(4096, 1);
    let reader = ids[0];
    let mut out = Vec::with_capacity(4096);

    let mut group = c.benchmark_group("broadcast");
    group.throughput(Throughput::Bytes(SAMPLE_LINE.len() as u64));

    group.bench_function("append + read_into (line)", |b| {
        b.iter(|| {
            append_all(&mut engine, SAMPLE_LINE);
            engine
                .read_into(reader, 0, SAMPLE_LINE.len(), &mut out)
                .expect("registered reader");
            black_box(&out);
        });
    });

    group.bench_function("read_into (empty)", |b| {
        b.iter(|| {
            engine
                .read_into(reader, 0, 64, &mut out)
                .expect("registered reader");
            black_box(&out);
        });
    });

    group.finish();
}

/// Append cost grows with attached readers through overtake and wakeup scans.
fn bench_fanout(c: &mut Criterion) {
    let payload = make_payload(256);
    let mut group = c.benchmark_group("broadcast_fanout");
    group.throughput(Throughput::Bytes(payload.len() as u64));

    for &readers in &[1usize, 4, 16, 64] {
        let (mut engine, _ids) = fanout_engine(1024, readers);
        group.bench_with_input(BenchmarkId::new("append_lapping", readers), &readers, |b, _| {
            b.iter(|| append_all(&mut engine, black_box(&payload)));
        });
    }

    group.finish();
}

fn bench_capacities(c: &mut Criterion) {
    let mut group = c.benchmark_group("broadcast_capacity");

    for &cap in &[1024usize, 4096, 16384, 65536] {
        let payload = make_payload(cap);
        let (mut engine, ids) = fanout_engine(cap, 1);
        let mut out = Vec::with_capacity(cap);
        group.throughput(Throughput::Bytes(cap as u64));

        group.bench_function(format!("fill_and_drain_{}", format_bytes(cap as u64)), |b| {
            b.iter(|| {
                append_all(&mut engine, &payload);
                engine
                    .read_into(ids[0], 0, cap, &mut out)
                    .expect("registered reader");
                black_box(&out);
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_append,
    bench_read_into,
    bench_fanout,
    bench_capacities,
);
criterion_main!(benches);
