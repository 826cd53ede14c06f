use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use sertee_engine::endpoint::channel;
use sertee_engine::{LoopState, Multiplexer};
use sertee_perf::SAMPLE_LINE;
use sertee_ring::RingConfig;
use std::io::Write;
use std::os::unix::net::UnixStream;

/// Device write, upstream drain, consumer read request and reply, all through
/// one multiplexer.
fn bench_device_to_consumer(c: &mut Criterion) {
    let (upstream, mut device) = UnixStream::pair().expect("socket pair");
    upstream.set_nonblocking(true).expect("non-blocking upstream");
    let cfg = RingConfig::new(4096).expect("capacity must be non-zero");
    let mut mux = Multiplexer::new(upstream, cfg, 0).expect("multiplexer");

    let (endpoint, client) = channel("bench").expect("channel endpoint");
    mux.add_endpoint(endpoint).expect("register endpoint");
    client.open().expect("open");
    while client.take_reply().is_none() {
        assert_eq!(mux.turn(0).expect("turn"), LoopState::Running);
    }

    let mut group = c.benchmark_group("pipeline");
    group.throughput(Throughput::Bytes(SAMPLE_LINE.len() as u64));

    group.bench_function("device_to_consumer", |b| {
        b.iter(|| {
            let target = mux.engine().bytes_written() + SAMPLE_LINE.len() as u64;
            device.write_all(SAMPLE_LINE).expect("device write");
            while mux.engine().bytes_written() < target {
                mux.turn(0).expect("turn");
            }
            client.read(0, SAMPLE_LINE.len()).expect("read request");
            loop {
                mux.turn(0).expect("turn");
                if let Some(reply) = client.take_reply() {
                    black_box(reply);
                    break;
                }
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_device_to_consumer);
criterion_main!(benches);
