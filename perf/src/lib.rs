use sertee_ring::{BroadcastEngine, ReaderId, RingConfig};

/// Engine type the benches drive; waiters are never parked.
pub type BenchEngine = BroadcastEngine<Box<dyn FnOnce()>>;

/// A line of NMEA-like text, the kind of payload a serial source emits.
pub const SAMPLE_LINE: &[u8] =
    b"$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47\r\n";

/// Repeats [`SAMPLE_LINE`] until `len` bytes are produced.
pub fn make_payload(len: usize) -> Vec<u8> {
    SAMPLE_LINE.iter().copied().cycle().take(len).collect()
}

/// Builds an engine with `readers` attached cursors.
pub fn fanout_engine(capacity: usize, readers: usize) -> (BenchEngine, Vec<ReaderId>) {
    let cfg = RingConfig::new(capacity).expect("capacity must be non-zero");
    let mut engine = BenchEngine::new(cfg);
    let ids = (0..readers)
        .map(|_| {
            let id = engine.register_reader();
            engine.attach(id).expect("registered reader");
            id
        })
        .collect();
    (engine, ids)
}

/// Appends the whole slice, one tail-sized pass at a time.
pub fn append_all(engine: &mut BenchEngine, mut bytes: &[u8]) {
    while !bytes.is_empty() {
        let n = engine.append(bytes);
        bytes = &bytes[n..];
    }
}

pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;
    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
