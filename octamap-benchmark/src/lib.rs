use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Session-wide timing counters. Shared by reference, updated lock-free.
#[derive(Debug, Default)]
pub struct BenchmarkMetrics {
    // Codec
    pub total_maps_decoded: AtomicUsize,
    pub total_decode_time_us: AtomicU64,
    pub max_decode_time_us: AtomicU64,
    pub total_maps_encoded: AtomicUsize,
    pub total_encode_time_us: AtomicU64,
    pub total_compression_us: AtomicU64,
    pub total_bytes_in: AtomicU64,
    pub total_bytes_out: AtomicU64,

    // World building
    pub total_worlds_generated: AtomicUsize,
    pub total_generation_time_us: AtomicU64,
    pub total_compaction_time_us: AtomicU64,
    pub total_voxels_compacted: AtomicUsize,

    pub start_time: Option<Instant>,
}

fn micros(duration: Duration) -> u64 {
    duration.as_micros() as u64
}

fn ms(us: &AtomicU64) -> f64 {
    us.load(Ordering::Relaxed) as f64 / 1000.0
}

fn per(total_ms: f64, count: usize) -> f64 {
    if count > 0 { total_ms / count as f64 } else { 0.0 }
}

impl BenchmarkMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    /// A map body of `bytes` decompressed bytes was decoded.
    pub fn record_decode(&self, duration: Duration, bytes: usize) {
        self.total_maps_decoded.fetch_add(1, Ordering::Relaxed);
        let us = micros(duration);
        self.total_decode_time_us.fetch_add(us, Ordering::Relaxed);
        self.max_decode_time_us.fetch_max(us, Ordering::Relaxed);
        self.total_bytes_in.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_encode(&self, duration: Duration, bytes: usize) {
        self.total_maps_encoded.fetch_add(1, Ordering::Relaxed);
        self.total_encode_time_us.fetch_add(micros(duration), Ordering::Relaxed);
        self.total_bytes_out.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_compression(&self, duration: Duration) {
        self.total_compression_us.fetch_add(micros(duration), Ordering::Relaxed);
    }

    pub fn record_generation(&self, duration: Duration) {
        self.total_worlds_generated.fetch_add(1, Ordering::Relaxed);
        self.total_generation_time_us.fetch_add(micros(duration), Ordering::Relaxed);
    }

    pub fn record_compaction(&self, duration: Duration, voxels: usize) {
        self.total_compaction_time_us.fetch_add(micros(duration), Ordering::Relaxed);
        self.total_voxels_compacted.fetch_add(voxels, Ordering::Relaxed);
    }

    pub fn generate_report(&self) -> String {
        let uptime = self.start_time.unwrap_or_else(Instant::now).elapsed();

        let decoded = self.total_maps_decoded.load(Ordering::Relaxed);
        let decode_total = ms(&self.total_decode_time_us);
        let decode_max = ms(&self.max_decode_time_us);
        let bytes_in = self.total_bytes_in.load(Ordering::Relaxed);

        let encoded = self.total_maps_encoded.load(Ordering::Relaxed);
        let encode_total = ms(&self.total_encode_time_us);
        let comp_total = ms(&self.total_compression_us);
        let bytes_out = self.total_bytes_out.load(Ordering::Relaxed);

        let generated = self.total_worlds_generated.load(Ordering::Relaxed);
        let gen_total = ms(&self.total_generation_time_us);
        let compaction_total = ms(&self.total_compaction_time_us);
        let voxels = self.total_voxels_compacted.load(Ordering::Relaxed);

        format!(
            "Octamap Benchmark Report\n\
             ========================\n\
             Session Duration: {:.2?}\n\n\
             [Decode]\n\
             Maps Decoded: {}\n\
             Total Time: {:.2} ms\n\
             Avg Time: {:.2} ms/map\n\
             Max Time: {:.2} ms\n\
             Body Bytes: {}\n\n\
             [Encode]\n\
             Maps Encoded: {}\n\
             Avg Time: {:.2} ms/map\n\
               - Compression: {:.2} ms/map\n\
             Output Bytes: {}\n\n\
             [Generation]\n\
             Worlds Generated: {}\n\
             Avg Time: {:.2} ms/world\n\
             Compaction: {:.2} ms total, {} voxels\n",
            uptime,
            decoded, decode_total, per(decode_total, decoded), decode_max, bytes_in,
            encoded, per(encode_total, encoded), per(comp_total, encoded), bytes_out,
            generated, per(gen_total, generated), compaction_total, voxels
        )
    }
}
