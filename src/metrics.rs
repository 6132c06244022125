use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-stage metrics collector
#[derive(Debug, Clone)]
pub struct StageMetrics {
    /// Number of items taken from the input
    received: Arc<AtomicU64>,
    /// Number of items sent downstream
    forwarded: Arc<AtomicU64>,
    /// Number of items rejected by the stage predicate
    rejected: Arc<AtomicU64>,
    /// Number of items evicted from the ring buffer on overflow
    evicted: Arc<AtomicU64>,
    /// Number of non-empty buffer flushes
    flushes: Arc<AtomicU64>,
    /// Creation time for throughput calculation
    start_time: Instant,
}

impl StageMetrics {
    /// Create a new metrics collector for a stage
    pub fn new() -> Self {
        Self {
            received: Arc::new(AtomicU64::new(0)),
            forwarded: Arc::new(AtomicU64::new(0)),
            rejected: Arc::new(AtomicU64::new(0)),
            evicted: Arc::new(AtomicU64::new(0)),
            flushes: Arc::new(AtomicU64::new(0)),
            start_time: Instant::now(),
        }
    }

    /// Record an item taken from the input
    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an item sent downstream
    pub fn record_forwarded(&self) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an item dropped by the stage predicate
    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an item evicted from the ring buffer
    pub fn record_evicted(&self) {
        self.evicted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a non-empty buffer flush
    pub fn record_flush(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the total number of items received
    pub fn total_received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Get the total number of items forwarded
    pub fn total_forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    /// Get the total number of items rejected
    pub fn total_rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Get the total number of items evicted
    pub fn total_evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    /// Get the total number of non-empty flushes
    pub fn total_flushes(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }

    /// Forwarded items per second since the collector was created
    pub fn throughput_ips(&self) -> f64 {
        let elapsed = self.start_time.elapsed();
        let total = self.total_forwarded();
        if elapsed.as_secs_f64() == 0.0 {
            0.0
        } else {
            total as f64 / elapsed.as_secs_f64()
        }
    }

    /// Get a snapshot of current metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_received: self.total_received(),
            total_forwarded: self.total_forwarded(),
            total_rejected: self.total_rejected(),
            total_evicted: self.total_evicted(),
            total_flushes: self.total_flushes(),
            throughput_ips: self.throughput_ips(),
            elapsed: self.start_time.elapsed(),
        }
    }
}

impl Default for StageMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub total_received: u64,
    pub total_forwarded: u64,
    pub total_rejected: u64,
    pub total_evicted: u64,
    pub total_flushes: u64,
    pub throughput_ips: f64,
    pub elapsed: Duration,
}

impl MetricsSnapshot {
    /// Format metrics as a human-readable string
    pub fn format(&self) -> String {
        format!(
            "Received: {}, Forwarded: {}, Rejected: {}, Evicted: {}, Flushes: {}, \
             Throughput: {:.2} items/s, Elapsed: {:.2}s",
            self.total_received,
            self.total_forwarded,
            self.total_rejected,
            self.total_evicted,
            self.total_flushes,
            self.throughput_ips,
            self.elapsed.as_secs_f64()
        )
    }
}
