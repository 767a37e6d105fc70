use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-stage counters, shared between the stage thread and observers.
///
/// For a transform stage, `dropped` counts values rejected by its predicate
/// or stage function. For the circular buffer, `received` counts writes,
/// `forwarded` counts emissions and `dropped` counts overwritten values.
#[derive(Debug, Clone)]
pub struct StageMetrics {
    received: Arc<AtomicU64>,
    forwarded: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
    start_time: Instant,
}

impl StageMetrics {
    /// Create a new metrics collector for a stage
    pub fn new() -> Self {
        Self {
            received: Arc::new(AtomicU64::new(0)),
            forwarded: Arc::new(AtomicU64::new(0)),
            dropped: Arc::new(AtomicU64::new(0)),
            start_time: Instant::now(),
        }
    }

    /// Record a value taken from the input side
    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a value handed to the output side
    pub fn record_forwarded(&self) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a value that will never reach the output side
    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn total_forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    pub fn total_dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Forwarded values per second since creation
    pub fn throughput_vps(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            0.0
        } else {
            self.total_forwarded() as f64 / elapsed
        }
    }

    /// Get a snapshot of current metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_received: self.total_received(),
            total_forwarded: self.total_forwarded(),
            total_dropped: self.total_dropped(),
            throughput_vps: self.throughput_vps(),
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
    pub total_dropped: u64,
    pub throughput_vps: f64,
    pub elapsed: Duration,
}

impl MetricsSnapshot {
    /// Format metrics as a human-readable string
    pub fn format(&self) -> String {
        format!(
            "Received: {}, Forwarded: {}, Dropped: {}, Throughput: {:.2} values/s, Elapsed: {:.2}s",
            self.total_received,
            self.total_forwarded,
            self.total_dropped,
            self.throughput_vps,
            self.elapsed.as_secs_f64()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_metrics() {
        let metrics = StageMetrics::new();
        for i in 0..100 {
            metrics.record_received();
            if i % 4 == 0 {
                metrics.record_dropped();
            } else {
                metrics.record_forwarded();
            }
        }
        assert_eq!(metrics.total_received(), 100);
        assert_eq!(metrics.total_forwarded(), 75);
        assert_eq!(metrics.total_dropped(), 25);
        std::thread::sleep(Duration::from_millis(1));
        assert!(metrics.throughput_vps() > 0.0);
    }

    #[test]
    fn test_clones_share_counters() {
        let metrics = StageMetrics::new();
        let observer = metrics.clone();
        metrics.record_forwarded();
        assert_eq!(observer.total_forwarded(), 1);
    }

    #[test]
    fn test_snapshot_format() {
        let metrics = StageMetrics::new();
        metrics.record_received();
        let text = metrics.snapshot().format();
        assert!(text.starts_with("Received: 1, Forwarded: 0, Dropped: 0"));
    }
}
