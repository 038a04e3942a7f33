//! Statistics tracking for link traffic

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Snapshot of link traffic
#[derive(Debug, Clone)]
pub struct LinkStats {
    /// Frames received
    pub input_frames: u64,
    /// Bytes received
    pub input_bytes: u64,
    /// Frames sent
    pub output_frames: u64,
    /// Bytes sent
    pub output_bytes: u64,
    /// Frames dropped as malformed or invalid
    pub dropped_frames: u64,
    /// Timestamp when stats collection started
    pub start_time: Instant,
    /// Input throughput in KB/s
    pub input_kbps: f64,
    /// Output throughput in KB/s
    pub output_kbps: f64,
}

impl LinkStats {
    /// Create a snapshot with zero counters
    pub fn new() -> Self {
        Self {
            input_frames: 0,
            input_bytes: 0,
            output_frames: 0,
            output_bytes: 0,
            dropped_frames: 0,
            start_time: Instant::now(),
            input_kbps: 0.0,
            output_kbps: 0.0,
        }
    }

    /// Update throughput calculations based on elapsed time
    pub fn update_throughput(&mut self) {
        let elapsed_secs = self.start_time.elapsed().as_secs_f64();
        if elapsed_secs > 0.0 {
            self.input_kbps = (self.input_bytes as f64) / 1024.0 / elapsed_secs;
            self.output_kbps = (self.output_bytes as f64) / 1024.0 / elapsed_secs;
        }
    }
}

impl Default for LinkStats {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LinkStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "In: {} frames, {:.2} KB/s ({} bytes), Out: {} frames, {:.2} KB/s ({} bytes), Dropped: {}",
            self.input_frames,
            self.input_kbps,
            self.input_bytes,
            self.output_frames,
            self.output_kbps,
            self.output_bytes,
            self.dropped_frames
        )
    }
}

/// Thread-safe traffic counters shared between a node and its transport
#[derive(Debug, Clone)]
pub struct StatsTracker {
    input_frames: Arc<AtomicU64>,
    input_bytes: Arc<AtomicU64>,
    output_frames: Arc<AtomicU64>,
    output_bytes: Arc<AtomicU64>,
    dropped_frames: Arc<AtomicU64>,
    start_time: Instant,
}

impl StatsTracker {
    pub fn new() -> Self {
        Self {
            input_frames: Arc::new(AtomicU64::new(0)),
            input_bytes: Arc::new(AtomicU64::new(0)),
            output_frames: Arc::new(AtomicU64::new(0)),
            output_bytes: Arc::new(AtomicU64::new(0)),
            dropped_frames: Arc::new(AtomicU64::new(0)),
            start_time: Instant::now(),
        }
    }

    /// Count one received frame of `bytes` bytes
    pub fn record_input(&self, bytes: usize) {
        self.input_frames.fetch_add(1, Ordering::Relaxed);
        self.input_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Count one sent frame of `bytes` bytes
    pub fn record_output(&self, bytes: usize) {
        self.output_frames.fetch_add(1, Ordering::Relaxed);
        self.output_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Count one dropped frame
    pub fn record_dropped(&self) {
        self.dropped_frames.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current statistics snapshot
    pub fn get_stats(&self) -> LinkStats {
        let mut stats = LinkStats {
            input_frames: self.input_frames.load(Ordering::Relaxed),
            input_bytes: self.input_bytes.load(Ordering::Relaxed),
            output_frames: self.output_frames.load(Ordering::Relaxed),
            output_bytes: self.output_bytes.load(Ordering::Relaxed),
            dropped_frames: self.dropped_frames.load(Ordering::Relaxed),
            start_time: self.start_time,
            input_kbps: 0.0,
            output_kbps: 0.0,
        };
        stats.update_throughput();
        stats
    }
}

impl Default for StatsTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_display() {
        let mut stats = LinkStats::new();
        stats.input_frames = 3;
        stats.input_bytes = 9;
        stats.update_throughput();

        let display = format!("{}", stats);
        assert!(display.contains("In: 3 frames"));
        assert!(display.contains("Dropped: 0"));
    }

    #[test]
    fn test_tracker_operations() {
        let tracker = StatsTracker::new();
        tracker.record_input(4);
        tracker.record_input(2);
        tracker.record_output(3);
        tracker.record_dropped();

        let stats = tracker.get_stats();
        assert_eq!(stats.input_frames, 2);
        assert_eq!(stats.input_bytes, 6);
        assert_eq!(stats.output_frames, 1);
        assert_eq!(stats.output_bytes, 3);
        assert_eq!(stats.dropped_frames, 1);
    }

    #[test]
    fn test_clones_share_counters() {
        let tracker = StatsTracker::new();
        let shared = tracker.clone();
        shared.record_output(5);
        assert_eq!(tracker.get_stats().output_bytes, 5);
    }
}
