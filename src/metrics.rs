// Submission metrics
//
// Lock-free counters recorded by the controller and logged at shutdown

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Counters for one controller's lifetime.
///
/// Uses atomic operations so the controller can record from any task without
/// locking.
#[derive(Debug)]
pub struct Metrics {
    /// Submissions that entered Submitting
    pub submissions_started: AtomicU64,

    /// Submissions that ended in Succeeded
    pub submissions_succeeded: AtomicU64,

    /// Submissions that ended in Failed
    pub submissions_failed: AtomicU64,

    /// Submissions abandoned by a reset
    pub submissions_cancelled: AtomicU64,

    /// Network exchanges attempted
    pub attempts: AtomicU64,

    /// Attempts that were followed by a retry wait
    pub retries: AtomicU64,

    /// Selections refused by validation
    pub rejections: AtomicU64,

    /// Wall time spent waiting on the service, in milliseconds
    pub total_request_time_ms: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            submissions_started: AtomicU64::new(0),
            submissions_succeeded: AtomicU64::new(0),
            submissions_failed: AtomicU64::new(0),
            submissions_cancelled: AtomicU64::new(0),
            attempts: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
            total_request_time_ms: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_submission_started(&self) {
        self.submissions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_submission_succeeded(&self) {
        self.submissions_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_submission_failed(&self) {
        self.submissions_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_submission_cancelled(&self) {
        self.submissions_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejection(&self) {
        self.rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_request_time(&self, duration: Duration) {
        self.total_request_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average time per network exchange in milliseconds
    pub fn avg_request_time_ms(&self) -> f64 {
        let total = self.total_request_time_ms.load(Ordering::Relaxed);
        let count = self.attempts.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    pub fn log_summary(&self) {
        tracing::info!("=== Submission Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Submissions: {} started, {} succeeded, {} failed, {} cancelled",
            self.submissions_started.load(Ordering::Relaxed),
            self.submissions_succeeded.load(Ordering::Relaxed),
            self.submissions_failed.load(Ordering::Relaxed),
            self.submissions_cancelled.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Attempts: {} ({} retries), avg {:.0}ms per request",
            self.attempts.load(Ordering::Relaxed),
            self.retries.load(Ordering::Relaxed),
            self.avg_request_time_ms()
        );
        tracing::info!(
            "Rejected selections: {}",
            self.rejections.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
