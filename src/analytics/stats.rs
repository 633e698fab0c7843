use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

#[derive(Debug, Default)]
pub struct Stats {
    pub total_submitted: AtomicU64,
    pub successful_submissions: AtomicU64,
    pub failed_submissions: AtomicU64,
    pub cancelled_submissions: AtomicU64,

    // Gauge: latency of the most recent completed submission, permit wait included.
    pub last_submit_latency_ms: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_submitted(&self) {
        self.total_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_successful(&self) {
        self.successful_submissions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failed(&self) {
        self.failed_submissions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cancelled(&self) {
        self.cancelled_submissions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn update_submit_latency(&self, ms: u64) {
        self.last_submit_latency_ms.store(ms, Ordering::Relaxed);
    }

    pub fn submitted(&self) -> u64 {
        self.total_submitted.load(Ordering::Relaxed)
    }

    pub fn successful(&self) -> u64 {
        self.successful_submissions.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed_submissions.load(Ordering::Relaxed)
    }

    pub fn cancelled(&self) -> u64 {
        self.cancelled_submissions.load(Ordering::Relaxed)
    }

    pub fn log_stats(&self) {
        info!(
            "STATS: Submitted: {} | {} Success, {} Failed, {} Cancelled | Last latency {}ms",
            self.submitted(),
            self.successful(),
            self.failed(),
            self.cancelled(),
            self.last_submit_latency_ms.load(Ordering::Relaxed)
        );
    }
}
