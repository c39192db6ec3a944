//! Metrics for the sender.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters recorded by the session manager over its lifetime.
#[derive(Debug, Default)]
pub struct SenderMetrics {
    /// Emails transmitted successfully.
    pub emails_sent: AtomicU64,
    /// Send attempts that produced errors.
    pub emails_failed: AtomicU64,
    /// Messages written to the pickup directory.
    pub pickup_writes: AtomicU64,
    /// Authentication attempts.
    pub auth_attempts: AtomicU64,
    /// Authentication failures.
    pub auth_failures: AtomicU64,
    /// Token refreshes performed before authentication.
    pub token_refreshes: AtomicU64,
}

impl SenderMetrics {
    /// Creates a fresh set of counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful send.
    pub fn record_sent(&self) {
        self.emails_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a failed send.
    pub fn record_failed(&self) {
        self.emails_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a pickup-directory write.
    pub fn record_pickup_write(&self) {
        self.pickup_writes.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an authentication attempt.
    pub fn record_auth_attempt(&self) {
        self.auth_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an authentication failure.
    pub fn record_auth_failure(&self) {
        self.auth_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a token refresh.
    pub fn record_token_refresh(&self) {
        self.token_refreshes.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes a point-in-time snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            emails_sent: self.emails_sent.load(Ordering::Relaxed),
            emails_failed: self.emails_failed.load(Ordering::Relaxed),
            pickup_writes: self.pickup_writes.load(Ordering::Relaxed),
            auth_attempts: self.auth_attempts.load(Ordering::Relaxed),
            auth_failures: self.auth_failures.load(Ordering::Relaxed),
            token_refreshes: self.token_refreshes.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of [`SenderMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Emails transmitted successfully.
    pub emails_sent: u64,
    /// Send attempts that produced errors.
    pub emails_failed: u64,
    /// Messages written to the pickup directory.
    pub pickup_writes: u64,
    /// Authentication attempts.
    pub auth_attempts: u64,
    /// Authentication failures.
    pub auth_failures: u64,
    /// Token refreshes performed before authentication.
    pub token_refreshes: u64,
}

impl MetricsSnapshot {
    /// Fraction of attempts that succeeded.
    pub fn success_rate(&self) -> f64 {
        let total = self.emails_sent + self.emails_failed;
        if total == 0 {
            return 0.0;
        }
        self.emails_sent as f64 / total as f64
    }
}
