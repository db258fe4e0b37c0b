//! Run-level cancellation with an optional deadline.
//!
//! Every retry loop in a run consults the same token before starting another
//! attempt. Once the token is cancelled, explicitly or because the deadline
//! passed, no new attempts start and components return what they have.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Token for coordinating cancellation across the tasks of one run.
pub struct CancellationToken {
    cancelled: AtomicBool,
    reason: Mutex<Option<String>>,
    deadline: Option<Instant>,
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .field("deadline", &self.deadline)
            .finish()
    }
}

impl CancellationToken {
    /// Creates a token with no deadline.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Creates a token that cancels itself once `timeout` has elapsed.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            deadline: Instant::now().checked_add(timeout),
            ..Self::default()
        })
    }

    /// Creates a token from an optional timeout.
    #[must_use]
    pub fn from_timeout(timeout: Option<Duration>) -> Arc<Self> {
        timeout.map_or_else(Self::new, Self::with_timeout)
    }

    /// Returns true if cancellation was requested or the deadline passed.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst) || self.deadline_elapsed()
    }

    /// Returns true if the deadline has passed.
    #[must_use]
    pub fn deadline_elapsed(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Time left before the deadline. `None` means unbounded.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Returns the cancellation reason if cancelled.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        if let Some(reason) = self.reason.lock().clone() {
            return Some(reason);
        }
        self.deadline_elapsed()
            .then(|| "run deadline elapsed".to_string())
    }

    /// Requests cancellation with a reason.
    ///
    /// Idempotent: only the first reason is stored.
    pub fn cancel(&self, reason: impl Into<String>) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            *self.reason.lock() = Some(reason.into());
        }
    }

    /// Clamps a delay so a sleep never outlives the deadline.
    #[must_use]
    pub fn clamp_delay(&self, delay: Duration) -> Duration {
        self.remaining().map_or(delay, |left| delay.min(left))
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            reason: Mutex::new(None),
            deadline: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_cancel_is_idempotent() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());

        token.cancel("first");
        token.cancel("second");

        assert!(token.is_cancelled());
        assert_eq!(token.reason(), Some("first".to_string()));
    }

    #[test]
    fn test_token_without_deadline_is_unbounded() {
        let token = CancellationToken::new();
        assert!(token.remaining().is_none());
        assert_eq!(
            token.clamp_delay(Duration::from_secs(5)),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn test_zero_timeout_is_cancelled_immediately() {
        let token = CancellationToken::with_timeout(Duration::ZERO);
        assert!(token.is_cancelled());
        assert!(token.deadline_elapsed());
        assert_eq!(token.reason(), Some("run deadline elapsed".to_string()));
        assert_eq!(token.clamp_delay(Duration::from_secs(5)), Duration::ZERO);
    }

    #[test]
    fn test_long_timeout_clamps_delay() {
        let token = CancellationToken::with_timeout(Duration::from_secs(3600));
        assert!(!token.is_cancelled());
        assert_eq!(
            token.clamp_delay(Duration::from_millis(10)),
            Duration::from_millis(10)
        );
    }
}
