use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

/// Why a [`QueryContext`] stopped an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
    Cancelled,
    DeadlineExceeded,
}

/// Cancellation and deadline signal threaded through every public entry point.
///
/// Long-running work (parsing, execution, lock waits, commit, rollback) checks the context
/// between statements and rows and aborts with [`Interrupted`] once it fires.
///
/// ```rust
/// use std::time::Duration;
/// use csv_sql_middleware::prelude::*;
///
/// let ctx = QueryContext::background().with_timeout(Duration::from_millis(100));
/// assert!(ctx.check().is_ok());
/// ctx.cancel();
/// assert_eq!(ctx.check(), Err(Interrupted::Cancelled));
/// ```
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl QueryContext {
    /// A context that never fires unless cancelled explicitly.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// Use an externally owned cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        });
        self
    }

    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Time left before the deadline, `None` when there is no deadline.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// # Errors
    ///
    /// Returns the reason when the context has been cancelled or its deadline has passed.
    pub fn check(&self) -> Result<(), Interrupted> {
        if self.token.is_cancelled() {
            return Err(Interrupted::Cancelled);
        }
        if let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            return Err(Interrupted::DeadlineExceeded);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_deadline_is_reported() {
        let ctx = QueryContext::background().with_deadline(Instant::now());
        assert_eq!(ctx.check(), Err(Interrupted::DeadlineExceeded));
    }

    #[test]
    fn earlier_deadline_wins() {
        let soon = Instant::now() + Duration::from_secs(1);
        let ctx = QueryContext::background()
            .with_deadline(soon)
            .with_timeout(Duration::from_secs(60));
        assert_eq!(ctx.deadline(), Some(soon));
    }

    #[test]
    fn shared_token_cancels_clones() {
        let token = CancellationToken::new();
        let ctx = QueryContext::background().with_cancellation(token.clone());
        let cloned = ctx.clone();
        token.cancel();
        assert_eq!(cloned.check(), Err(Interrupted::Cancelled));
    }
}
