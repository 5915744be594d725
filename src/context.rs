use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::Error;

/// Shared flag to stop a running handshake from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Deadline and cancellation passed through every suspendable handshake step.
#[derive(Debug, Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    cancel: CancelToken,
}

impl Context {
    /// No deadline, never cancelled unless [`Context::cancel_token`] is used.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().timeout(timeout)
    }

    /// A child context sharing the cancel token. The earliest deadline wins.
    pub fn timeout(&self, timeout: Duration) -> Self {
        self.deadline(Instant::now() + timeout)
    }

    pub fn deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(d) => d.min(deadline),
            None => deadline,
        };
        Context {
            deadline: Some(deadline),
            cancel: self.cancel.clone(),
        }
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// `Err` once cancelled or past the deadline.
    pub fn check(&self) -> Result<(), Error> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(Error::DeadlineExceeded);
            }
        }
        Ok(())
    }

    /// Time left before the deadline, `None` when there is none.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// `wait` shortened so it never runs past the deadline.
    pub fn clamp(&self, wait: Duration) -> Duration {
        match self.remaining() {
            Some(left) => wait.min(left),
            None => wait,
        }
    }
}
