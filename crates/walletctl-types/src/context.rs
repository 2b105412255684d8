//! Per-request context
//!
//! Carries the caller's deadline into every backend call and persistence
//! write so nothing blocks past it.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::DeadlineExceeded;

/// Context threaded through one request's handling
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestContext {
    deadline: Option<Instant>,
}

impl RequestContext {
    /// A context without a deadline
    pub fn background() -> Self {
        Self { deadline: None }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// This context, unless less than `grace` is left on its deadline, in
    /// which case a fresh context lasting `grace`.
    ///
    /// Used for bookkeeping writes that must still land after the work they
    /// record ran out of time.
    pub fn with_grace(&self, grace: Duration) -> Self {
        match self.deadline {
            Some(deadline) if deadline.saturating_duration_since(Instant::now()) < grace => {
                Self::with_timeout(grace)
            }
            _ => *self,
        }
    }

    pub fn is_expired(&self) -> bool {
        matches!(self.deadline, Some(deadline) if deadline <= Instant::now())
    }

    /// Drive `fut` to completion unless the deadline passes first
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, DeadlineExceeded>
    where
        F: Future,
    {
        match self.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, fut)
                .await
                .map_err(|_| DeadlineExceeded),
            None => Ok(fut.await),
        }
    }
}
