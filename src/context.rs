//! context
//!
//! Per-request deadline carried from the host into outbound calls.
//!
//! The backend has no scheduler of its own. The host decides how long a
//! request may take; every call to the PlanetScale API runs under that
//! deadline and reports `ApiError::DeadlineExceeded` when it passes.
//! Dropping the future cancels the in-flight HTTP request.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::planetscale::ApiError;

/// Deadline for one inbound request.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestContext {
    deadline: Option<Instant>,
}

impl RequestContext {
    /// A context with no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// A context that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// A context that expires at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Run an outbound call under this context's deadline.
    pub async fn run<T, F>(&self, call: F) -> Result<T, ApiError>
    where
        F: Future<Output = Result<T, ApiError>>,
    {
        match self.deadline {
            None => call.await,
            Some(deadline) => tokio::time::timeout_at(deadline, call)
                .await
                .unwrap_or(Err(ApiError::DeadlineExceeded)),
        }
    }
}
