//! Error taxonomy for scrape operations.
//!
//! [`PortalError`] is what a crew portal backend can report. [`ScrapeError`]
//! adds the failures owned by the session manager. Both are `Clone` because
//! one outcome is broadcast to every caller joined on the same scrape.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortalError {
    /// The portal rejected the credentials. Never retried.
    #[error("crew portal rejected the credentials")]
    Auth,

    /// Connection failure, timeout or server-side error. Retried with backoff.
    #[error("crew portal unreachable: {0}")]
    Network(String),

    /// The portal answered with something we cannot interpret. Never retried.
    #[error("unexpected crew portal response: {0}")]
    Parse(String),

    /// The portal throttled us. Retried once after the honored delay.
    #[error("crew portal rate limited the request")]
    RateLimited { retry_after: Option<Duration> },
}

impl PortalError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, PortalError::Network(_) | PortalError::RateLimited { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Portal(#[from] PortalError),

    #[error("scrape timed out after {0:?}")]
    Timeout(Duration),

    /// The worker serving this scrape stopped without publishing an outcome.
    #[error("scrape aborted before completion")]
    Aborted,
}
