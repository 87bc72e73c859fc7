use async_trait::async_trait;

use crate::error::PortalError;
use crate::model::Schedule;
use crate::vault::Credentials;

/// Logs in to a remote crew portal and extracts the pilot's schedule.
///
/// Implementations own their endpoint and session cookie handling; callers
/// only see the resulting [`Schedule`] or a classified [`PortalError`].
#[async_trait]
pub trait PortalClient: Send + Sync {
    async fn fetch_schedule(&self, credentials: &Credentials) -> Result<Schedule, PortalError>;
}
