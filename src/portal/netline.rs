use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode, Url};
use serde_json::Value;
use tracing::{debug, warn};

use super::roster::parse_roster;
use super::traits::PortalClient;
use crate::error::PortalError;
use crate::model::{Airline, Schedule};
use crate::vault::Credentials;

const USER_AGENT: &str = concat!("crew-scrape-engine/", env!("CARGO_PKG_VERSION"));

/// NetLine/Crew portal reached over HTTP: form login, then a JSON roster fetch.
///
/// Every scrape gets its own client and cookie store, so no portal session is
/// ever shared between pilots.
pub struct NetlinePortal {
    airline: Airline,
    base_url: Url,
    request_timeout: Duration,
}

impl NetlinePortal {
    pub fn new(airline: Airline, base_url: &str, request_timeout: Duration) -> Result<Self> {
        let mut normalized = base_url.trim().to_string();
        if !normalized.ends_with('/') {
            normalized.push('/');
        }
        let base_url = Url::parse(&normalized)
            .map_err(|e| anyhow!("invalid {} portal url '{}': {}", airline, base_url, e))?;
        Ok(Self {
            airline,
            base_url,
            request_timeout,
        })
    }

    pub fn airline(&self) -> Airline {
        self.airline
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn session_client(&self) -> Result<Client, PortalError> {
        Client::builder()
            .cookie_store(true)
            .timeout(self.request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| PortalError::Network(format!("failed to build http client: {}", e)))
    }

    fn endpoint(&self, path: &str) -> Result<Url, PortalError> {
        self.base_url
            .join(path)
            .map_err(|e| PortalError::Parse(format!("invalid portal endpoint {}: {}", path, e)))
    }

    async fn login(&self, client: &Client, credentials: &Credentials) -> Result<(), PortalError> {
        let url = self.endpoint("login")?;
        let form = [
            ("username", credentials.username()),
            ("password", credentials.password()),
        ];
        let resp = client
            .post(url)
            .form(&form)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        debug!(
            "{} portal login status={} pilot={}",
            self.airline,
            status.as_u16(),
            credentials.username()
        );
        classify_status(status, resp.headers(), "login")
    }

    async fn fetch_roster(&self, client: &Client) -> Result<Value, PortalError> {
        let url = self.endpoint("roster")?;
        let resp = client.get(url).send().await.map_err(transport_error)?;

        let status = resp.status();
        classify_status(status, resp.headers(), "roster")?;

        let body = resp.bytes().await.map_err(transport_error)?;
        serde_json::from_slice(&body)
            .map_err(|e| PortalError::Parse(format!("roster is not valid json: {}", e)))
    }
}

#[async_trait]
impl PortalClient for NetlinePortal {
    async fn fetch_schedule(&self, credentials: &Credentials) -> Result<Schedule, PortalError> {
        let client = self.session_client()?;
        self.login(&client, credentials).await?;
        let payload = self.fetch_roster(&client).await?;
        let entries = parse_roster(&payload)?;
        debug!(
            "{} portal roster parsed pilot={} entries={}",
            self.airline,
            credentials.username(),
            entries.len()
        );
        Ok(Schedule::new(credentials.username(), self.airline, entries))
    }
}

/// Map a portal HTTP status onto the error taxonomy.
fn classify_status(status: StatusCode, headers: &HeaderMap, stage: &str) -> Result<(), PortalError> {
    if status.is_success() {
        return Ok(());
    }
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            warn!("portal {} auth rejected status={}", stage, status.as_u16());
            Err(PortalError::Auth)
        }
        StatusCode::TOO_MANY_REQUESTS => Err(PortalError::RateLimited {
            retry_after: retry_after(headers),
        }),
        StatusCode::REQUEST_TIMEOUT => Err(PortalError::Network(format!(
            "{} timed out: HTTP {}",
            stage,
            status.as_u16()
        ))),
        s if s.is_server_error() => Err(PortalError::Network(format!(
            "{} failed: HTTP {}",
            stage,
            s.as_u16()
        ))),
        s => Err(PortalError::Parse(format!(
            "{} returned unexpected HTTP {}",
            stage,
            s.as_u16()
        ))),
    }
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn transport_error(e: reqwest::Error) -> PortalError {
    if e.is_decode() {
        PortalError::Parse(e.to_string())
    } else {
        PortalError::Network(e.to_string())
    }
}
