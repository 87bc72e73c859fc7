// Shared test doubles: a scriptable portal client and a fast service config.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crew_scrape_engine::config::ServiceConfig;
use crew_scrape_engine::engine::session::SessionManager;
use crew_scrape_engine::error::PortalError;
use crew_scrape_engine::model::{Route, Schedule, ScheduleEntry};
use crew_scrape_engine::portal::registry::PortalRegistry;
use crew_scrape_engine::portal::traits::PortalClient;
use crew_scrape_engine::vault::Credentials;

/// One scripted portal answer: how long to take and what to return
/// (`Ok(n)` yields a schedule with `n` entries).
pub type Step = (Duration, Result<usize, PortalError>);

/// Portal client that counts calls and tracks how many run at once.
pub struct StubPortal {
    calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    script: Mutex<VecDeque<Step>>,
    fallback: Step,
    panics_left: AtomicUsize,
}

impl StubPortal {
    pub fn new(delay: Duration, entries: usize) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            script: Mutex::new(VecDeque::new()),
            fallback: (delay, Ok(entries)),
            panics_left: AtomicUsize::new(0),
        })
    }

    /// Panic in the first `count` calls after sleeping `delay`, then behave like `new`.
    pub fn panicking(count: usize, delay: Duration, entries: usize) -> Arc<Self> {
        let stub = Self::new(delay, entries);
        stub.panics_left.store(count, Ordering::SeqCst);
        stub
    }

    /// Queue answers consumed before falling back to the default.
    pub fn scripted(steps: Vec<Step>, delay: Duration, entries: usize) -> Arc<Self> {
        let stub = Self::new(delay, entries);
        stub.script.lock().extend(steps);
        stub
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

pub fn sample_entries(count: usize) -> Vec<ScheduleEntry> {
    (0..count)
        .map(|i| ScheduleEntry {
            flight_number: format!("{}", 1001 + i),
            date: format!("2024-12-{:02}", 10 + i),
            departure_time: Some("08:15".to_string()),
            route: Route {
                origin: "CVG".to_string(),
                destination: "MEM".to_string(),
            },
            crew_roster: vec!["J. Doe".to_string(), "A. Smith".to_string()],
        })
        .collect()
}

#[async_trait]
impl PortalClient for StubPortal {
    async fn fetch_schedule(&self, credentials: &Credentials) -> Result<Schedule, PortalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);

        let (delay, result) = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        tokio::time::sleep(delay).await;

        self.active.fetch_sub(1, Ordering::SeqCst);
        let should_panic = self
            .panics_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if should_panic {
            panic!("portal client crashed");
        }
        let count = result?;
        Ok(Schedule::new(
            credentials.username(),
            credentials.airline(),
            sample_entries(count),
        ))
    }
}

/// Defaults with retries and timeouts shrunk for tests.
pub fn test_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.server.bind_addr = "127.0.0.1".parse().unwrap();
    config.server.port = 0;
    config.scrape.timeout = Duration::from_secs(5);
    config.scrape.retry.backoff_base = Duration::from_millis(5);
    config.scrape.retry.default_rate_limit_delay = Duration::from_millis(5);
    config
}

pub fn manager_with(stub: Arc<StubPortal>, config: &ServiceConfig) -> Arc<SessionManager> {
    let registry = PortalRegistry::new(stub.clone(), stub);
    Arc::new(SessionManager::new(registry, config))
}
