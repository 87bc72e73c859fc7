// Scrape session manager: cache lookups, one in-flight scrape per pilot, shared outcomes.

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::cache::ScheduleCache;
use super::stats::{HealthReport, StatsCollector};
use crate::config::ServiceConfig;
use crate::error::{PortalError, ScrapeError};
use crate::model::{Schedule, SessionKey};
use crate::portal::registry::PortalRegistry;
use crate::portal::retry::RetryPolicy;
use crate::portal::traits::PortalClient;
use crate::vault::{CredentialVault, Credentials};

pub type ScrapeOutcome = Result<Arc<Schedule>, ScrapeError>;

/// Completion signal of a running scrape. `None` until the worker publishes.
type InFlightMap = DashMap<SessionKey, watch::Receiver<Option<ScrapeOutcome>>>;

/// Owns the publishing side of one scrape and its in-flight slot.
///
/// The slot is always freed before callers are woken, whether by
/// [`InFlightGuard::publish`] or by the sender closing when a panicking worker
/// drops the guard. Only the marker this guard created is removed, so a late
/// drop never clears the slot of a scrape started after it.
struct InFlightGuard {
    key: SessionKey,
    marker: watch::Receiver<Option<ScrapeOutcome>>,
    publisher: watch::Sender<Option<ScrapeOutcome>>,
    in_flight: Arc<InFlightMap>,
}

impl InFlightGuard {
    fn release(&self) {
        self.in_flight
            .remove_if(&self.key, |_, current| current.same_channel(&self.marker));
    }

    fn publish(self, outcome: ScrapeOutcome) {
        self.release();
        self.publisher.send_replace(Some(outcome));
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        // Runs before `publisher` is dropped and closes the channel.
        self.release();
    }
}

pub struct SessionManager {
    portals: PortalRegistry,
    cache: Arc<ScheduleCache>,
    in_flight: Arc<InFlightMap>,
    vault: Arc<CredentialVault>,
    stats: Arc<StatsCollector>,
    retry: RetryPolicy,
    scrape_timeout: Duration,
}

impl SessionManager {
    pub fn new(portals: PortalRegistry, config: &ServiceConfig) -> Self {
        Self {
            portals,
            cache: Arc::new(ScheduleCache::new(config.cache.ttl)),
            in_flight: Arc::new(DashMap::new()),
            vault: Arc::new(CredentialVault::new()),
            stats: Arc::new(StatsCollector::new()),
            retry: RetryPolicy::new(&config.scrape.retry),
            scrape_timeout: config.scrape.timeout,
        }
    }

    /// Get the schedule for `key`, from cache when fresh, otherwise by joining
    /// or starting the single in-flight scrape for that key.
    ///
    /// Dropping the returned future does not cancel a scrape other callers
    /// may be waiting on.
    pub async fn get_schedule(
        &self,
        key: SessionKey,
        credentials: Credentials,
        force_refresh: bool,
    ) -> ScrapeOutcome {
        if !force_refresh {
            if let Some(schedule) = self.cache.get(&key) {
                self.stats.record_cache_hit();
                debug!("cache hit for {}", key);
                return Ok(schedule);
            }
        }
        self.stats.record_cache_miss();

        let (mut receiver, sender) = match self.in_flight.entry(key.clone()) {
            Entry::Occupied(slot) => {
                debug!("joining in-flight scrape for {}", key);
                (slot.get().clone(), None)
            }
            Entry::Vacant(slot) => {
                // Double-check: a scrape may have finished between the lookup and the slot.
                if !force_refresh {
                    if let Some(schedule) = self.cache.get(&key) {
                        return Ok(schedule);
                    }
                }
                let (tx, rx) = watch::channel(None);
                slot.insert(rx.clone());
                (rx, Some(tx))
            }
        };

        match sender {
            Some(tx) => self.spawn_scrape(key, credentials, tx),
            None => drop(credentials),
        }

        let outcome = match receiver.wait_for(Option::is_some).await {
            Ok(published) => (*published).clone(),
            Err(_) => None,
        };
        outcome.unwrap_or(Err(ScrapeError::Aborted))
    }

    fn spawn_scrape(
        &self,
        key: SessionKey,
        credentials: Credentials,
        tx: watch::Sender<Option<ScrapeOutcome>>,
    ) {
        let portal = self.portals.for_airline(key.airline);
        let cache = Arc::clone(&self.cache);
        let stats = Arc::clone(&self.stats);
        let retry = self.retry.clone();
        let timeout = self.scrape_timeout;
        let lease = self.vault.lease(credentials);
        let guard = InFlightGuard {
            key: key.clone(),
            marker: tx.subscribe(),
            publisher: tx,
            in_flight: Arc::clone(&self.in_flight),
        };

        tokio::spawn(async move {
            info!("scrape started for {}", key);

            let portal: &dyn PortalClient = portal.as_ref();
            let credentials: &Credentials = &lease;
            let stats_ref: &StatsCollector = &stats;
            let attempt = retry.run(move || {
                stats_ref.record_portal_call();
                portal.fetch_schedule(credentials)
            });

            let outcome = match tokio::time::timeout(timeout, attempt).await {
                Ok(Ok(schedule)) => {
                    let schedule = Arc::new(schedule);
                    cache.insert(key.clone(), Arc::clone(&schedule));
                    stats.record_success();
                    info!("scrape succeeded for {} entries={}", key, schedule.len());
                    Ok(schedule)
                }
                Ok(Err(e)) => {
                    stats.record_failure();
                    match &e {
                        PortalError::Parse(detail) => {
                            error!("scrape for {} got unparseable portal response: {}", key, detail)
                        }
                        PortalError::Auth => warn!("scrape for {} rejected by portal", key),
                        other => warn!("scrape for {} failed: {}", key, other),
                    }
                    Err(ScrapeError::Portal(e))
                }
                Err(_) => {
                    stats.record_failure();
                    warn!("scrape for {} timed out after {:?}", key, timeout);
                    Err(ScrapeError::Timeout(timeout))
                }
            };

            drop(lease);
            guard.publish(outcome);
        });
    }

    /// Remove a cached schedule so the next request scrapes again.
    pub fn invalidate(&self, key: &SessionKey) -> bool {
        self.cache.invalidate(key)
    }

    pub fn sweep_expired(&self) -> usize {
        let removed = self.cache.sweep();
        if removed > 0 {
            debug!("swept {} expired schedules", removed);
        }
        removed
    }

    /// Periodically evict expired cache entries until `shutdown` fires.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        manager.sweep_expired();
                    }
                    _ = shutdown.cancelled() => {
                        debug!("cache sweeper stopped");
                        return;
                    }
                }
            }
        })
    }

    pub fn health(&self) -> HealthReport {
        self.stats
            .snapshot(self.cache.len(), self.in_flight.len(), self.vault.held())
    }

    pub fn cached_sessions(&self) -> usize {
        self.cache.len()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn portal_calls(&self) -> u64 {
        self.stats.portal_calls()
    }
}
