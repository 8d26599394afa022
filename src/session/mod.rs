//! One tracker session: owns the partition store for its whole lifetime,
//! loads it eagerly at start and flushes it once at shutdown. The watch
//! loop coalesces refresh triggers through a single-slot debounce cell so
//! bursts of triggers produce at most one trailing pass.

use crate::context::{classify, is_listing_page, storage_key};
use crate::engine::{PassSummary, ReconcileEngine};
use crate::probe::StatusProbe;
use crate::scrapers::ListingScraper;
use crate::store::TrackerStore;
use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::{info, warn};

/// Trailing delay between a refresh trigger and the pass it schedules.
pub const DEBOUNCE_DELAY: Duration = Duration::from_millis(500);

/// Single-slot pending-task cell. A new trigger cancels and replaces any
/// pending deadline; an in-flight pass is never interrupted.
pub struct PendingRefresh {
    delay: Duration,
    deadline: Option<Instant>,
}

impl PendingRefresh {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    /// Schedules a pass `delay` from now, replacing any earlier one.
    pub fn trigger(&mut self) {
        self.deadline = Some(Instant::now() + self.delay);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn clear(&mut self) {
        self.deadline = None;
    }
}

/// Resolves at the deadline, or never when none is pending.
async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

pub struct TrackerSession {
    store: TrackerStore,
    engine: ReconcileEngine,
    scraper: Arc<dyn ListingScraper>,
}

impl TrackerSession {
    /// Opens the store and loads every partition into the session cache.
    pub async fn start(
        data_dir: &Path,
        probe: Arc<dyn StatusProbe>,
        scraper: Arc<dyn ListingScraper>,
    ) -> Result<Self> {
        let mut store = TrackerStore::new(data_dir);
        store.load_all().await?;
        Ok(Self {
            store,
            engine: ReconcileEngine::new(probe),
            scraper,
        })
    }

    /// Scrapes and reconciles one pass. `None` when the URL is not a
    /// trackable search-results page.
    pub async fn run_once(&mut self, url: &str) -> Result<Option<PassSummary>> {
        if !is_listing_page(url) {
            info!("Not a search-results page, nothing to track");
            return Ok(None);
        }
        let ctx = classify(url);
        if !ctx.is_trackable() {
            info!("Unrecognized transaction segment, nothing to track");
            return Ok(None);
        }

        let raw_records = self.scraper.scrape(url).await?;
        let summary = self.engine.reconcile(&mut self.store, &ctx, &raw_records).await;
        Ok(Some(summary))
    }

    /// Polls the search until Ctrl-C. Each tick arms the debounce cell;
    /// ticks landing while a pass is in flight coalesce into at most one
    /// follow-up pass. A failed pass keeps the previous data on screen.
    pub async fn run_watch(
        &mut self,
        url: &str,
        poll_every: Duration,
        mut on_pass: impl FnMut(&PassSummary),
    ) -> Result<()> {
        let mut ticker = interval(poll_every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut refresh = PendingRefresh::new(DEBOUNCE_DELAY);

        loop {
            let deadline = refresh.deadline();
            tokio::select! {
                _ = ticker.tick() => {
                    refresh.trigger();
                }
                _ = wait_until(deadline), if deadline.is_some() => {
                    refresh.clear();
                    match self.run_once(url).await {
                        Ok(Some(summary)) => on_pass(&summary),
                        Ok(None) => break,
                        Err(err) => warn!(%err, "refresh pass failed, keeping previous data"),
                    }
                }
                result = tokio::signal::ctrl_c() => {
                    result?;
                    info!("Interrupted, shutting down");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Deletes everything stored for the URL's context, effective
    /// immediately rather than at flush time. Returns the deleted key.
    pub async fn clear(&mut self, url: &str) -> Result<String> {
        let key = storage_key(&classify(url));
        self.store.delete_key(&key).await?;
        Ok(key)
    }

    /// Flushes every cached partition. The one durability point of the
    /// session: updates made after the last flush die with the process.
    pub async fn shutdown(self) -> Result<()> {
        self.store.flush_all().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_replaces_any_pending_deadline() {
        let mut refresh = PendingRefresh::new(Duration::from_millis(500));
        assert!(refresh.deadline().is_none());

        refresh.trigger();
        let first = refresh.deadline().unwrap();

        std::thread::sleep(Duration::from_millis(5));
        refresh.trigger();
        let second = refresh.deadline().unwrap();
        assert!(second > first, "newest trigger wins");

        refresh.clear();
        assert!(refresh.deadline().is_none());
    }

    #[tokio::test]
    async fn wait_until_none_never_resolves() {
        let outcome = tokio::time::timeout(
            Duration::from_millis(20),
            wait_until(None),
        )
        .await;
        assert!(outcome.is_err(), "no deadline means no wakeup");
    }

    #[tokio::test]
    async fn wait_until_resolves_at_the_deadline() {
        tokio::time::pause();
        let deadline = Instant::now() + Duration::from_millis(500);
        wait_until(Some(deadline)).await;
        assert!(Instant::now() >= deadline);
    }
}
