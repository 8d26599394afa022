//! Incremental reconciliation of freshly scraped result cards into the
//! partition store.
//!
//! One pass merges the current page's snapshots, resolves first-seen dates
//! across every known partition, probes records that dropped out of the
//! results, and propagates probe verdicts to all partitions sharing the id.
//! The store is only ever mutated from the calling task; probe tasks carry
//! URLs, nothing else.

use crate::context::{storage_key, SearchContext};
use crate::models::{Partition, PriceChange, PropertyRecord, PropertyStatus, RawProperty};
use crate::probe::{ProbeOutcome, StatusProbe};
use crate::store::TrackerStore;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// What one reconciliation pass produced, for rendering and export.
#[derive(Debug, Clone)]
pub struct PassSummary {
    pub context: SearchContext,
    pub key: String,
    /// Properties never seen before in any partition.
    pub new_count: usize,
    /// Cards visible on the current page.
    pub current_count: usize,
    /// Ids previously known here but missing from the current results.
    pub disappeared: Vec<String>,
    /// Reconciled records fit for display, newest activity first.
    pub display: Vec<PropertyRecord>,
}

pub struct ReconcileEngine {
    probe: Arc<dyn StatusProbe>,
}

impl ReconcileEngine {
    pub fn new(probe: Arc<dyn StatusProbe>) -> Self {
        Self { probe }
    }

    pub async fn reconcile(
        &self,
        store: &mut TrackerStore,
        ctx: &SearchContext,
        raw_records: &[RawProperty],
    ) -> PassSummary {
        self.reconcile_at(store, ctx, raw_records, Utc::now()).await
    }

    /// Reconciliation with an explicit clock, so merge outcomes are exact
    /// under test.
    pub async fn reconcile_at(
        &self,
        store: &mut TrackerStore,
        ctx: &SearchContext,
        raw_records: &[RawProperty],
        now: DateTime<Utc>,
    ) -> PassSummary {
        let key = storage_key(ctx);
        store.partition(&key).await;

        let mut new_count = 0usize;
        for raw in raw_records {
            if self.merge_one(store, &key, ctx, raw, now).await {
                new_count += 1;
            }
        }

        let disappeared = self
            .classify_absent(store, &key, ctx, raw_records, now)
            .await;

        let display_recs = display_records(store.partition(&key).await);
        info!(
            %key,
            current = raw_records.len(),
            total = display_recs.len(),
            new = new_count,
            gone = disappeared.len(),
            "reconciliation pass complete"
        );

        PassSummary {
            context: ctx.clone(),
            key,
            new_count,
            current_count: raw_records.len(),
            disappeared,
            display: display_recs,
        }
    }

    /// Merges one snapshot into the partition. Returns true when the
    /// property was never seen in any partition before.
    async fn merge_one(
        &self,
        store: &mut TrackerStore,
        key: &str,
        ctx: &SearchContext,
        raw: &RawProperty,
        now: DateTime<Utc>,
    ) -> bool {
        let existing_here = store.record(key, &raw.id).cloned();
        let mut is_new = false;

        let mut record = match &existing_here {
            Some(prior) => prior.clone(),
            None => match store.earliest_record(&raw.id) {
                // Known from another search: keep its age, price baseline
                // and accumulated history instead of starting over.
                Some(oldest) => {
                    debug!(id = %raw.id, "adopting record first seen in another context");
                    oldest.clone()
                }
                None => {
                    is_new = true;
                    first_observation(raw, now)
                }
            },
        };

        if existing_here.is_none() && !ctx.is_area_search {
            // A drawn map shape says nothing stable about place names.
            record.location = ctx.location.clone();
            record.sub_location = ctx.sub_location.clone();
        }

        // Only a price this partition itself held before counts as the
        // baseline for a change entry.
        if let Some(prior) = &existing_here {
            if prior.price != raw.price {
                record.history.push(PriceChange {
                    date: now,
                    old_price: prior.price,
                    new_price: raw.price,
                    change: raw.price - prior.price,
                });
            }
        }

        record.url = raw.url.clone();
        record.price = raw.price;
        record.typology = raw.typology.clone();
        record.area = raw.area.clone();
        record.has_garage = raw.has_garage;
        record.last_seen = now;
        record.is_active = Some(true);
        record.status = PropertyStatus::Listed;

        store.partition(key).await.insert(raw.id.clone(), record);
        is_new
    }

    /// Probes every record that dropped out of the current results and
    /// applies the verdict across all partitions. Area searches never mark
    /// absence: membership in a drawn shape is not a removal signal.
    async fn classify_absent(
        &self,
        store: &mut TrackerStore,
        key: &str,
        ctx: &SearchContext,
        raw_records: &[RawProperty],
        now: DateTime<Utc>,
    ) -> Vec<String> {
        if ctx.is_area_search {
            return Vec::new();
        }

        let fresh_ids: HashSet<&str> = raw_records.iter().map(|r| r.id.as_str()).collect();
        let absent: Vec<(String, String)> = store
            .partition(key)
            .await
            .values()
            .filter(|record| !fresh_ids.contains(record.id.as_str()))
            .map(|record| (record.id.clone(), record.url.clone()))
            .collect();

        // Fan out one probe per missing id; a failed task only ever costs
        // its own id its verdict.
        let handles: Vec<(String, tokio::task::JoinHandle<ProbeOutcome>)> = absent
            .into_iter()
            .map(|(id, url)| {
                let probe = Arc::clone(&self.probe);
                (id, tokio::spawn(async move { probe.check(&url).await }))
            })
            .collect();

        let mut disappeared = Vec::with_capacity(handles.len());
        for (id, handle) in handles {
            let outcome = handle.await.unwrap_or(ProbeOutcome::Error);
            let (is_active, status) = match outcome {
                ProbeOutcome::NotFound => (Some(false), PropertyStatus::Removed),
                ProbeOutcome::Exists => (Some(true), PropertyStatus::NotListed),
                ProbeOutcome::Error => (None, PropertyStatus::Error),
            };
            debug!(%id, ?status, "absent listing classified");
            store.propagate_status(&id, is_active, status, now);
            disappeared.push(id);
        }
        disappeared.sort();
        disappeared
    }
}

/// Records worth showing: probe errors and listings that merely fell out of
/// this search stay in storage but off the table. Newest activity first.
pub fn display_records(partition: &Partition) -> Vec<PropertyRecord> {
    let mut records: Vec<PropertyRecord> = partition
        .values()
        .filter(|r| r.status != PropertyStatus::Error && r.status != PropertyStatus::NotListed)
        .cloned()
        .collect();
    records.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
    records
}

fn first_observation(raw: &RawProperty, now: DateTime<Utc>) -> PropertyRecord {
    PropertyRecord {
        id: raw.id.clone(),
        url: raw.url.clone(),
        price: raw.price,
        typology: raw.typology.clone(),
        area: raw.area.clone(),
        has_garage: raw.has_garage,
        first_seen: now,
        initial_price: raw.price,
        last_seen: now,
        is_active: Some(true),
        status: PropertyStatus::Listed,
        location: String::new(),
        sub_location: String::new(),
        history: Vec::new(),
    }
}
