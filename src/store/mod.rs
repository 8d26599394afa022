//! Write-back partition store.
//!
//! Partitions live in memory for the whole session and are written out in
//! one pass at shutdown. Backing storage is a directory of JSON files, one
//! per storage key. Deletes bypass the write-back delay because they are
//! user-initiated and must stick immediately.

use crate::context::STORAGE_PREFIX;
use crate::models::{Partition, PropertyRecord, PropertyStatus};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

pub struct TrackerStore {
    root: PathBuf,
    cache: HashMap<String, Partition>,
}

impl TrackerStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Eagerly loads every stored partition into the cache. Called once at
    /// session start; later reads are cache hits.
    pub async fn load_all(&mut self) -> Result<()> {
        self.ensure_root().await?;
        let mut entries = fs::read_dir(&self.root)
            .await
            .with_context(|| format!("reading store directory {}", self.root.display()))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .with_context(|| format!("listing store directory {}", self.root.display()))?
        {
            let path = entry.path();
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(n) => n,
                None => continue,
            };
            let key = match name.strip_suffix(".json") {
                Some(k) => k,
                None => continue,
            };
            if !key.starts_with(STORAGE_PREFIX) {
                continue;
            }
            let key = key.to_string();
            let partition = self.read_partition(&key).await;
            self.cache.insert(key, partition);
        }

        debug!(partitions = self.cache.len(), "tracker store loaded");
        Ok(())
    }

    /// Cached partition for a key, fetching and parsing from backing
    /// storage on a miss. Unknown keys resolve to an empty partition.
    pub async fn partition(&mut self, key: &str) -> &mut Partition {
        if !self.cache.contains_key(key) {
            let partition = self.read_partition(key).await;
            self.cache.insert(key.to_string(), partition);
        }
        self.cache.get_mut(key).expect("partition cached above")
    }

    /// Replaces a cached partition. Nothing hits disk until `flush_all`.
    pub fn insert(&mut self, key: &str, partition: Partition) {
        self.cache.insert(key.to_string(), partition);
    }

    pub fn keys(&self) -> Vec<String> {
        self.cache.keys().cloned().collect()
    }

    /// Writes every cached partition to backing storage. Individual write
    /// failures are logged and skipped so one bad key cannot hold the rest
    /// of the flush hostage.
    pub async fn flush_all(&self) -> Result<()> {
        self.ensure_root().await?;
        let mut written = 0usize;
        for (key, partition) in &self.cache {
            let json = match serde_json::to_string(partition) {
                Ok(json) => json,
                Err(err) => {
                    warn!(%key, %err, "failed to serialize partition; skipping");
                    continue;
                }
            };
            if let Err(err) = fs::write(self.file_for(key), json).await {
                warn!(%key, %err, "failed to write partition; skipping");
                continue;
            }
            written += 1;
        }
        debug!(written, "tracker store flushed");
        Ok(())
    }

    /// Removes a partition from backing storage and cache immediately.
    pub async fn delete_key(&mut self, key: &str) -> Result<()> {
        self.cache.remove(key);
        match fs::remove_file(self.file_for(key)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(err).with_context(|| format!("deleting stored partition {key}"))
            }
        }
    }

    pub fn record(&self, key: &str, id: &str) -> Option<&PropertyRecord> {
        self.cache.get(key)?.get(id)
    }

    /// Oldest record for an id across every cached partition. A property's
    /// age belongs to the property, not to the search that found it.
    pub fn earliest_record(&self, id: &str) -> Option<&PropertyRecord> {
        self.cache
            .values()
            .filter_map(|partition| partition.get(id))
            .min_by_key(|record| record.first_seen)
    }

    /// Applies a probe verdict to every partition holding the id, resolving
    /// `last_seen` to the newest timestamp any of them recorded so a
    /// propagated update never regresses a fresher observation.
    pub fn propagate_status(
        &mut self,
        id: &str,
        is_active: Option<bool>,
        status: PropertyStatus,
        now: DateTime<Utc>,
    ) {
        let newest = self
            .cache
            .values()
            .filter_map(|partition| partition.get(id))
            .map(|record| record.last_seen)
            .max()
            .unwrap_or(now);

        for partition in self.cache.values_mut() {
            if let Some(record) = partition.get_mut(id) {
                record.last_seen = newest;
                record.is_active = is_active;
                record.status = status;
            }
        }
    }

    async fn read_partition(&self, key: &str) -> Partition {
        match fs::read_to_string(self.file_for(key)).await {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(partition) => partition,
                Err(err) => {
                    warn!(%key, %err, "malformed stored partition; starting empty");
                    Partition::new()
                }
            },
            Err(_) => Partition::new(),
        }
    }

    async fn ensure_root(&self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("creating store directory {}", self.root.display()))
    }

    fn file_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PropertyStatus;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn record(id: &str, last_seen_day: u32) -> PropertyRecord {
        let ts = Utc
            .with_ymd_and_hms(2024, 3, last_seen_day, 12, 0, 0)
            .single()
            .unwrap();
        PropertyRecord {
            id: id.to_string(),
            url: format!("https://www.idealista.pt/imovel/{id}/"),
            price: 1000,
            typology: "T1".to_string(),
            area: "50 m²".to_string(),
            has_garage: false,
            first_seen: ts,
            initial_price: 1000,
            last_seen: ts,
            is_active: Some(true),
            status: PropertyStatus::Listed,
            location: String::new(),
            sub_location: String::new(),
            history: Vec::new(),
        }
    }

    #[tokio::test]
    async fn set_flush_and_reload_round_trips() {
        let dir = tempdir().unwrap();
        let key = format!("{STORAGE_PREFIX}sale_houses_lisboa_default");

        let mut store = TrackerStore::new(dir.path());
        let mut partition = Partition::new();
        partition.insert("123".to_string(), record("123", 1));
        store.insert(&key, partition);
        store.flush_all().await.unwrap();

        let mut reopened = TrackerStore::new(dir.path());
        reopened.load_all().await.unwrap();
        assert_eq!(reopened.keys(), vec![key.clone()]);
        assert!(reopened.record(&key, "123").is_some());
    }

    #[tokio::test]
    async fn malformed_stored_json_reads_as_empty_partition() {
        let dir = tempdir().unwrap();
        let key = format!("{STORAGE_PREFIX}sale_houses_porto_default");
        std::fs::write(dir.path().join(format!("{key}.json")), "{not json").unwrap();

        let mut store = TrackerStore::new(dir.path());
        store.load_all().await.unwrap();
        assert!(store.partition(&key).await.is_empty());
    }

    #[tokio::test]
    async fn lazy_miss_resolves_to_empty_partition() {
        let dir = tempdir().unwrap();
        let mut store = TrackerStore::new(dir.path());
        let partition = store.partition("idealista_tracker_v7_rent_rooms").await;
        assert!(partition.is_empty());
    }

    #[tokio::test]
    async fn load_all_skips_files_outside_the_namespace() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("notes.json"), "{}").unwrap();
        std::fs::write(dir.path().join("readme.txt"), "hello").unwrap();

        let mut store = TrackerStore::new(dir.path());
        store.load_all().await.unwrap();
        assert!(store.keys().is_empty());
    }

    #[tokio::test]
    async fn delete_key_takes_effect_immediately() {
        let dir = tempdir().unwrap();
        let key = format!("{STORAGE_PREFIX}sale_houses_faro_default");

        let mut store = TrackerStore::new(dir.path());
        let mut partition = Partition::new();
        partition.insert("7".to_string(), record("7", 2));
        store.insert(&key, partition);
        store.flush_all().await.unwrap();
        assert!(dir.path().join(format!("{key}.json")).exists());

        store.delete_key(&key).await.unwrap();
        assert!(!dir.path().join(format!("{key}.json")).exists());
        assert!(store.keys().is_empty());

        // Deleting an absent key is not an error.
        store.delete_key(&key).await.unwrap();
    }

    #[tokio::test]
    async fn earliest_record_spans_partitions() {
        let dir = tempdir().unwrap();
        let mut store = TrackerStore::new(dir.path());

        let mut older = Partition::new();
        let mut early = record("42", 1);
        early.first_seen = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap();
        older.insert("42".to_string(), early);
        store.insert(&format!("{STORAGE_PREFIX}a"), older);

        let mut newer = Partition::new();
        newer.insert("42".to_string(), record("42", 10));
        store.insert(&format!("{STORAGE_PREFIX}b"), newer);

        let earliest = store.earliest_record("42").unwrap();
        assert_eq!(
            earliest.first_seen,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap()
        );
    }

    #[tokio::test]
    async fn propagate_status_resolves_last_seen_to_the_maximum() {
        let dir = tempdir().unwrap();
        let mut store = TrackerStore::new(dir.path());

        let mut a = Partition::new();
        a.insert("9".to_string(), record("9", 3));
        store.insert(&format!("{STORAGE_PREFIX}a"), a);

        let mut b = Partition::new();
        b.insert("9".to_string(), record("9", 20));
        store.insert(&format!("{STORAGE_PREFIX}b"), b);

        let now = Utc.with_ymd_and_hms(2024, 3, 25, 0, 0, 0).single().unwrap();
        store.propagate_status("9", Some(false), PropertyStatus::Removed, now);

        let newest = Utc.with_ymd_and_hms(2024, 3, 20, 12, 0, 0).single().unwrap();
        for key in ["a", "b"] {
            let record = store
                .record(&format!("{STORAGE_PREFIX}{key}"), "9")
                .unwrap();
            assert_eq!(record.last_seen, newest);
            assert_eq!(record.status, PropertyStatus::Removed);
            assert_eq!(record.is_active, Some(false));
        }
    }
}
