use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Availability classification for a tracked property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyStatus {
    /// Present in the current search results.
    #[serde(rename = "listed")]
    Listed,
    /// Still online, but no longer matched by this search.
    #[serde(rename = "notlisted")]
    NotListed,
    /// The listing page itself is gone.
    #[serde(rename = "removed")]
    Removed,
    /// Status probe failed; availability unknown.
    #[serde(rename = "error")]
    Error,
}

/// One observed price transition. Appended, never rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceChange {
    pub date: DateTime<Utc>,
    pub old_price: i64,
    pub new_price: i64,
    pub change: i64,
}

/// Core tracked property model.
///
/// `first_seen` and `initial_price` are set once when the property is first
/// observed in any search context and never overwritten afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyRecord {
    pub id: String,
    pub url: String,
    pub price: i64,
    pub typology: String,
    pub area: String,
    pub has_garage: bool,
    pub first_seen: DateTime<Utc>,
    pub initial_price: i64,
    pub last_seen: DateTime<Utc>,
    /// None when the last status probe errored out.
    pub is_active: Option<bool>,
    pub status: PropertyStatus,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub sub_location: String,
    #[serde(default)]
    pub history: Vec<PriceChange>,
}

/// Snapshot of a single result card, as handed over by the extractor.
/// Carries no timestamps or history; the engine owns those.
#[derive(Debug, Clone, PartialEq)]
pub struct RawProperty {
    pub id: String,
    pub url: String,
    pub price: i64,
    pub typology: String,
    pub area: String,
    pub has_garage: bool,
}

/// All records known for one search context, keyed by property id.
pub type Partition = HashMap<String, PropertyRecord>;
