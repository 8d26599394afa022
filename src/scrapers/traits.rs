use crate::models::RawProperty;
use anyhow::Result;
use async_trait::async_trait;

/// Common trait for listing-page scrapers
/// This allows swapping the fetch path without touching the engine
#[async_trait]
pub trait ListingScraper: Send + Sync {
    /// Fetch a search-results page and extract its visible property cards
    async fn scrape(&self, url: &str) -> Result<Vec<RawProperty>>;

    /// Get the name of the scraped source
    fn source_name(&self) -> &'static str;
}
