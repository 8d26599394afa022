use crate::scrapers::USER_AGENT;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

/// Result of a single existence check against a listing URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The listing page still answers.
    Exists,
    /// The listing page is gone (HTTP 404).
    NotFound,
    /// Transport-level failure; availability unknown.
    Error,
}

/// Lightweight existence check for a property URL. Implementations must not
/// fail: transport problems map to `ProbeOutcome::Error`.
#[async_trait]
pub trait StatusProbe: Send + Sync {
    async fn check(&self, url: &str) -> ProbeOutcome;
}

/// HEAD-request probe against the live site. Headers only, no body fetch.
pub struct HttpStatusProbe {
    client: Client,
}

impl HttpStatusProbe {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client for status probe")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl StatusProbe for HttpStatusProbe {
    async fn check(&self, url: &str) -> ProbeOutcome {
        match self.client.head(url).send().await {
            Ok(response) if response.status() == StatusCode::NOT_FOUND => ProbeOutcome::NotFound,
            Ok(response) => {
                debug!(url, status = %response.status(), "listing still answers");
                ProbeOutcome::Exists
            }
            Err(err) => {
                debug!(url, %err, "status probe failed");
                ProbeOutcome::Error
            }
        }
    }
}
