//! External search provider clients
//!
//! Each upstream (SerpAPI Google Scholar, NCBI E-utilities, USPTO
//! PatentsView) implements the [`SearchProvider`] trait and maps its
//! responses into the uniform [`PaperRecord`] shape. Providers are called
//! once per request with no retry or backoff; upstream failures surface as
//! `AppError::Provider` (HTTP 502).

mod pubmed;
mod scholar;
mod uspto;

pub use pubmed::PubMedProvider;
pub use scholar::ScholarProvider;
pub use uspto::UsptoProvider;

use crate::config::ProvidersConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Where a record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaperSource {
    GoogleScholar,
    Pubmed,
    Patent,
}

impl PaperSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaperSource::GoogleScholar => "google_scholar",
            PaperSource::Pubmed => "pubmed",
            PaperSource::Patent => "patent",
        }
    }
}

impl std::fmt::Display for PaperSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniform search result shape across all providers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperRecord {
    pub title: String,
    pub authors: Vec<String>,
    pub abstract_text: Option<String>,
    pub journal: Option<String>,
    pub year: Option<i32>,
    pub source: PaperSource,
    pub url: Option<String>,
    pub citations: Option<i32>,
    pub doi: Option<String>,
    /// Filled by journal enrichment when the journal is known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub impact_factor: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jcr_percentile: Option<f64>,
}

/// Query parameters common to all providers
#[derive(Debug, Clone, Default)]
pub struct ProviderQuery {
    pub query: String,
    pub limit: usize,
    pub year_from: Option<i32>,
    pub year_to: Option<i32>,
    pub page: usize,
}

/// Interface implemented by every search provider
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Stable identifier used in history rows and metrics (e.g. "pubmed")
    fn id(&self) -> &'static str;

    /// Human-readable name
    fn name(&self) -> &'static str;

    /// Run a search against the upstream service
    async fn search(&self, query: &ProviderQuery) -> Result<Vec<PaperRecord>>;
}

/// Build the shared HTTP client for provider calls
pub(crate) fn build_client(config: &ProvidersConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| AppError::Configuration {
            message: format!("Failed to build HTTP client: {}", e),
        })
}

/// Map a non-success upstream status into a provider error
pub(crate) async fn provider_error(provider: &str, response: reqwest::Response) -> AppError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let preview: String = body.chars().take(300).collect();

    AppError::Provider {
        provider: provider.to_string(),
        message: format!("HTTP {}: {}", status, preview),
    }
}

/// Extract a 4-digit publication year from free text
pub(crate) fn parse_year(text: &str) -> Option<i32> {
    let re = regex_lite::Regex::new(r"\b(19|20)\d{2}\b").ok()?;
    re.find(text)?.as_str().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_as_str() {
        assert_eq!(PaperSource::GoogleScholar.as_str(), "google_scholar");
        assert_eq!(PaperSource::Pubmed.as_str(), "pubmed");
        assert_eq!(PaperSource::Patent.as_str(), "patent");
    }

    #[test]
    fn test_parse_year() {
        assert_eq!(parse_year("Appl Catal B, 2021"), Some(2021));
        assert_eq!(parse_year("vol 12 pp 1999-2010"), Some(1999));
        assert_eq!(parse_year("no year here"), None);
        assert_eq!(parse_year("3021"), None);
    }
}
