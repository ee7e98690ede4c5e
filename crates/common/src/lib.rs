//! PlasmaHub Common Library
//!
//! Shared code for the PlasmaHub backend including:
//! - Database models and repository patterns
//! - External search provider clients (SerpAPI, PubMed, PatentsView)
//! - LLM relay client and prompt templates
//! - Error types and handling
//! - Configuration management
//! - Authentication utilities
//! - Journal impact-factor enrichment
//! - Trend aggregation
//! - Metrics and observability

pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod journals;
pub mod llm;
pub mod metrics;
pub mod providers;
pub mod trends;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::Repository;
pub use errors::{AppError, Result};
pub use providers::{PaperRecord, PaperSource, SearchProvider};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default Perplexity chat model
pub const DEFAULT_LLM_MODEL: &str = "sonar-pro";

/// Normalize a title or journal name for duplicate and lookup matching:
/// lowercase, trim, and collapse interior whitespace runs to single spaces.
pub fn normalize_text(raw: &str) -> String {
    raw.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_text() {
        assert_eq!(
            normalize_text("  Plasma   Catalysis\tfor CO2  "),
            "plasma catalysis for co2"
        );
        assert_eq!(normalize_text(""), "");
    }
}
