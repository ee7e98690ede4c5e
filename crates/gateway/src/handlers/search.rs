//! Provider search handlers
//!
//! Each endpoint proxies one upstream provider, enriches the results with
//! journal impact factors, and records the query in the user's search
//! history. Upstream failures surface as 502 responses.

use axum::extract::{Query, State};
use axum::Json;
use plasmahub_common::{
    auth::AuthContext,
    db::Repository,
    errors::{AppError, Result},
    journals, metrics,
    providers::{PaperRecord, ProviderQuery, SearchProvider},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Instant;
use validator::Validate;

use crate::AppState;

const MAX_LIMIT: usize = 100;

/// Search query parameters (accepted as `?q=` query string or JSON body)
#[derive(Debug, Deserialize, Validate)]
pub struct SearchParams {
    #[serde(alias = "q")]
    #[validate(length(min = 1, max = 500))]
    pub query: String,

    /// Maximum results to return
    #[serde(default = "default_limit")]
    pub limit: usize,

    /// Zero-based result page
    #[serde(default)]
    pub page: usize,

    pub year_from: Option<i32>,
    pub year_to: Option<i32>,
}

fn default_limit() -> usize {
    20
}

/// Search response
#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub source: String,
    pub total_results: usize,
    pub results: Vec<PaperRecord>,
    pub processing_time_ms: u64,
}

/// Run a provider search: validate, search, enrich, record history
async fn run_search(
    state: &AppState,
    auth: &AuthContext,
    provider: &dyn SearchProvider,
    params: SearchParams,
) -> Result<Json<SearchResponse>> {
    let start = Instant::now();

    params.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    if let (Some(from), Some(to)) = (params.year_from, params.year_to) {
        if from > to {
            return Err(AppError::Validation {
                message: "year_from must not exceed year_to".to_string(),
                field: Some("year_from".to_string()),
            });
        }
    }

    let query = ProviderQuery {
        query: params.query.clone(),
        limit: params.limit.clamp(1, MAX_LIMIT),
        year_from: params.year_from,
        year_to: params.year_to,
        page: params.page,
    };

    let search_result = provider.search(&query).await;
    let elapsed = start.elapsed().as_secs_f64();

    let mut results = match search_result {
        Ok(results) => {
            metrics::record_provider_search(provider.id(), elapsed, results.len(), true);
            results
        }
        Err(e) => {
            metrics::record_provider_search(provider.id(), elapsed, 0, false);
            return Err(e);
        }
    };

    journals::enrich_all(&mut results);

    // History is best-effort; a write failure must not fail the search
    let filters = json!({
        "limit": query.limit,
        "page": query.page,
        "year_from": query.year_from,
        "year_to": query.year_to,
    });
    let repo = Repository::new(state.db.clone());
    if let Err(e) = repo
        .record_search(auth.user_id, &params.query, provider.id(), filters, results.len())
        .await
    {
        tracing::warn!(error = %e, "Failed to record search history");
    }

    let processing_time_ms = start.elapsed().as_millis() as u64;

    tracing::info!(
        query = %params.query,
        source = provider.id(),
        results = results.len(),
        latency_ms = processing_time_ms,
        user_id = %auth.user_id,
        request_id = %auth.request_id,
        "Provider search completed"
    );

    Ok(Json(SearchResponse {
        query: params.query,
        source: provider.id().to_string(),
        total_results: results.len(),
        results,
        processing_time_ms,
    }))
}

/// GET /api/scholar - Google Scholar via SerpAPI
pub async fn scholar_search(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>> {
    let provider = state
        .providers
        .scholar
        .as_ref()
        .ok_or_else(|| AppError::Configuration {
            message: "Google Scholar search is not configured (providers.serpapi_key)".to_string(),
        })?;

    run_search(&state, &auth, provider, params).await
}

/// GET /api/pubmed/search - NCBI E-utilities
pub async fn pubmed_search(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>> {
    run_search(&state, &auth, &state.providers.pubmed, params).await
}

/// POST /api/uspto/search - PatentsView (JSON body, matching the upstream
/// POST query document style)
pub async fn uspto_search(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(params): Json<SearchParams>,
) -> Result<Json<SearchResponse>> {
    let provider = state
        .providers
        .uspto
        .as_ref()
        .ok_or_else(|| AppError::Configuration {
            message: "USPTO search is not configured (providers.patentsview_key)".to_string(),
        })?;

    run_search(&state, &auth, provider, params).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_validation() {
        let params = SearchParams {
            query: "".to_string(),
            limit: default_limit(),
            page: 0,
            year_from: None,
            year_to: None,
        };
        assert!(params.validate().is_err());

        let params = SearchParams {
            query: "plasma catalysis".to_string(),
            limit: 10,
            page: 0,
            year_from: Some(2015),
            year_to: Some(2024),
        };
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_limit_clamped() {
        assert_eq!(500usize.clamp(1, MAX_LIMIT), 100);
        assert_eq!(0usize.clamp(1, MAX_LIMIT), 1);
    }

    #[test]
    fn test_query_accepts_q_alias() {
        let params: SearchParams =
            serde_json::from_str(r#"{"q": "plasma catalysis", "limit": 5}"#).unwrap();
        assert_eq!(params.query, "plasma catalysis");
        assert_eq!(params.limit, 5);

        let params: SearchParams = serde_json::from_str(r#"{"query": "DBD reactor"}"#).unwrap();
        assert_eq!(params.query, "DBD reactor");
        assert_eq!(params.limit, default_limit());
    }
}
