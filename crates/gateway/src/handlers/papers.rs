//! Paper library handlers
//!
//! Saving runs the incoming batch through journal enrichment and the
//! repository's title/DOI deduplication; the response reports how many rows
//! were actually written versus skipped.

use axum::extract::{Path, Query, State};
use axum::Json;
use plasmahub_common::{
    auth::AuthContext,
    db::{models::Paper, NewPaper, Repository},
    errors::{AppError, Result},
    journals, metrics,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Instant;
use uuid::Uuid;

use crate::AppState;

/// Incoming paper in a save request
#[derive(Debug, Clone, Deserialize)]
pub struct PaperInput {
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    pub abstract_text: Option<String>,
    pub journal: Option<String>,
    pub year: Option<i32>,
    #[serde(default = "default_source")]
    pub source: String,
    pub url: Option<String>,
    pub citations: Option<i32>,
    pub doi: Option<String>,
    pub impact_factor: Option<f64>,
    pub jcr_percentile: Option<f64>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

fn default_source() -> String {
    "google_scholar".to_string()
}

#[derive(Debug, Deserialize)]
pub struct SavePapersRequest {
    pub papers: Vec<PaperInput>,
}

#[derive(Serialize)]
pub struct SavePapersResponse {
    pub saved: usize,
    pub skipped: usize,
    pub total: usize,
}

#[derive(Debug, Deserialize)]
pub struct ListPapersParams {
    #[serde(default)]
    pub offset: u64,
    #[serde(default = "default_list_limit")]
    pub limit: u64,
    pub source: Option<String>,
}

fn default_list_limit() -> u64 {
    50
}

#[derive(Serialize)]
pub struct ListPapersResponse {
    pub papers: Vec<Paper>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

/// POST /api/papers/save - save a batch, skipping duplicates
pub async fn save_papers(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<SavePapersRequest>,
) -> Result<Json<SavePapersResponse>> {
    let start = Instant::now();

    if request.papers.is_empty() {
        return Err(AppError::Validation {
            message: "papers must not be empty".to_string(),
            field: Some("papers".to_string()),
        });
    }

    let total = request.papers.len();

    let incoming: Vec<NewPaper> = request
        .papers
        .into_iter()
        .map(|paper| {
            // A row needs at least one dedup key
            let has_title = !paper.title.trim().is_empty();
            let has_doi = paper.doi.as_deref().is_some_and(|d| !d.trim().is_empty());
            if !has_title && !has_doi {
                return Err(AppError::Validation {
                    message: "Each paper needs a title or a DOI".to_string(),
                    field: Some("papers".to_string()),
                });
            }

            // Fill impact factor from the embedded table when the client
            // did not already provide one
            let (impact_factor, jcr_percentile) = match (&paper.journal, paper.impact_factor) {
                (Some(journal), None) => journals::lookup(journal)
                    .map(|info| (Some(info.impact_factor), Some(info.jcr_percentile)))
                    .unwrap_or((None, paper.jcr_percentile)),
                _ => (paper.impact_factor, paper.jcr_percentile),
            };

            let metadata = if paper.metadata.is_null() {
                json!({})
            } else {
                paper.metadata
            };

            Ok(NewPaper {
                title: paper.title,
                authors: paper.authors,
                abstract_text: paper.abstract_text,
                journal: paper.journal,
                year: paper.year,
                source: paper.source,
                url: paper.url,
                citations: paper.citations,
                doi: paper.doi,
                impact_factor,
                jcr_percentile,
                metadata,
            })
        })
        .collect::<Result<_>>()?;

    let repo = Repository::new(state.db.clone());
    let outcome = repo.save_papers(auth.user_id, incoming).await?;

    metrics::record_papers_saved(outcome.saved, outcome.skipped);

    tracing::info!(
        saved = outcome.saved,
        skipped = outcome.skipped,
        total,
        latency_ms = start.elapsed().as_millis() as u64,
        user_id = %auth.user_id,
        "Papers saved"
    );

    Ok(Json(SavePapersResponse {
        saved: outcome.saved,
        skipped: outcome.skipped,
        total,
    }))
}

/// GET /api/saved-papers - list the user's library
pub async fn list_papers(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(params): Query<ListPapersParams>,
) -> Result<Json<ListPapersResponse>> {
    let limit = params.limit.clamp(1, 200);

    let repo = Repository::new(state.db.clone());
    let (papers, total) = repo
        .list_papers(auth.user_id, params.offset, limit, params.source.as_deref())
        .await?;

    Ok(Json(ListPapersResponse {
        papers,
        total,
        offset: params.offset,
        limit,
    }))
}

/// GET /api/papers/{id}
pub async fn get_paper(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Paper>> {
    let repo = Repository::new(state.db.clone());

    repo.find_paper(auth.user_id, id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::PaperNotFound { id: id.to_string() })
}

/// DELETE /api/papers/{id}
pub async fn delete_paper(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    let repo = Repository::new(state.db.clone());

    if !repo.delete_paper(auth.user_id, id).await? {
        return Err(AppError::PaperNotFound { id: id.to_string() });
    }

    tracing::info!(paper_id = %id, user_id = %auth.user_id, "Paper deleted");

    Ok(Json(json!({"deleted": true, "id": id})))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paper_input_defaults() {
        let input: PaperInput = serde_json::from_str(
            r#"{"title": "Plasma catalysis at atmospheric pressure"}"#,
        )
        .unwrap();

        assert_eq!(input.title, "Plasma catalysis at atmospheric pressure");
        assert!(input.authors.is_empty());
        assert_eq!(input.source, "google_scholar");
        assert!(input.metadata.is_null());
    }

    #[test]
    fn test_paper_input_full() {
        let input: PaperInput = serde_json::from_str(
            r#"{
                "title": "DBD reactor study",
                "authors": ["A Bogaerts"],
                "journal": "ACS Catalysis",
                "year": 2022,
                "source": "pubmed",
                "doi": "10.1021/acscatal.2c01234"
            }"#,
        )
        .unwrap();

        assert_eq!(input.authors.len(), 1);
        assert_eq!(input.year, Some(2022));
        assert_eq!(input.source, "pubmed");
    }
}
