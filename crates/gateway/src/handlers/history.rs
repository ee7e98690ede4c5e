//! Search history handler

use axum::extract::{Query, State};
use axum::Json;
use plasmahub_common::{
    auth::AuthContext,
    db::{models::SearchHistory, Repository},
    errors::Result,
};
use serde::Deserialize;

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_limit() -> u64 {
    50
}

/// GET /api/search-history - most recent provider searches first
pub async fn list_history(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<SearchHistory>>> {
    let limit = params.limit.clamp(1, 500);

    let repo = Repository::new(state.db.clone());
    let entries = repo.list_search_history(auth.user_id, limit).await?;

    Ok(Json(entries))
}
