//! Trend aggregation handler

use axum::extract::{Query, State};
use axum::Json;
use plasmahub_common::{
    auth::AuthContext,
    db::Repository,
    errors::Result,
    trends::{self, TrendReport, DEFAULT_TOP_N},
};
use serde::Deserialize;
use std::time::Instant;

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct TrendParams {
    #[serde(default = "default_top")]
    pub top: usize,
}

fn default_top() -> usize {
    DEFAULT_TOP_N
}

/// GET /api/trends - aggregate statistics over the user's saved papers
pub async fn get_trends(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(params): Query<TrendParams>,
) -> Result<Json<TrendReport>> {
    let start = Instant::now();

    let repo = Repository::new(state.db.clone());
    let papers = repo.all_papers(auth.user_id).await?;
    let report = trends::build_report(&papers, params.top.clamp(1, 50));

    tracing::info!(
        papers = report.total_papers,
        latency_ms = start.elapsed().as_millis() as u64,
        user_id = %auth.user_id,
        "Trend report built"
    );

    Ok(Json(report))
}
