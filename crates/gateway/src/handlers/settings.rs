//! User settings handlers
//!
//! Settings are arbitrary JSON values keyed per user. The LLM handlers read
//! `llm.temperature` and `llm.api_key` as per-user overrides.

use axum::extract::{Path, State};
use axum::Json;
use plasmahub_common::{
    auth::AuthContext,
    db::{models::Setting, Repository},
    errors::{AppError, Result},
};
use serde::Deserialize;
use serde_json::Value;

use crate::AppState;

const MAX_KEY_LEN: usize = 128;

#[derive(Debug, Deserialize)]
pub struct PutSettingRequest {
    pub value: Value,
}

/// GET /api/settings
pub async fn list_settings(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<Vec<Setting>>> {
    let repo = Repository::new(state.db.clone());
    Ok(Json(repo.list_settings(auth.user_id).await?))
}

/// GET /api/settings/{key}
pub async fn get_setting(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(key): Path<String>,
) -> Result<Json<Setting>> {
    let repo = Repository::new(state.db.clone());

    repo.get_setting(auth.user_id, &key)
        .await?
        .map(Json)
        .ok_or(AppError::SettingNotFound { key })
}

/// PUT /api/settings/{key}
pub async fn put_setting(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(key): Path<String>,
    Json(request): Json<PutSettingRequest>,
) -> Result<Json<Setting>> {
    let key = key.trim().to_string();
    if key.is_empty() || key.len() > MAX_KEY_LEN {
        return Err(AppError::Validation {
            message: format!("Setting key must be 1-{} characters", MAX_KEY_LEN),
            field: Some("key".to_string()),
        });
    }
    if request.value.is_null() {
        return Err(AppError::Validation {
            message: "Setting value must not be null".to_string(),
            field: Some("value".to_string()),
        });
    }

    let repo = Repository::new(state.db.clone());
    let setting = repo.upsert_setting(auth.user_id, &key, request.value).await?;

    tracing::info!(key = %setting.key, user_id = %auth.user_id, "Setting updated");

    Ok(Json(setting))
}
