//! LLM analysis handlers
//!
//! Four generation operations (batch analysis, critical research analysis,
//! introduction drafting, paper planning) plus listings of stored results.
//! Input papers come either from the saved library by id or inline in the
//! request body. A response the model fails to emit as JSON is stored with
//! the raw text under a `parse_error` payload rather than failing the call.

use axum::extract::{Query, State};
use axum::Json;
use plasmahub_common::{
    auth::{content_fingerprint, AuthContext},
    db::{
        models::{Analysis, Introduction, Paper, PaperPlan},
        Repository,
    },
    errors::{AppError, Result},
    llm::{parse_payload, prompts},
    metrics,
    providers::{PaperRecord, PaperSource},
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Instant;
use uuid::Uuid;

use crate::AppState;

const MAX_BATCH: usize = 25;

/// Per-user setting keys consulted before each LLM call
const SETTING_TEMPERATURE: &str = "llm.temperature";
const SETTING_API_KEY: &str = "llm.api_key";

/// Inline paper supplied directly in an analysis request
#[derive(Debug, Clone, Deserialize)]
pub struct InlinePaper {
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    pub abstract_text: Option<String>,
    pub journal: Option<String>,
    pub year: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    /// Saved paper ids to analyze
    #[serde(default)]
    pub paper_ids: Vec<Uuid>,

    /// Inline papers (used when ids are not provided)
    #[serde(default)]
    pub papers: Vec<InlinePaper>,

    /// Optional aspect to steer the analysis toward
    pub focus: Option<String>,

    /// Analyze each paper separately with a bounded fan-out instead of one
    /// combined prompt
    #[serde(default)]
    pub per_paper: bool,
}

#[derive(Debug, Deserialize)]
pub struct ResearchAnalysisRequest {
    /// Free-text research summary to assess
    pub summary: String,

    pub focus: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TopicRequest {
    pub topic: String,

    #[serde(default)]
    pub paper_ids: Vec<Uuid>,

    #[serde(default)]
    pub papers: Vec<InlinePaper>,
}

#[derive(Serialize)]
pub struct AnalysisResponse {
    pub id: Uuid,
    pub kind: String,
    pub title: String,
    pub payload: Value,
    pub model: String,
    pub parse_error: bool,
    pub processing_time_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct ListAnalysesParams {
    pub kind: Option<String>,
}

fn record_from_model(paper: &Paper) -> PaperRecord {
    let source = match paper.source.as_str() {
        "pubmed" => PaperSource::Pubmed,
        "patent" => PaperSource::Patent,
        _ => PaperSource::GoogleScholar,
    };

    PaperRecord {
        title: paper.title.clone(),
        authors: serde_json::from_value(paper.authors.clone()).unwrap_or_default(),
        abstract_text: paper.abstract_text.clone(),
        journal: paper.journal.clone(),
        year: paper.year,
        source,
        url: paper.url.clone(),
        citations: paper.citations,
        doi: paper.doi.clone(),
        impact_factor: paper.impact_factor,
        jcr_percentile: paper.jcr_percentile,
    }
}

fn record_from_inline(paper: InlinePaper) -> PaperRecord {
    PaperRecord {
        title: paper.title,
        authors: paper.authors,
        abstract_text: paper.abstract_text,
        journal: paper.journal,
        year: paper.year,
        source: PaperSource::GoogleScholar,
        url: None,
        citations: None,
        doi: None,
        impact_factor: None,
        jcr_percentile: None,
    }
}

/// Collect request papers: saved ids take precedence over inline papers.
/// May come back empty; callers that need at least one paper check that.
async fn collect_records(
    repo: &Repository,
    auth: &AuthContext,
    paper_ids: Vec<Uuid>,
    inline: Vec<InlinePaper>,
) -> Result<Vec<PaperRecord>> {
    let records: Vec<PaperRecord> = if !paper_ids.is_empty() {
        let found = repo.find_papers_by_ids(auth.user_id, &paper_ids).await?;
        if found.is_empty() {
            return Err(AppError::PaperNotFound {
                id: paper_ids[0].to_string(),
            });
        }
        found.iter().map(record_from_model).collect()
    } else {
        inline
            .into_iter()
            .filter(|p| !p.title.trim().is_empty())
            .map(record_from_inline)
            .collect()
    };

    if records.len() > MAX_BATCH {
        return Err(AppError::Validation {
            message: format!("At most {} papers per analysis", MAX_BATCH),
            field: Some("papers".to_string()),
        });
    }

    Ok(records)
}

/// Collect request papers, requiring at least one
async fn resolve_papers(
    repo: &Repository,
    auth: &AuthContext,
    paper_ids: Vec<Uuid>,
    inline: Vec<InlinePaper>,
) -> Result<Vec<PaperRecord>> {
    let records = collect_records(repo, auth, paper_ids, inline).await?;

    if records.is_empty() {
        return Err(AppError::Validation {
            message: "No papers to analyze: provide paper_ids or papers".to_string(),
            field: None,
        });
    }

    Ok(records)
}

/// Per-user LLM overrides pulled from settings
struct LlmOverrides {
    temperature: f64,
    api_key: Option<String>,
}

async fn llm_overrides(state: &AppState, repo: &Repository, auth: &AuthContext) -> LlmOverrides {
    let mut overrides = LlmOverrides {
        temperature: state.llm.default_temperature,
        api_key: None,
    };

    // Settings are optional overrides; read failures fall back to defaults
    match repo.get_setting(auth.user_id, SETTING_TEMPERATURE).await {
        Ok(Some(setting)) => {
            if let Some(t) = setting.value.as_f64() {
                overrides.temperature = t.clamp(0.0, 2.0);
            }
        }
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, "Failed to read temperature setting"),
    }

    match repo.get_setting(auth.user_id, SETTING_API_KEY).await {
        Ok(Some(setting)) => {
            overrides.api_key = setting.value.as_str().map(String::from);
        }
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, "Failed to read API key setting"),
    }

    overrides
}

fn batch_title(records: &[PaperRecord]) -> String {
    if records.len() == 1 {
        records[0].title.clone()
    } else {
        format!("Analysis of {} papers", records.len())
    }
}

fn batch_fingerprint(kind: &str, records: &[PaperRecord]) -> String {
    let titles: Vec<&str> = records.iter().map(|r| r.title.as_str()).collect();
    content_fingerprint(kind, &titles.join("\n"))
}

/// Run one completion, parse it, and record metrics
async fn complete_and_parse(
    state: &AppState,
    operation: &str,
    user_prompt: &str,
    overrides: &LlmOverrides,
    fallback: fn(&str) -> Value,
) -> Result<(Value, bool)> {
    let start = Instant::now();

    let outcome = state
        .llm
        .chat(
            prompts::ANALYSIS_SYSTEM,
            user_prompt,
            overrides.temperature,
            overrides.api_key.as_deref(),
        )
        .await;

    let elapsed = start.elapsed().as_secs_f64();

    let outcome = match outcome {
        Ok(outcome) => {
            metrics::record_llm(
                operation,
                &state.llm.model,
                elapsed,
                outcome.usage.total_tokens,
                true,
            );
            outcome
        }
        Err(e) => {
            metrics::record_llm(operation, &state.llm.model, elapsed, 0, false);
            return Err(e);
        }
    };

    let (payload, fell_back) = parse_payload(&outcome.content, fallback);
    if fell_back {
        metrics::record_llm_parse_fallback(operation);
    }

    Ok((payload, fell_back))
}

fn analysis_response(analysis: Analysis, parse_error: bool, start: Instant) -> AnalysisResponse {
    AnalysisResponse {
        id: analysis.id,
        kind: analysis.kind,
        title: analysis.title,
        payload: analysis.payload,
        model: analysis.model,
        parse_error,
        processing_time_ms: start.elapsed().as_millis() as u64,
    }
}

/// POST /api/analyze-papers
pub async fn analyze_papers(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<AnalysisResponse>> {
    let start = Instant::now();
    let repo = Repository::new(state.db.clone());

    let records = resolve_papers(&repo, &auth, request.paper_ids, request.papers).await?;
    let overrides = llm_overrides(&state, &repo, &auth).await;

    let kind = "paper_analysis";
    let focus = request.focus.as_deref();
    let (payload, parse_error) = if request.per_paper && records.len() > 1 {
        analyze_per_paper(&state, &records, focus, &overrides).await?
    } else {
        let prompt = prompts::build_analysis_prompt(&records, focus);
        complete_and_parse(
            &state,
            "analyze_papers",
            &prompt,
            &overrides,
            prompts::analysis_fallback,
        )
        .await?
    };

    let analysis = repo
        .insert_analysis(
            auth.user_id,
            kind,
            &batch_title(&records),
            &batch_fingerprint(kind, &records),
            payload,
            &state.llm.model,
        )
        .await?;

    tracing::info!(
        analysis_id = %analysis.id,
        papers = records.len(),
        parse_error,
        user_id = %auth.user_id,
        "Paper analysis stored"
    );

    Ok(Json(analysis_response(analysis, parse_error, start)))
}

/// Fan out one completion per paper with bounded concurrency and collect
/// the per-paper payloads under a single analysis
async fn analyze_per_paper(
    state: &AppState,
    records: &[PaperRecord],
    focus: Option<&str>,
    overrides: &LlmOverrides,
) -> Result<(Value, bool)> {
    let start = Instant::now();

    let user_prompts: Vec<String> = records
        .iter()
        .map(|r| prompts::build_analysis_prompt(std::slice::from_ref(r), focus))
        .collect();

    let outcomes = state
        .llm
        .chat_many(
            prompts::ANALYSIS_SYSTEM,
            user_prompts,
            overrides.temperature,
            overrides.api_key.as_deref(),
        )
        .await;

    let mut any_fallback = false;
    let mut tokens: u64 = 0;
    let mut per_paper = Vec::with_capacity(records.len());

    for (record, outcome) in records.iter().zip(outcomes) {
        let outcome = outcome?;
        tokens += outcome.usage.total_tokens;

        let (payload, fell_back) =
            parse_payload(&outcome.content, prompts::analysis_fallback);
        if fell_back {
            any_fallback = true;
            metrics::record_llm_parse_fallback("analyze_papers");
        }

        per_paper.push(json!({
            "title": record.title,
            "analysis": payload,
        }));
    }

    metrics::record_llm(
        "analyze_papers",
        &state.llm.model,
        start.elapsed().as_secs_f64(),
        tokens,
        true,
    );

    let mut payload = json!({ "papers": per_paper });
    if any_fallback {
        payload["parse_error"] = Value::Bool(true);
    }

    Ok((payload, any_fallback))
}

/// POST /api/research-analysis - critical assessment of free-text research
pub async fn research_analysis(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<ResearchAnalysisRequest>,
) -> Result<Json<AnalysisResponse>> {
    let start = Instant::now();

    let summary = request.summary.trim().to_string();
    if summary.is_empty() {
        return Err(AppError::MissingField {
            field: "summary".to_string(),
        });
    }

    let repo = Repository::new(state.db.clone());
    let overrides = llm_overrides(&state, &repo, &auth).await;

    let kind = "research_analysis";
    let prompt = prompts::build_research_analysis_prompt(&summary, request.focus.as_deref());
    let (payload, parse_error) = complete_and_parse(
        &state,
        "research_analysis",
        &prompt,
        &overrides,
        prompts::research_analysis_fallback,
    )
    .await?;

    // Title the stored row by the focus when given, else the leading text
    let title = request
        .focus
        .filter(|f| !f.trim().is_empty())
        .unwrap_or_else(|| truncate_chars(&summary, 80));

    let analysis = repo
        .insert_analysis(
            auth.user_id,
            kind,
            &title,
            &content_fingerprint(kind, &summary),
            payload,
            &state.llm.model,
        )
        .await?;

    tracing::info!(
        analysis_id = %analysis.id,
        parse_error,
        user_id = %auth.user_id,
        "Research analysis stored"
    );

    Ok(Json(analysis_response(analysis, parse_error, start)))
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[derive(Serialize)]
pub struct IntroductionResponse {
    pub id: Uuid,
    pub topic: String,
    pub content: String,
    pub payload: Value,
    pub model: String,
    pub parse_error: bool,
    pub processing_time_ms: u64,
}

/// POST /api/generate-introduction
pub async fn generate_introduction(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<TopicRequest>,
) -> Result<Json<IntroductionResponse>> {
    let start = Instant::now();

    let topic = request.topic.trim().to_string();
    if topic.is_empty() {
        return Err(AppError::MissingField {
            field: "topic".to_string(),
        });
    }

    let repo = Repository::new(state.db.clone());
    let records = collect_records(&repo, &auth, request.paper_ids, request.papers).await?;
    let overrides = llm_overrides(&state, &repo, &auth).await;

    let prompt = prompts::build_introduction_prompt(&topic, &records);
    let (payload, parse_error) = complete_and_parse(
        &state,
        "generate_introduction",
        &prompt,
        &overrides,
        prompts::introduction_fallback,
    )
    .await?;

    let content = payload
        .get("introduction")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let intro = repo
        .insert_introduction(auth.user_id, &topic, &content, payload, &state.llm.model)
        .await?;

    tracing::info!(
        introduction_id = %intro.id,
        topic = %topic,
        parse_error,
        user_id = %auth.user_id,
        "Introduction stored"
    );

    Ok(Json(IntroductionResponse {
        id: intro.id,
        topic: intro.topic,
        content: intro.content,
        payload: intro.payload,
        model: intro.model,
        parse_error,
        processing_time_ms: start.elapsed().as_millis() as u64,
    }))
}

#[derive(Serialize)]
pub struct PlanResponse {
    pub id: Uuid,
    pub topic: String,
    pub payload: Value,
    pub model: String,
    pub parse_error: bool,
    pub processing_time_ms: u64,
}

/// POST /api/generate-paper-plan
pub async fn generate_paper_plan(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<TopicRequest>,
) -> Result<Json<PlanResponse>> {
    let start = Instant::now();

    let topic = request.topic.trim().to_string();
    if topic.is_empty() {
        return Err(AppError::MissingField {
            field: "topic".to_string(),
        });
    }

    let repo = Repository::new(state.db.clone());
    let records = collect_records(&repo, &auth, request.paper_ids, request.papers).await?;
    let overrides = llm_overrides(&state, &repo, &auth).await;

    let prompt = prompts::build_paper_plan_prompt(&topic, &records);
    let (payload, parse_error) = complete_and_parse(
        &state,
        "generate_paper_plan",
        &prompt,
        &overrides,
        prompts::paper_plan_fallback,
    )
    .await?;

    let plan = repo
        .insert_plan(auth.user_id, &topic, payload, &state.llm.model)
        .await?;

    tracing::info!(
        plan_id = %plan.id,
        topic = %topic,
        parse_error,
        user_id = %auth.user_id,
        "Paper plan stored"
    );

    Ok(Json(PlanResponse {
        id: plan.id,
        topic: plan.topic,
        payload: plan.payload,
        model: plan.model,
        parse_error,
        processing_time_ms: start.elapsed().as_millis() as u64,
    }))
}

/// GET /api/analyses
pub async fn list_analyses(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(params): Query<ListAnalysesParams>,
) -> Result<Json<Vec<Analysis>>> {
    let repo = Repository::new(state.db.clone());
    let analyses = repo
        .list_analyses(auth.user_id, params.kind.as_deref())
        .await?;
    Ok(Json(analyses))
}

/// GET /api/introductions
pub async fn list_introductions(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<Vec<Introduction>>> {
    let repo = Repository::new(state.db.clone());
    Ok(Json(repo.list_introductions(auth.user_id).await?))
}

/// GET /api/paper-plans
pub async fn list_plans(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<Vec<PaperPlan>>> {
    let repo = Repository::new(state.db.clone());
    Ok(Json(repo.list_plans(auth.user_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inline(title: &str) -> InlinePaper {
        InlinePaper {
            title: title.to_string(),
            authors: vec![],
            abstract_text: None,
            journal: None,
            year: None,
        }
    }

    #[test]
    fn test_record_from_inline() {
        let record = record_from_inline(inline("Plasma jets"));
        assert_eq!(record.title, "Plasma jets");
        assert_eq!(record.source, PaperSource::GoogleScholar);
        assert!(record.doi.is_none());
    }

    #[test]
    fn test_batch_title() {
        let one = vec![record_from_inline(inline("Solo paper"))];
        assert_eq!(batch_title(&one), "Solo paper");

        let two = vec![
            record_from_inline(inline("A")),
            record_from_inline(inline("B")),
        ];
        assert_eq!(batch_title(&two), "Analysis of 2 papers");
    }

    #[test]
    fn test_batch_fingerprint_depends_on_kind() {
        let records = vec![record_from_inline(inline("Same title"))];
        let a = batch_fingerprint("paper_analysis", &records);
        let b = batch_fingerprint("research_analysis", &records);
        assert_ne!(a, b);
    }

    #[test]
    fn test_analyze_request_deserializes_with_defaults() {
        let request: AnalyzeRequest = serde_json::from_str(r#"{}"#).unwrap();
        assert!(request.paper_ids.is_empty());
        assert!(request.papers.is_empty());
        assert!(!request.per_paper);

        let request: AnalyzeRequest = serde_json::from_str(
            r#"{"papers": [{"title": "Inline paper"}], "per_paper": true}"#,
        )
        .unwrap();
        assert_eq!(request.papers.len(), 1);
        assert!(request.per_paper);
    }
}
