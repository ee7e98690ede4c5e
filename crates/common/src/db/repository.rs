//! Repository pattern for database operations
//!
//! Provides a clean interface for all data access operations. Every method
//! takes the owning `user_id` and filters on it, which is how row ownership
//! is enforced.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::Result;
use crate::normalize_text;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Select, Set, TransactionTrait,
};
use std::collections::HashSet;
use uuid::Uuid;

/// Incoming paper payload, before normalization and deduplication
#[derive(Debug, Clone)]
pub struct NewPaper {
    pub title: String,
    pub authors: Vec<String>,
    pub abstract_text: Option<String>,
    pub journal: Option<String>,
    pub year: Option<i32>,
    pub source: String,
    pub url: Option<String>,
    pub citations: Option<i32>,
    pub doi: Option<String>,
    pub impact_factor: Option<f64>,
    pub jcr_percentile: Option<f64>,
    pub metadata: serde_json::Value,
}

/// Outcome of a batch save
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveOutcome {
    pub saved: usize,
    pub skipped: usize,
}

/// Normalize a DOI for case-insensitive comparison
fn normalize_doi(doi: Option<&str>) -> Option<String> {
    doi.map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_lowercase)
}

/// Base query for a user's papers, optionally filtered by source
fn list_papers_query(user_id: Uuid, source: Option<&str>) -> Select<PaperEntity> {
    let mut query = PaperEntity::find().filter(PaperColumn::UserId.eq(user_id));
    if let Some(source) = source {
        query = query.filter(PaperColumn::Source.eq(source));
    }
    query
}

/// Apply newest-first ordering and a row-based window. `offset` counts rows,
/// not pages, so `offset=25&limit=10` returns rows 25-34.
fn page_query(query: Select<PaperEntity>, offset: u64, limit: u64) -> Select<PaperEntity> {
    query
        .order_by_desc(PaperColumn::CreatedAt)
        .offset(offset)
        .limit(limit)
}

/// In-memory index of a user's dedup keys (normalized titles and DOIs).
/// Seeded from existing rows, then extended as the batch inserts, so
/// duplicates within one batch collapse to the first occurrence.
#[derive(Debug, Default)]
struct DedupIndex {
    titles: HashSet<String>,
    dois: HashSet<String>,
}

impl DedupIndex {
    fn seen(&self, title_norm: &str, doi: Option<&str>) -> bool {
        let title_seen = !title_norm.is_empty() && self.titles.contains(title_norm);
        let doi_seen = doi.is_some_and(|d| self.dois.contains(d));
        title_seen || doi_seen
    }

    fn insert(&mut self, title_norm: String, doi: Option<String>) {
        if !title_norm.is_empty() {
            self.titles.insert(title_norm);
        }
        if let Some(d) = doi {
            self.dois.insert(d);
        }
    }
}

/// Repository for data access operations
// Clone is gated like DbPool's: sea-orm's `mock` feature removes Clone
// from the underlying DatabaseConnection.
#[cfg_attr(not(feature = "mock"), derive(Clone))]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // Paper Operations
    // ========================================================================

    /// Save a batch of papers, skipping any whose normalized title or DOI
    /// (case-insensitive) already exists for this user. Duplicates within the
    /// batch collapse to the first occurrence. The whole batch commits in one
    /// transaction, so a mid-batch failure leaves nothing behind.
    pub async fn save_papers(
        &self,
        user_id: Uuid,
        incoming: Vec<NewPaper>,
    ) -> Result<SaveOutcome> {
        let txn = self.write_conn().begin().await?;

        // Read the existing dedup keys wholesale. Saved collections are small
        // and this must see our own prior writes, so it runs on the primary
        // inside the batch transaction.
        let existing: Vec<(String, Option<String>)> = PaperEntity::find()
            .filter(PaperColumn::UserId.eq(user_id))
            .select_only()
            .column(PaperColumn::TitleNorm)
            .column(PaperColumn::Doi)
            .into_tuple()
            .all(&txn)
            .await?;

        let mut index = DedupIndex::default();
        for (title_norm, doi) in existing {
            index.insert(title_norm, normalize_doi(doi.as_deref()));
        }

        let mut outcome = SaveOutcome::default();
        let now = chrono::Utc::now();

        for paper in incoming {
            let title_norm = normalize_text(&paper.title);
            let doi = normalize_doi(paper.doi.as_deref());

            if index.seen(&title_norm, doi.as_deref()) {
                outcome.skipped += 1;
                continue;
            }

            let model = PaperActiveModel {
                id: Set(Uuid::new_v4()),
                user_id: Set(user_id),
                title: Set(paper.title),
                title_norm: Set(title_norm.clone()),
                authors: Set(serde_json::Value::from(paper.authors)),
                abstract_text: Set(paper.abstract_text),
                journal: Set(paper.journal),
                year: Set(paper.year),
                source: Set(paper.source),
                url: Set(paper.url),
                citations: Set(paper.citations),
                doi: Set(doi.clone()),
                impact_factor: Set(paper.impact_factor),
                jcr_percentile: Set(paper.jcr_percentile),
                metadata: Set(paper.metadata),
                created_at: Set(now.into()),
                updated_at: Set(now.into()),
            };

            model.insert(&txn).await?;

            index.insert(title_norm, doi);
            outcome.saved += 1;
        }

        txn.commit().await?;

        Ok(outcome)
    }

    /// Find one paper with ownership check
    pub async fn find_paper(&self, user_id: Uuid, id: Uuid) -> Result<Option<Paper>> {
        PaperEntity::find_by_id(id)
            .filter(PaperColumn::UserId.eq(user_id))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Load several papers by id, preserving only those owned by the user
    pub async fn find_papers_by_ids(&self, user_id: Uuid, ids: &[Uuid]) -> Result<Vec<Paper>> {
        PaperEntity::find()
            .filter(PaperColumn::UserId.eq(user_id))
            .filter(PaperColumn::Id.is_in(ids.iter().copied()))
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// List papers by row offset and limit, newest first, optionally by source
    pub async fn list_papers(
        &self,
        user_id: Uuid,
        offset: u64,
        limit: u64,
        source: Option<&str>,
    ) -> Result<(Vec<Paper>, u64)> {
        let base = list_papers_query(user_id, source);

        let total = base.clone().count(self.read_conn()).await?;
        let papers = page_query(base, offset, limit)
            .all(self.read_conn())
            .await?;

        Ok((papers, total))
    }

    /// Load the user's full collection (trend aggregation input)
    pub async fn all_papers(&self, user_id: Uuid) -> Result<Vec<Paper>> {
        PaperEntity::find()
            .filter(PaperColumn::UserId.eq(user_id))
            .order_by_desc(PaperColumn::CreatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Delete a paper owned by the user
    pub async fn delete_paper(&self, user_id: Uuid, id: Uuid) -> Result<bool> {
        let result = PaperEntity::delete_many()
            .filter(PaperColumn::Id.eq(id))
            .filter(PaperColumn::UserId.eq(user_id))
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected > 0)
    }

    // ========================================================================
    // Analysis Operations
    // ========================================================================

    /// Store an LLM analysis result
    pub async fn insert_analysis(
        &self,
        user_id: Uuid,
        kind: &str,
        title: &str,
        fingerprint: &str,
        payload: serde_json::Value,
        model: &str,
    ) -> Result<Analysis> {
        let analysis = AnalysisActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            kind: Set(kind.to_string()),
            title: Set(title.to_string()),
            fingerprint: Set(fingerprint.to_string()),
            payload: Set(payload),
            model: Set(model.to_string()),
            created_at: Set(chrono::Utc::now().into()),
        };

        analysis.insert(self.write_conn()).await.map_err(Into::into)
    }

    /// Find one analysis with ownership check
    pub async fn find_analysis(&self, user_id: Uuid, id: Uuid) -> Result<Option<Analysis>> {
        AnalysisEntity::find_by_id(id)
            .filter(AnalysisColumn::UserId.eq(user_id))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// List analyses, newest first, optionally by kind
    pub async fn list_analyses(&self, user_id: Uuid, kind: Option<&str>) -> Result<Vec<Analysis>> {
        let mut query = AnalysisEntity::find().filter(AnalysisColumn::UserId.eq(user_id));

        if let Some(kind) = kind {
            query = query.filter(AnalysisColumn::Kind.eq(kind));
        }

        query
            .order_by_desc(AnalysisColumn::CreatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Introduction Operations
    // ========================================================================

    pub async fn insert_introduction(
        &self,
        user_id: Uuid,
        topic: &str,
        content: &str,
        payload: serde_json::Value,
        model: &str,
    ) -> Result<Introduction> {
        let intro = IntroductionActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            topic: Set(topic.to_string()),
            content: Set(content.to_string()),
            payload: Set(payload),
            model: Set(model.to_string()),
            created_at: Set(chrono::Utc::now().into()),
        };

        intro.insert(self.write_conn()).await.map_err(Into::into)
    }

    pub async fn list_introductions(&self, user_id: Uuid) -> Result<Vec<Introduction>> {
        IntroductionEntity::find()
            .filter(IntroductionColumn::UserId.eq(user_id))
            .order_by_desc(IntroductionColumn::CreatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Paper Plan Operations
    // ========================================================================

    pub async fn insert_plan(
        &self,
        user_id: Uuid,
        topic: &str,
        payload: serde_json::Value,
        model: &str,
    ) -> Result<PaperPlan> {
        let plan = PaperPlanActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            topic: Set(topic.to_string()),
            payload: Set(payload),
            model: Set(model.to_string()),
            created_at: Set(chrono::Utc::now().into()),
        };

        plan.insert(self.write_conn()).await.map_err(Into::into)
    }

    pub async fn list_plans(&self, user_id: Uuid) -> Result<Vec<PaperPlan>> {
        PaperPlanEntity::find()
            .filter(PaperPlanColumn::UserId.eq(user_id))
            .order_by_desc(PaperPlanColumn::CreatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Search History Operations
    // ========================================================================

    /// Record a provider search
    pub async fn record_search(
        &self,
        user_id: Uuid,
        query: &str,
        source: &str,
        filters: serde_json::Value,
        result_count: usize,
    ) -> Result<SearchHistory> {
        let entry = SearchHistoryActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            query: Set(query.to_string()),
            source: Set(source.to_string()),
            filters: Set(filters),
            result_count: Set(result_count as i32),
            created_at: Set(chrono::Utc::now().into()),
        };

        entry.insert(self.write_conn()).await.map_err(Into::into)
    }

    /// List search history, newest first
    pub async fn list_search_history(
        &self,
        user_id: Uuid,
        limit: u64,
    ) -> Result<Vec<SearchHistory>> {
        SearchHistoryEntity::find()
            .filter(SearchHistoryColumn::UserId.eq(user_id))
            .order_by_desc(SearchHistoryColumn::CreatedAt)
            .limit(limit)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Settings Operations
    // ========================================================================

    /// Get a single setting value
    pub async fn get_setting(&self, user_id: Uuid, key: &str) -> Result<Option<Setting>> {
        SettingEntity::find()
            .filter(SettingColumn::UserId.eq(user_id))
            .filter(SettingColumn::Key.eq(key))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Create or update a setting
    pub async fn upsert_setting(
        &self,
        user_id: Uuid,
        key: &str,
        value: serde_json::Value,
    ) -> Result<Setting> {
        let now = chrono::Utc::now();

        // Read-before-write on the primary so the upsert sees its own writes
        let existing = SettingEntity::find()
            .filter(SettingColumn::UserId.eq(user_id))
            .filter(SettingColumn::Key.eq(key))
            .one(self.write_conn())
            .await?;

        match existing {
            Some(setting) => {
                let mut model: SettingActiveModel = setting.into();
                model.value = Set(value);
                model.updated_at = Set(now.into());
                model.update(self.write_conn()).await.map_err(Into::into)
            }
            None => {
                let model = SettingActiveModel {
                    id: Set(Uuid::new_v4()),
                    user_id: Set(user_id),
                    key: Set(key.to_string()),
                    value: Set(value),
                    updated_at: Set(now.into()),
                };
                model.insert(self.write_conn()).await.map_err(Into::into)
            }
        }
    }

    /// List all settings for a user
    pub async fn list_settings(&self, user_id: Uuid) -> Result<Vec<Setting>> {
        SettingEntity::find()
            .filter(SettingColumn::UserId.eq(user_id))
            .order_by_asc(SettingColumn::Key)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbPool;
    use sea_orm::{DatabaseBackend, MockDatabase, QueryTrait};

    #[test]
    fn test_normalize_doi() {
        assert_eq!(
            normalize_doi(Some(" 10.1021/ACSCATAL.1C01234 ")),
            Some("10.1021/acscatal.1c01234".to_string())
        );
        assert_eq!(normalize_doi(Some("")), None);
        assert_eq!(normalize_doi(Some("   ")), None);
        assert_eq!(normalize_doi(None), None);
    }

    #[test]
    fn test_dedup_index_matches_on_title_or_doi() {
        let mut index = DedupIndex::default();
        index.insert(
            normalize_text("Plasma Catalysis for CO2 Conversion"),
            Some("10.1021/acscatal.1c01234".to_string()),
        );

        // same title, different DOI
        assert!(index.seen(
            &normalize_text("  plasma   catalysis for CO2 conversion "),
            Some("10.1000/other"),
        ));
        // same DOI, different title
        assert!(index.seen(&normalize_text("Another title"), Some("10.1021/acscatal.1c01234")));
        // neither matches
        assert!(!index.seen(&normalize_text("Another title"), Some("10.1000/other")));
        assert!(!index.seen(&normalize_text("Another title"), None));
    }

    #[test]
    fn test_dedup_index_ignores_empty_titles() {
        let mut index = DedupIndex::default();
        index.insert(String::new(), Some("10.1/a".to_string()));
        index.insert(String::new(), Some("10.1/b".to_string()));

        // two title-less rows never collide with each other on title
        assert!(!index.seen("", None));
        assert!(index.seen("", Some("10.1/a")));
    }

    #[test]
    fn test_list_papers_window_is_a_row_offset() {
        let user_id = Uuid::new_v4();

        // offset counts rows, so it must pass through to SQL unchanged
        // rather than snapping to a page boundary
        let sql = page_query(list_papers_query(user_id, None), 25, 10)
            .build(DatabaseBackend::Postgres)
            .to_string();
        assert!(sql.contains("LIMIT 10"), "{sql}");
        assert!(sql.contains("OFFSET 25"), "{sql}");

        let sql = page_query(list_papers_query(user_id, Some("pubmed")), 5, 10)
            .build(DatabaseBackend::Postgres)
            .to_string();
        assert!(sql.contains("OFFSET 5"), "{sql}");
        assert!(sql.contains("source"), "{sql}");
    }

    fn new_paper(title: &str, doi: Option<&str>) -> NewPaper {
        NewPaper {
            title: title.to_string(),
            authors: vec!["A Bogaerts".to_string()],
            abstract_text: None,
            journal: None,
            year: Some(2023),
            source: "pubmed".to_string(),
            url: None,
            citations: None,
            doi: doi.map(String::from),
            impact_factor: None,
            jcr_percentile: None,
            metadata: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn test_save_papers_commits_batch_in_one_transaction() {
        let user_id = Uuid::new_v4();
        let now = chrono::Utc::now().fixed_offset();

        let inserted = Paper {
            id: Uuid::new_v4(),
            user_id,
            title: "Plasma catalysis for CO2 conversion".to_string(),
            title_norm: "plasma catalysis for co2 conversion".to_string(),
            authors: serde_json::json!(["A Bogaerts"]),
            abstract_text: None,
            journal: None,
            year: Some(2023),
            source: "pubmed".to_string(),
            url: None,
            citations: None,
            doi: Some("10.1021/acscatal.3c01234".to_string()),
            impact_factor: None,
            jcr_percentile: None,
            metadata: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        };

        // One result for the dedup-key scan, one for the single insert; the
        // intra-batch duplicate is skipped without touching the database.
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<Paper>::new(), vec![inserted]])
            .into_connection();

        let repo = Repository::new(DbPool {
            primary: db,
            replica: None,
        });

        let outcome = repo
            .save_papers(
                user_id,
                vec![
                    new_paper(
                        "Plasma catalysis for CO2 conversion",
                        Some("10.1021/acscatal.3c01234"),
                    ),
                    new_paper(
                        "Plasma Catalysis for CO2 Conversion",
                        Some("10.1021/ACSCATAL.3C01234"),
                    ),
                ],
            )
            .await
            .unwrap();

        assert_eq!(outcome, SaveOutcome { saved: 1, skipped: 1 });
    }
}
