//! Saved paper entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "papers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub user_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    /// Normalized title (lowercased, whitespace-collapsed) for deduplication
    #[sea_orm(column_type = "Text")]
    pub title_norm: String,

    /// Author names as a JSONB array of strings
    #[sea_orm(column_type = "JsonBinary")]
    pub authors: Json,

    #[sea_orm(column_type = "Text", nullable)]
    pub abstract_text: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub journal: Option<String>,

    pub year: Option<i32>,

    /// Origin: google_scholar, pubmed, or patent
    #[sea_orm(column_type = "Text")]
    pub source: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub url: Option<String>,

    pub citations: Option<i32>,

    /// DOI stored lowercased for case-insensitive deduplication
    #[sea_orm(column_type = "Text", nullable)]
    pub doi: Option<String>,

    /// JCR impact factor from journal enrichment
    #[sea_orm(column_type = "Double", nullable)]
    pub impact_factor: Option<f64>,

    #[sea_orm(column_type = "Double", nullable)]
    pub jcr_percentile: Option<f64>,

    /// Extensible metadata as JSONB (raw provider fields)
    #[sea_orm(column_type = "JsonBinary")]
    pub metadata: Json,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
