//! LLM analysis result entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "analyses")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub user_id: Uuid,

    /// paper_analysis or research_analysis
    #[sea_orm(column_type = "Text")]
    pub kind: String,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    /// SHA-256 fingerprint of the analysis input
    #[sea_orm(column_type = "Text")]
    pub fingerprint: String,

    /// Parsed LLM output, or the fallback structure on parse failure
    #[sea_orm(column_type = "JsonBinary")]
    pub payload: Json,

    #[sea_orm(column_type = "Text")]
    pub model: String,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
