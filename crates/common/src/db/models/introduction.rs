//! Generated introduction entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "introductions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub user_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub topic: String,

    /// Introduction text as returned by the LLM
    #[sea_orm(column_type = "Text")]
    pub content: String,

    /// Structured payload (references, parse flags)
    #[sea_orm(column_type = "JsonBinary")]
    pub payload: Json,

    #[sea_orm(column_type = "Text")]
    pub model: String,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
