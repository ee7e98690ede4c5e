//! SeaORM entity models
//!
//! Every entity carries a `user_id`; the repository filters on it for all
//! reads and writes so rows stay scoped to their owner.

mod analysis;
mod introduction;
pub(crate) mod paper;
mod paper_plan;
mod search_history;
mod setting;

pub use paper::{
    Entity as PaperEntity,
    Model as Paper,
    ActiveModel as PaperActiveModel,
    Column as PaperColumn,
};

pub use analysis::{
    Entity as AnalysisEntity,
    Model as Analysis,
    ActiveModel as AnalysisActiveModel,
    Column as AnalysisColumn,
};

pub use introduction::{
    Entity as IntroductionEntity,
    Model as Introduction,
    ActiveModel as IntroductionActiveModel,
    Column as IntroductionColumn,
};

pub use paper_plan::{
    Entity as PaperPlanEntity,
    Model as PaperPlan,
    ActiveModel as PaperPlanActiveModel,
    Column as PaperPlanColumn,
};

pub use search_history::{
    Entity as SearchHistoryEntity,
    Model as SearchHistory,
    ActiveModel as SearchHistoryActiveModel,
    Column as SearchHistoryColumn,
};

pub use setting::{
    Entity as SettingEntity,
    Model as Setting,
    ActiveModel as SettingActiveModel,
    Column as SettingColumn,
};
