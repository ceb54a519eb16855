use common::{EvalErrorKind, EvalStage, ScoreUnit};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "evaluation")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub uuid: Uuid,

    #[sea_orm(indexed)]
    pub subm_uuid: Uuid,
    pub stage: EvalStage,
    pub score_unit: ScoreUnit,

    /// NULL unless the evaluation failed as a whole.
    pub error_kind: Option<EvalErrorKind>,
    #[sea_orm(column_type = "Text", nullable)]
    pub error_message: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub checker: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub interactor: Option<String>,
    pub cpu_lim_ms: i32,
    pub mem_lim_kib: i32,

    #[sea_orm(has_many)]
    pub subtasks: HasMany<super::evaluation_subtask::Entity>,
    #[sea_orm(has_many)]
    pub test_groups: HasMany<super::evaluation_test_group::Entity>,
    #[sea_orm(has_many)]
    pub tests: HasMany<super::evaluation_test::Entity>,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
