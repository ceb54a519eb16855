use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "evaluation_test_group")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique_key = "evaluation_test_group_position")]
    pub eval_uuid: Uuid,
    /// 0-based position in the evaluation's group list.
    #[sea_orm(unique_key = "evaluation_test_group_position")]
    pub position: i32,

    pub points: i32,
    /// JSON array of 1-based subtask ids.
    #[sea_orm(column_type = "JsonBinary")]
    pub subtask_ids: serde_json::Value,
    /// JSON array of 1-based test ids.
    #[sea_orm(column_type = "JsonBinary")]
    pub test_ids: serde_json::Value,

    #[sea_orm(belongs_to, from = "eval_uuid", to = "uuid")]
    pub evaluation: HasOne<super::evaluation::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
