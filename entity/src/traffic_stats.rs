//! # 每日流量统计实体定义

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 每日流量统计实体（每个自然日一行）
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "traffic_stats")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub date: Date,
    pub download_bytes: i64,
    pub upload_bytes: i64,
    pub request_count: i64,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
