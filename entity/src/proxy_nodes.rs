//! # 上游镜像节点实体定义
//!
//! 候选上游 registry 镜像表的 Sea-ORM 实体模型

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 上游镜像节点实体
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "proxy_nodes")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    /// 规范化后的基础地址（无尾部斜杠），全表唯一
    #[sea_orm(unique)]
    pub url: String,
    pub registry_type: String,
    pub route_prefix: Option<String>,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub enabled: bool,
    /// 最近一次探测耗时（毫秒），9999 表示失败或未测量
    pub latency: f64,
    pub failure_reason: Option<String>,
    pub last_check: Option<DateTime>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
