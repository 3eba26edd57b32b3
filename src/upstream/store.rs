//! # 节点存储
//!
//! 上游节点表的读写接口，选路、健康检查和采集都只通过该 trait 访问数据库

use super::types::{LATENCY_SENTINEL, NewProxyNode, ProxyNode, normalize_registry_url};
use crate::error::{ProxyError, Result};
use crate::health::ProbeOutcome;
use async_trait::async_trait;
use entity::proxy_nodes;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;

/// 节点存储接口
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// 启用且延迟有效的节点，按延迟升序
    async fn list_enabled_by_latency(&self) -> Result<Vec<ProxyNode>>;

    /// 所有节点，按 id 升序
    async fn list_all(&self) -> Result<Vec<ProxyNode>>;

    async fn get(&self, id: i32) -> Result<Option<ProxyNode>>;

    /// 新建节点：地址规范化，初始为启用且未测量
    async fn create(&self, node: NewProxyNode) -> Result<ProxyNode>;

    /// 覆盖写入节点的全部可编辑字段
    async fn update(&self, node: &ProxyNode) -> Result<ProxyNode>;

    /// 删除节点，返回是否存在
    async fn delete(&self, id: i32) -> Result<bool>;

    /// 只更新健康相关列，返回节点是否仍存在
    async fn record_probe(&self, id: i32, outcome: &ProbeOutcome) -> Result<bool>;
}

/// 基于 sea-orm 的节点存储
#[derive(Clone)]
pub struct DbNodeStore {
    db: Arc<DatabaseConnection>,
}

impl DbNodeStore {
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl NodeStore for DbNodeStore {
    async fn list_enabled_by_latency(&self) -> Result<Vec<ProxyNode>> {
        let nodes = proxy_nodes::Entity::find()
            .filter(proxy_nodes::Column::Enabled.eq(true))
            .filter(proxy_nodes::Column::Latency.lt(LATENCY_SENTINEL))
            .order_by_asc(proxy_nodes::Column::Latency)
            .order_by_asc(proxy_nodes::Column::Id)
            .all(self.db.as_ref())
            .await?;

        Ok(nodes.into_iter().map(ProxyNode::from).collect())
    }

    async fn list_all(&self) -> Result<Vec<ProxyNode>> {
        let nodes = proxy_nodes::Entity::find()
            .order_by_asc(proxy_nodes::Column::Id)
            .all(self.db.as_ref())
            .await?;

        Ok(nodes.into_iter().map(ProxyNode::from).collect())
    }

    async fn get(&self, id: i32) -> Result<Option<ProxyNode>> {
        let node = proxy_nodes::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?;
        Ok(node.map(ProxyNode::from))
    }

    async fn create(&self, node: NewProxyNode) -> Result<ProxyNode> {
        let url = normalize_registry_url(&node.url);
        if url.is_empty() {
            return Err(ProxyError::database("节点地址不能为空"));
        }

        let now = chrono::Utc::now().naive_utc();
        let model = proxy_nodes::ActiveModel {
            name: Set(node.name),
            url: Set(url.clone()),
            registry_type: Set(node.registry_type),
            route_prefix: Set(node.route_prefix),
            username: Set(node.username),
            password: Set(node.password),
            enabled: Set(true),
            latency: Set(LATENCY_SENTINEL),
            failure_reason: Set(None),
            last_check: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await
        .map_err(|e| ProxyError::database_with_source(format!("创建节点失败: {url}"), e))?;

        Ok(model.into())
    }

    async fn update(&self, node: &ProxyNode) -> Result<ProxyNode> {
        let existing = proxy_nodes::Entity::find_by_id(node.id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ProxyError::database(format!("节点不存在: {}", node.id)))?;

        let mut active: proxy_nodes::ActiveModel = existing.into();
        active.name = Set(node.name.clone());
        active.url = Set(normalize_registry_url(&node.url));
        active.registry_type = Set(node.registry_type.clone());
        active.route_prefix = Set(node.route_prefix.clone());
        active.username = Set(node.username.clone());
        active.password = Set(node.password.clone());
        active.enabled = Set(node.enabled);
        active.latency = Set(node.latency);
        active.failure_reason = Set(node.failure_reason.clone());
        active.last_check = Set(node.last_check);
        active.updated_at = Set(chrono::Utc::now().naive_utc());

        let model = active.update(self.db.as_ref()).await?;
        Ok(model.into())
    }

    async fn delete(&self, id: i32) -> Result<bool> {
        let result = proxy_nodes::Entity::delete_by_id(id)
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected > 0)
    }

    async fn record_probe(&self, id: i32, outcome: &ProbeOutcome) -> Result<bool> {
        let now = chrono::Utc::now().naive_utc();
        let result = proxy_nodes::Entity::update_many()
            .col_expr(proxy_nodes::Column::Latency, Expr::value(outcome.latency_ms))
            .col_expr(
                proxy_nodes::Column::FailureReason,
                Expr::value(outcome.failure_reason()),
            )
            .col_expr(proxy_nodes::Column::LastCheck, Expr::value(Some(now)))
            .col_expr(proxy_nodes::Column::Enabled, Expr::value(outcome.is_alive()))
            .col_expr(proxy_nodes::Column::UpdatedAt, Expr::value(now))
            .filter(proxy_nodes::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await?;

        Ok(result.rows_affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::ProbeFailure;
    use crate::testing::helpers::create_test_db;

    async fn store() -> DbNodeStore {
        DbNodeStore::new(Arc::new(create_test_db().await))
    }

    #[tokio::test]
    async fn test_create_normalizes_and_starts_unmeasured() {
        let store = store().await;
        let node = store
            .create(NewProxyNode::dockerhub("mirror", "https://mirror.example.com/"))
            .await
            .unwrap();

        assert_eq!(node.url, "https://mirror.example.com");
        assert!(node.enabled);
        assert!((node.latency - LATENCY_SENTINEL).abs() < f64::EPSILON);
        // 未测量的节点不参与选路
        assert!(store.list_enabled_by_latency().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_url_is_rejected() {
        let store = store().await;
        store
            .create(NewProxyNode::dockerhub("a", "https://dup.example.com"))
            .await
            .unwrap();
        let err = store
            .create(NewProxyNode::dockerhub("b", "https://dup.example.com/"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::Database { .. }));
    }

    #[tokio::test]
    async fn test_record_probe_updates_health_columns_only() {
        let store = store().await;
        let created = store
            .create(
                NewProxyNode::dockerhub("ghcr", "https://ghcr.example.com")
                    .with_route_prefix("ghcr"),
            )
            .await
            .unwrap();

        assert!(store.record_probe(created.id, &ProbeOutcome::alive(42.0)).await.unwrap());
        let node = store.get(created.id).await.unwrap().unwrap();
        assert!(node.enabled);
        assert!((node.latency - 42.0).abs() < f64::EPSILON);
        assert!(node.failure_reason.is_none());
        assert!(node.last_check.is_some());
        assert_eq!(node.route_prefix.as_deref(), Some("ghcr"));

        store
            .record_probe(created.id, &ProbeOutcome::failed(ProbeFailure::Timeout))
            .await
            .unwrap();
        let node = store.get(created.id).await.unwrap().unwrap();
        assert!(!node.enabled);
        assert!((node.latency - LATENCY_SENTINEL).abs() < f64::EPSILON);
        assert_eq!(node.failure_reason.as_deref(), Some("Connection Timeout"));
    }

    #[tokio::test]
    async fn test_list_enabled_by_latency_orders_ascending() {
        let store = store().await;
        let slow = store
            .create(NewProxyNode::dockerhub("slow", "https://slow.example.com"))
            .await
            .unwrap();
        let fast = store
            .create(NewProxyNode::dockerhub("fast", "https://fast.example.com"))
            .await
            .unwrap();
        let dead = store
            .create(NewProxyNode::dockerhub("dead", "https://dead.example.com"))
            .await
            .unwrap();

        store.record_probe(slow.id, &ProbeOutcome::alive(300.0)).await.unwrap();
        store.record_probe(fast.id, &ProbeOutcome::alive(20.0)).await.unwrap();
        store
            .record_probe(dead.id, &ProbeOutcome::failed(ProbeFailure::UnexpectedStatus(503)))
            .await
            .unwrap();

        let ids: Vec<i32> = store
            .list_enabled_by_latency()
            .await
            .unwrap()
            .iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec![fast.id, slow.id]);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let store = store().await;
        let mut node = store
            .create(NewProxyNode::dockerhub("old", "https://edit.example.com"))
            .await
            .unwrap();

        node.name = "renamed".to_string();
        node.route_prefix = Some("quay".to_string());
        let updated = store.update(&node).await.unwrap();
        assert_eq!(updated.name, "renamed");
        assert_eq!(store.list_all().await.unwrap().len(), 1);

        assert!(store.delete(node.id).await.unwrap());
        assert!(!store.delete(node.id).await.unwrap());
        assert!(store.get(node.id).await.unwrap().is_none());
        assert!(!store.record_probe(node.id, &ProbeOutcome::alive(1.0)).await.unwrap());
    }
}
