//! # 健康检查服务
//!
//! 批量探测节点并把延迟、失败原因和启用状态写回节点表

use super::checker::RegistryProber;
use super::types::{ProbeOutcome, RefreshSummary};
use crate::error::{ProxyError, Result};
use crate::logging::{LogComponent, LogStage, log_proxy_error};
use crate::upstream::{NodeStore, ProxyNode};
use crate::{linfo, lwarn};
use futures::StreamExt;
use std::sync::Arc;

/// 健康检查服务
pub struct HealthCheckService {
    prober: RegistryProber,
    store: Arc<dyn NodeStore>,
    max_concurrency: usize,
    reprobe_disabled: bool,
}

impl HealthCheckService {
    /// 创建新的健康检查服务
    pub fn new(
        prober: RegistryProber,
        store: Arc<dyn NodeStore>,
        max_concurrency: usize,
        reprobe_disabled: bool,
    ) -> Self {
        Self {
            prober,
            store,
            max_concurrency: max_concurrency.max(1),
            reprobe_disabled,
        }
    }

    /// 探测所有启用节点
    ///
    /// 节点集合在开始前取快照；失败节点被禁用后不再出现在后续批次中。
    pub async fn refresh_all(&self) -> Result<RefreshSummary> {
        let nodes = self.snapshot(|node| node.enabled).await?;
        Ok(self.probe_batch("refresh_all", nodes).await)
    }

    /// 周期任务入口：开启 `reprobe_disabled` 时连同禁用节点一起探测
    pub async fn refresh_scheduled(&self) -> Result<RefreshSummary> {
        if !self.reprobe_disabled {
            return self.refresh_all().await;
        }
        let nodes = self.snapshot(|_| true).await?;
        Ok(self.probe_batch("refresh_with_disabled", nodes).await)
    }

    /// 按需探测单个节点，节点不存在时返回 None
    pub async fn check_node(&self, id: i32) -> Result<Option<ProbeOutcome>> {
        let Some(node) = self.store.get(id).await? else {
            return Ok(None);
        };

        let outcome = self.prober.probe(&node).await;
        self.store.record_probe(node.id, &outcome).await?;
        linfo!(
            "system",
            LogStage::HealthCheck,
            LogComponent::HealthChecker,
            "check_node",
            "单节点探测完成",
            node_id = node.id,
            latency_ms = outcome.latency_ms,
            alive = outcome.is_alive()
        );
        Ok(Some(outcome))
    }

    async fn snapshot(&self, keep: impl Fn(&ProxyNode) -> bool) -> Result<Vec<ProxyNode>> {
        let nodes = self
            .store
            .list_all()
            .await
            .map_err(|e| ProxyError::health_check_with_source("读取待探测节点失败", e))?;
        Ok(nodes.into_iter().filter(|node| keep(node)).collect())
    }

    async fn probe_batch(&self, operation: &str, nodes: Vec<ProxyNode>) -> RefreshSummary {
        linfo!(
            "system",
            LogStage::HealthCheck,
            LogComponent::HealthChecker,
            operation,
            "开始批量探测",
            nodes = nodes.len(),
            concurrency = self.max_concurrency
        );

        let outcomes: Vec<ProbeOutcome> = futures::stream::iter(nodes)
            .map(|node| async move {
                let outcome = self.prober.probe(&node).await;
                self.persist(&node, &outcome).await;
                outcome
            })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        let mut summary = RefreshSummary::default();
        for outcome in &outcomes {
            summary.record(outcome);
        }

        linfo!(
            "system",
            LogStage::HealthCheck,
            LogComponent::HealthChecker,
            operation,
            "批量探测完成",
            probed = summary.probed,
            healthy = summary.healthy,
            failed = summary.failed
        );
        summary
    }

    /// 写回探测结果；写库失败只记日志，不中断批次
    async fn persist(&self, node: &ProxyNode, outcome: &ProbeOutcome) {
        if let Some(reason) = outcome.failure_reason() {
            lwarn!(
                "system",
                LogStage::HealthCheck,
                LogComponent::HealthChecker,
                "probe_failed",
                "节点探测失败，已禁用",
                node_id = node.id,
                url = %node.url,
                reason = %reason
            );
        }

        match self.store.record_probe(node.id, outcome).await {
            Ok(true) => {}
            Ok(false) => lwarn!(
                "system",
                LogStage::Db,
                LogComponent::HealthChecker,
                "node_vanished",
                "探测期间节点已被删除",
                node_id = node.id
            ),
            Err(err) => log_proxy_error(
                "system",
                LogStage::Db,
                LogComponent::HealthChecker,
                "record_probe_failed",
                "写入探测结果失败",
                &err,
                &[("node_id", node.id.to_string())],
            ),
        }
    }
}
