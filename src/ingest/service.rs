//! # 镜像采集服务
//!
//! 拉取公开镜像源列表，筛选去重后写入节点表，随后触发一轮探测

use super::feed::{FeedCandidate, parse_entry};
use crate::config::FeedConfig;
use crate::error::{ProxyError, Result};
use crate::health::{HealthCheckService, RefreshSummary};
use crate::logging::{LogComponent, LogStage};
use crate::upstream::{NewProxyNode, NodeStore, normalize_registry_url};
use crate::{ldebug, linfo, lwarn};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// 一轮采集的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestionReport {
    /// 源中的记录数
    pub fetched: usize,
    /// 新增节点数
    pub added: usize,
    /// 被筛掉的记录数
    pub rejected: usize,
    /// 已存在或批内重复的记录数
    pub duplicates: usize,
    /// 新增后探测的结果
    pub refresh: Option<RefreshSummary>,
}

/// 镜像采集服务
pub struct IngestionService {
    client: reqwest::Client,
    feed_url: String,
    reject_markers: Vec<String>,
    store: Arc<dyn NodeStore>,
    health_service: Arc<HealthCheckService>,
}

impl IngestionService {
    pub fn new(
        config: &FeedConfig,
        store: Arc<dyn NodeStore>,
        health_service: Arc<HealthCheckService>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProxyError::ingestion_with_source("创建采集 HTTP 客户端失败", e))?;

        Ok(Self {
            client,
            feed_url: config.url.clone(),
            reject_markers: config.reject_markers.clone(),
            store,
            health_service,
        })
    }

    /// 执行一轮采集
    ///
    /// 拉取或解析失败时整轮放弃并返回错误；单条记录失败只跳过该条。
    pub async fn run_once(&self) -> Result<IngestionReport> {
        linfo!(
            "system",
            LogStage::Ingestion,
            LogComponent::Ingestion,
            "fetch_feed",
            "开始拉取镜像源列表",
            url = %self.feed_url
        );

        let entries = self.fetch().await?;
        let mut report = self.ingest(&entries).await?;

        if report.added > 0 {
            report.refresh = Some(self.health_service.refresh_all().await?);
        }

        linfo!(
            "system",
            LogStage::Ingestion,
            LogComponent::Ingestion,
            "ingest_completed",
            "镜像采集完成",
            fetched = report.fetched,
            added = report.added,
            rejected = report.rejected,
            duplicates = report.duplicates
        );
        Ok(report)
    }

    async fn fetch(&self) -> Result<Vec<Value>> {
        let response = self
            .client
            .get(&self.feed_url)
            .send()
            .await
            .map_err(|e| ProxyError::ingestion_with_source("拉取镜像源列表失败", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProxyError::ingestion(format!(
                "镜像源列表返回异常状态: {status}"
            )));
        }

        response
            .json::<Vec<Value>>()
            .await
            .map_err(|e| ProxyError::ingestion_with_source("镜像源列表不是 JSON 数组", e))
    }

    /// 筛选、去重并写入候选节点
    pub async fn ingest(&self, entries: &[Value]) -> Result<IngestionReport> {
        let mut known: HashSet<String> = self
            .store
            .list_all()
            .await?
            .into_iter()
            .map(|node| normalize_registry_url(&node.url))
            .collect();

        let mut report = IngestionReport {
            fetched: entries.len(),
            ..IngestionReport::default()
        };

        for entry in entries {
            let FeedCandidate { name, url } = match parse_entry(entry, &self.reject_markers) {
                Ok(candidate) => candidate,
                Err(reason) => {
                    report.rejected += 1;
                    ldebug!(
                        "system",
                        LogStage::Ingestion,
                        LogComponent::Ingestion,
                        "entry_rejected",
                        "跳过候选镜像",
                        reason = %reason
                    );
                    continue;
                }
            };

            if !known.insert(url.clone()) {
                report.duplicates += 1;
                continue;
            }

            match self.store.create(NewProxyNode::dockerhub(name, url.clone())).await {
                Ok(_) => report.added += 1,
                Err(e) => {
                    report.rejected += 1;
                    lwarn!(
                        "system",
                        LogStage::Ingestion,
                        LogComponent::Ingestion,
                        "create_failed",
                        "写入候选镜像失败",
                        url = %url,
                        error = %e
                    );
                }
            }
        }

        Ok(report)
    }
}
