//! # 服务注册表
//!
//! 基于资源层构建所有业务服务，依赖关系在这里一次性连好。

use crate::app::resources::AppResources;
use crate::error::Result;
use crate::health::{HealthCheckScheduler, HealthCheckService, RegistryProber};
use crate::ingest::{IngestionScheduler, IngestionService};
use crate::proxy::{ProxyEngine, ProxyState};
use crate::statistics::{DbTrafficStore, TrafficAccountant, TrafficStore};
use crate::upstream::{DbNodeStore, NodeStore, UpstreamSelector};
use std::sync::Arc;
use std::time::Duration;

/// 应用服务集合
pub struct AppServices {
    node_store: Arc<dyn NodeStore>,
    traffic_store: Arc<dyn TrafficStore>,
    selector: Arc<UpstreamSelector>,
    accountant: Arc<TrafficAccountant>,
    health_service: Arc<HealthCheckService>,
    health_scheduler: Arc<HealthCheckScheduler>,
    ingestion_scheduler: Option<Arc<IngestionScheduler>>,
    engine: Arc<ProxyEngine>,
}

impl AppServices {
    /// 构建服务层；流量记账的后台写入任务在此启动
    pub fn initialize(resources: &Arc<AppResources>) -> Result<Arc<Self>> {
        let config = resources.config();
        let db = resources.database();

        let node_store: Arc<dyn NodeStore> = Arc::new(DbNodeStore::new(Arc::clone(&db)));
        let traffic_store: Arc<dyn TrafficStore> = Arc::new(DbTrafficStore::new(db));

        let selector = Arc::new(UpstreamSelector::new(
            Arc::clone(&node_store),
            config.upstream.fallback_registry.clone(),
        ));

        let prober = RegistryProber::new(Duration::from_secs(config.health.probe_timeout_secs))?;
        let health_service = Arc::new(HealthCheckService::new(
            prober,
            Arc::clone(&node_store),
            config.health.max_concurrency,
            config.health.reprobe_disabled,
        ));
        let health_scheduler = Arc::new(HealthCheckScheduler::new(
            Arc::clone(&health_service),
            Duration::from_secs(config.health.interval_secs),
        ));

        let ingestion_scheduler = if config.feed.enabled {
            let service = Arc::new(IngestionService::new(
                &config.feed,
                Arc::clone(&node_store),
                Arc::clone(&health_service),
            )?);
            Some(Arc::new(IngestionScheduler::new(
                service,
                Duration::from_secs(config.feed.interval_secs),
            )))
        } else {
            None
        };

        let accountant = TrafficAccountant::start(Arc::clone(&traffic_store));
        let client = ProxyEngine::build_client(Duration::from_secs(
            config.upstream.connect_timeout_secs,
        ))?;
        let engine = Arc::new(ProxyEngine::new(
            Arc::clone(&selector),
            Arc::clone(&accountant),
            client,
            config.upstream.auth_endpoint.clone(),
        ));

        Ok(Arc::new(Self {
            node_store,
            traffic_store,
            selector,
            accountant,
            health_service,
            health_scheduler,
            ingestion_scheduler,
            engine,
        }))
    }

    #[must_use]
    pub fn node_store(&self) -> Arc<dyn NodeStore> {
        Arc::clone(&self.node_store)
    }

    #[must_use]
    pub fn traffic_store(&self) -> Arc<dyn TrafficStore> {
        Arc::clone(&self.traffic_store)
    }

    #[must_use]
    pub fn selector(&self) -> Arc<UpstreamSelector> {
        Arc::clone(&self.selector)
    }

    #[must_use]
    pub fn accountant(&self) -> Arc<TrafficAccountant> {
        Arc::clone(&self.accountant)
    }

    #[must_use]
    pub fn health_service(&self) -> Arc<HealthCheckService> {
        Arc::clone(&self.health_service)
    }

    #[must_use]
    pub fn health_scheduler(&self) -> Arc<HealthCheckScheduler> {
        Arc::clone(&self.health_scheduler)
    }

    /// 未启用镜像源时为 None
    #[must_use]
    pub fn ingestion_scheduler(&self) -> Option<Arc<IngestionScheduler>> {
        self.ingestion_scheduler.clone()
    }

    /// 代理路由使用的共享状态
    #[must_use]
    pub fn proxy_state(&self, public_scheme: &str) -> ProxyState {
        ProxyState::new(Arc::clone(&self.engine), public_scheme)
    }
}
