//! # 采集调度器
//!
//! 第一次采集在启动后一个间隔才执行，启动时的探测由健康检查调度器负责。

use super::service::IngestionService;
use crate::error::{ProxyError, Result};
use crate::health::spawn_interval_loop;
use crate::linfo;
use crate::logging::{LogComponent, LogStage};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

pub struct IngestionScheduler {
    service: Arc<IngestionService>,
    interval: Duration,
    main_task: Mutex<Option<JoinHandle<()>>>,
}

impl IngestionScheduler {
    pub fn new(service: Arc<IngestionService>, interval: Duration) -> Self {
        Self {
            service,
            interval,
            main_task: Mutex::new(None),
        }
    }

    pub async fn start(&self) -> Result<()> {
        let mut guard = self.main_task.lock().await;
        if guard.is_some() {
            return Err(ProxyError::server_init("采集调度器已在运行"));
        }

        let service = Arc::clone(&self.service);
        *guard = Some(spawn_interval_loop(
            "mirror_ingestion",
            self.interval,
            false,
            move || {
                let service = Arc::clone(&service);
                async move { service.run_once().await.map(|_| ()) }
            },
        ));

        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::Ingestion,
            "ingestion_scheduler_started",
            "镜像采集调度器已启动",
            interval_secs = self.interval.as_secs()
        );
        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        if let Some(task) = self.main_task.lock().await.take() {
            task.abort();
            linfo!(
                "system",
                LogStage::Shutdown,
                LogComponent::Ingestion,
                "ingestion_scheduler_stopped",
                "镜像采集调度器已停止"
            );
        }
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.main_task.lock().await.is_some()
    }
}
