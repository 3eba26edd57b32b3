//! # 健康检查调度器

use super::service::HealthCheckService;
use crate::error::{ProxyError, Result};
use crate::logging::{LogComponent, LogStage, log_proxy_error};
use crate::{ldebug, linfo};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

/// 启动一个固定间隔循环；`run_immediately` 为真时第一次立即执行
///
/// 单次执行的错误只记录日志，不结束循环。上一次执行未结束时不会并发触发下一次。
pub fn spawn_interval_loop<F, Fut>(
    name: &'static str,
    period: Duration,
    run_immediately: bool,
    job: F,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        let start = if run_immediately {
            Instant::now()
        } else {
            Instant::now() + period
        };
        let mut ticker = interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            ldebug!(
                "system",
                LogStage::BackgroundTask,
                LogComponent::Scheduler,
                "interval_tick",
                "周期任务触发",
                job = name
            );
            if let Err(err) = job().await {
                log_proxy_error(
                    "system",
                    LogStage::BackgroundTask,
                    LogComponent::Scheduler,
                    "interval_job_failed",
                    "周期任务执行失败",
                    &err,
                    &[("job", name.to_string())],
                );
            }
        }
    })
}

/// 健康检查调度器：进程启动时立即探测一次，之后按间隔重复
pub struct HealthCheckScheduler {
    health_service: Arc<HealthCheckService>,
    check_interval: Duration,
    main_task: Mutex<Option<JoinHandle<()>>>,
}

impl HealthCheckScheduler {
    /// 创建新的调度器
    pub fn new(health_service: Arc<HealthCheckService>, check_interval: Duration) -> Self {
        Self {
            health_service,
            check_interval,
            main_task: Mutex::new(None),
        }
    }

    /// 启动调度器
    pub async fn start(&self) -> Result<()> {
        let mut guard = self.main_task.lock().await;
        if guard.is_some() {
            return Err(ProxyError::server_init("健康检查调度器已在运行"));
        }

        let service = Arc::clone(&self.health_service);
        *guard = Some(spawn_interval_loop(
            "node_probe",
            self.check_interval,
            true,
            move || {
                let service = Arc::clone(&service);
                async move { service.refresh_scheduled().await.map(|_| ()) }
            },
        ));

        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::Scheduler,
            "health_scheduler_started",
            "健康检查调度器已启动",
            interval_secs = self.check_interval.as_secs()
        );
        Ok(())
    }

    /// 停止调度器
    pub async fn stop(&self) -> Result<()> {
        if let Some(task) = self.main_task.lock().await.take() {
            task.abort();
            linfo!(
                "system",
                LogStage::Shutdown,
                LogComponent::Scheduler,
                "health_scheduler_stopped",
                "健康检查调度器已停止"
            );
        }
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.main_task.lock().await.is_some()
    }

    #[must_use]
    pub const fn check_interval(&self) -> Duration {
        self.check_interval
    }
}
