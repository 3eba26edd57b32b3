use crate::app::service_registry::AppServices;
use crate::app::task_scheduler::{ScheduledTask, TaskScheduler};
use crate::error::Result;
use std::sync::Arc;

/// 后台任务类型枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskType {
    /// 节点周期探测
    NodeProbe,
    /// 公开镜像源采集
    MirrorIngestion,
}

/// 后台任务集合
///
/// Task 依赖 Service，从 `AppServices` 获取；生命周期统一交给 `TaskScheduler`。
pub struct AppTasks {
    scheduler: Arc<TaskScheduler>,
}

impl AppTasks {
    /// 初始化调度器并注册所有后台任务
    pub async fn initialize(services: &Arc<AppServices>) -> Result<Arc<Self>> {
        let scheduler = Arc::new(TaskScheduler::new());

        let health = services.health_scheduler();
        let mut tasks = vec![
            ScheduledTask::builder(TaskType::NodeProbe)
                .on_start({
                    let task = Arc::clone(&health);
                    move || {
                        let task = Arc::clone(&task);
                        async move { task.start().await }
                    }
                })
                .on_stop(move || {
                    let task = Arc::clone(&health);
                    async move { task.stop().await }
                })
                .build()?,
        ];

        if let Some(ingestion) = services.ingestion_scheduler() {
            tasks.push(
                ScheduledTask::builder(TaskType::MirrorIngestion)
                    .on_start({
                        let task = Arc::clone(&ingestion);
                        move || {
                            let task = Arc::clone(&task);
                            async move { task.start().await }
                        }
                    })
                    .on_stop(move || {
                        let task = Arc::clone(&ingestion);
                        async move { task.stop().await }
                    })
                    .build()?,
            );
        }

        scheduler.register_many(tasks).await;
        Ok(Arc::new(Self { scheduler }))
    }

    #[must_use]
    pub fn scheduler(&self) -> Arc<TaskScheduler> {
        Arc::clone(&self.scheduler)
    }
}
