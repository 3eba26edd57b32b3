//! # 服务启动与关闭
//!
//! 数据库 → 服务层 → 后台任务 → 代理服务器，收到关闭信号后逆序收尾

use crate::{
    app::{AppResources, AppServices, AppTasks, TaskScheduler},
    config::AppConfig,
    error::{ProxyError, Result},
    linfo,
    logging::{LogComponent, LogStage, log_proxy_error},
    proxy::ProxyServer,
    statistics::{DEFAULT_HISTORY_DAYS, TrafficStore},
};
use crate::{lerror, lwarn};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// 等待在途请求结束的最长时间
const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// 处理 Ctrl+C 信号
async fn handle_ctrl_c_signal() -> String {
    match tokio::signal::ctrl_c().await {
        Ok(()) => "Ctrl+C signal".to_string(),
        Err(e) => {
            lerror!(
                "system",
                LogStage::Shutdown,
                LogComponent::ServerSetup,
                "ctrl_c_error",
                "监听 Ctrl+C 失败",
                error = %e
            );
            "Ctrl+C handler error".to_string()
        }
    }
}

/// 处理服务器任务退出结果
fn handle_task_result(result: std::result::Result<Result<()>, tokio::task::JoinError>) -> String {
    match result {
        Ok(Ok(())) => "proxy server exit".to_string(),
        Ok(Err(e)) => {
            log_proxy_error(
                "system",
                LogStage::Shutdown,
                LogComponent::ServerSetup,
                "proxy_server_error",
                "代理服务异常退出",
                &e,
                &[],
            );
            "proxy server error".to_string()
        }
        Err(e) => {
            lerror!(
                "system",
                LogStage::Shutdown,
                LogComponent::ServerSetup,
                "proxy_server_panic",
                "代理服务任务崩溃",
                error = %e
            );
            "proxy server panic".to_string()
        }
    }
}

/// 初始化数据库：连接、迁移、写入种子节点
async fn setup_database(config: &AppConfig) -> Result<Arc<DatabaseConnection>> {
    let db = crate::database::init_database(&config.database)
        .await
        .inspect_err(|err| {
            log_proxy_error(
                "system",
                LogStage::Startup,
                LogComponent::Database,
                "init_db_fail",
                "❌ 数据库连接失败",
                err,
                &[],
            );
        })?;

    crate::database::run_migrations(&db)
        .await
        .map_err(|e| ProxyError::database_with_source("数据库迁移失败", e))?;

    let seeded = crate::database::seed_default_nodes(&db, &config.seed).await?;
    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::Database,
        "database_ready",
        "✅ 数据库就绪",
        seeded_nodes = seeded
    );

    Ok(Arc::new(db))
}

/// 启动时输出近期流量概况
async fn log_traffic_summary(store: &dyn TrafficStore) {
    match store.list_recent(DEFAULT_HISTORY_DAYS).await {
        Ok(history) => {
            let download: i64 = history.iter().map(|day| day.download_bytes).sum();
            let upload: i64 = history.iter().map(|day| day.upload_bytes).sum();
            linfo!(
                "system",
                LogStage::Startup,
                LogComponent::Statistics,
                "traffic_summary",
                "近期流量概况",
                days = history.len(),
                download_bytes = download,
                upload_bytes = upload,
                latest_day = ?history.first().map(|day| day.date)
            );
        }
        Err(e) => log_proxy_error(
            "system",
            LogStage::Startup,
            LogComponent::Statistics,
            "traffic_summary_failed",
            "读取流量历史失败",
            &e,
            &[],
        ),
    }
}

/// 优雅关闭：停止接收新连接 → 停止后台任务 → 刷新流量记录
async fn shutdown_all(
    shutdown_tx: oneshot::Sender<()>,
    mut server_task: JoinHandle<Result<()>>,
    scheduler: &TaskScheduler,
    services: &AppServices,
    reason: &str,
) {
    linfo!(
        "system",
        LogStage::Shutdown,
        LogComponent::ServerSetup,
        "shutdown_initiated",
        "🛑 开始优雅关闭",
        reason = %reason
    );

    let _ = shutdown_tx.send(());
    if !server_task.is_finished()
        && tokio::time::timeout(GRACEFUL_SHUTDOWN_TIMEOUT, &mut server_task)
            .await
            .is_err()
    {
        lwarn!(
            "system",
            LogStage::Shutdown,
            LogComponent::ServerSetup,
            "graceful_shutdown_timeout",
            "在途请求未在限定时间内结束，强制关闭",
            timeout_secs = GRACEFUL_SHUTDOWN_TIMEOUT.as_secs()
        );
        server_task.abort();
    }

    if let Err(e) = scheduler.shutdown().await {
        log_proxy_error(
            "system",
            LogStage::Shutdown,
            LogComponent::ServerSetup,
            "scheduler_shutdown_warning",
            "⚠️ 后台任务关闭异常",
            &e,
            &[],
        );
    }

    if let Err(e) = services.accountant().shutdown().await {
        log_proxy_error(
            "system",
            LogStage::Shutdown,
            LogComponent::Statistics,
            "accountant_flush_failed",
            "流量记录刷新失败",
            &e,
            &[],
        );
    }
}

/// 运行代理服务，直到 Ctrl+C 或服务器退出
pub async fn run_server(config: AppConfig) -> Result<()> {
    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::ServerSetup,
        "start_server",
        "🚀 正在启动镜像代理服务..."
    );

    let config = Arc::new(config);
    let db = setup_database(&config).await?;

    let resources = AppResources::build(Arc::clone(&config), db);
    let services = AppServices::initialize(&resources)?;
    let tasks = AppTasks::initialize(&services).await?;
    let scheduler = tasks.scheduler();

    log_traffic_summary(services.traffic_store().as_ref()).await;

    let server = ProxyServer::bind(
        &config.server.bind_address(),
        services.proxy_state(&config.server.public_scheme),
    )
    .await?;

    scheduler.start_all().await?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let mut server_task = tokio::spawn(server.serve_with_shutdown(async move {
        let _ = shutdown_rx.await;
    }));

    let reason = tokio::select! {
        reason = handle_ctrl_c_signal() => reason,
        result = &mut server_task => handle_task_result(result),
    };

    shutdown_all(shutdown_tx, server_task, &scheduler, &services, &reason).await;

    linfo!(
        "system",
        LogStage::Shutdown,
        LogComponent::ServerSetup,
        "server_stopped",
        "👋 服务已停止"
    );
    Ok(())
}
