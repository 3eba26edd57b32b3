//! # 日志配置模块
//!
//! 统一的结构化日志：初始化 tracing 订阅者，并提供带阶段/组件字段的日志宏。

use crate::error::ProxyError;
use std::env;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// 请求/任务所处的处理阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStage {
    Startup,
    Shutdown,
    BackgroundTask,
    HealthCheck,
    Scheduling,
    Db,
    Ingestion,
    RequestStart,
    UpstreamRequest,
    ResponseProcessing,
    ResponseFailure,
    Statistics,
    Internal,
}

/// 产生日志的组件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogComponent {
    Main,
    ServerSetup,
    Config,
    Database,
    HealthChecker,
    Scheduler,
    Selector,
    Proxy,
    TokenProxy,
    AuthChallenge,
    Statistics,
    Ingestion,
}

#[doc(hidden)]
#[macro_export]
macro_rules! __log_event {
    ($level:expr, $request_id:expr, $stage:expr, $component:expr, $operation:expr, $message:expr $(,)?) => {
        ::tracing::event!(
            $level,
            request_id = %$request_id,
            stage = ?$stage,
            component = ?$component,
            operation = %$operation,
            "{}",
            $message
        )
    };
    ($level:expr, $request_id:expr, $stage:expr, $component:expr, $operation:expr, $message:expr, $($field:tt)+) => {
        ::tracing::event!(
            $level,
            request_id = %$request_id,
            stage = ?$stage,
            component = ?$component,
            operation = %$operation,
            $($field)+,
            "{}",
            $message
        )
    };
}

/// INFO 级结构化日志：`linfo!(request_id, stage, component, operation, message, fields...)`
#[macro_export]
macro_rules! linfo {
    ($($args:tt)+) => {
        $crate::__log_event!(::tracing::Level::INFO, $($args)+)
    };
}

/// WARN 级结构化日志
#[macro_export]
macro_rules! lwarn {
    ($($args:tt)+) => {
        $crate::__log_event!(::tracing::Level::WARN, $($args)+)
    };
}

/// ERROR 级结构化日志
#[macro_export]
macro_rules! lerror {
    ($($args:tt)+) => {
        $crate::__log_event!(::tracing::Level::ERROR, $($args)+)
    };
}

/// DEBUG 级结构化日志
#[macro_export]
macro_rules! ldebug {
    ($($args:tt)+) => {
        $crate::__log_event!(::tracing::Level::DEBUG, $($args)+)
    };
}

/// 记录一个带完整错误链的错误日志
pub fn log_proxy_error(
    request_id: &str,
    stage: LogStage,
    component: LogComponent,
    operation: &str,
    message: &str,
    err: &ProxyError,
    fields: &[(&str, String)],
) {
    let mut chain = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        chain.push_str(" <- ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }

    let extra = fields
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(" ");

    crate::lerror!(
        request_id,
        stage,
        component,
        operation,
        message,
        error = %chain,
        extra = %extra
    );
}

/// 初始化优化的日志系统
pub fn init_optimized_logging(log_level: Option<&String>) {
    let level = log_level.map_or("info", std::string::String::as_str);

    // 默认配置：完全禁止数据库查询的详细日志
    let default_filter = format!(
        "{level},registry_proxy=debug,sqlx::query=off,sea_orm::query=warn,sqlx=warn,hyper_util=info"
    );

    let log_filter = env::var("RUST_LOG").unwrap_or(default_filter);

    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_new(&log_filter).unwrap_or_else(|_| EnvFilter::new(level)))
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .try_init();

    if env::var("RUST_LOG").is_ok_and(|v| {
        v.contains("sqlx::query=info") || v.contains("sqlx::query=debug")
    }) {
        tracing::info!("🔍 SQLx database query logging enabled");
    } else {
        tracing::info!("📋 SQLx database query logging disabled for production performance");
    }
}
