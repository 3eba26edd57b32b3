//! # Registry Proxy 主程序
//!
//! Docker Hub 镜像代理：自动选择最快的可用镜像转发拉取请求

use clap::Parser;
use registry_proxy::{
    Result,
    config::ConfigManager,
    lerror, linfo,
    logging::{self, LogComponent, LogStage, log_proxy_error},
    server_setup,
};
use std::path::PathBuf;

/// 命令行参数
#[derive(Debug, Parser)]
#[command(name = "registry-proxy", version, about)]
struct Cli {
    /// 配置文件路径，缺省时按 REGISTRY_PROXY_CONFIG_PATH 或 config/config.{RUST_ENV}.toml 查找
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 日志级别（RUST_LOG 优先）
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_optimized_logging(cli.log_level.as_ref());

    let manager = match cli.config.as_deref() {
        Some(path) => ConfigManager::from_file(path),
        None => ConfigManager::new(),
    }
    .inspect_err(|e| {
        log_proxy_error(
            "system",
            LogStage::Startup,
            LogComponent::Config,
            "config_load_failed",
            "配置加载失败",
            e,
            &[],
        );
    })?;

    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::Main,
        "service_starting",
        "服务启动",
        config_file = %manager.source().display(),
        overrides = manager.override_count()
    );

    if let Err(e) = server_setup::run_server(manager.into_config()).await {
        lerror!(
            "system",
            LogStage::Startup,
            LogComponent::Main,
            "service_start_failed",
            "服务启动失败",
            error = %e
        );
        std::process::exit(1);
    }

    linfo!(
        "system",
        LogStage::Shutdown,
        LogComponent::Main,
        "service_shutdown",
        "服务正常关闭"
    );
    Ok(())
}
