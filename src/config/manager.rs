//! # 配置管理器
//!
//! 统一的配置加载接口：TOML 文件 + 环境变量覆盖

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::AppConfig;
use crate::error::{ProxyError, Result};

/// 环境变量前缀，例如 `REGISTRY_PROXY_SERVER_PORT` 覆盖 `server.port`
pub const ENV_PREFIX: &str = "REGISTRY_PROXY_";
/// 指定配置文件路径的环境变量
pub const CONFIG_PATH_ENV: &str = "REGISTRY_PROXY_CONFIG_PATH";

/// 配置管理器
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: AppConfig,
    source: PathBuf,
    override_count: usize,
}

impl ConfigManager {
    /// 按 `REGISTRY_PROXY_CONFIG_PATH` 或 `config/config.{RUST_ENV}.toml` 加载
    pub fn new() -> Result<Self> {
        let config_file = env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| {
            let env = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
            format!("config/config.{env}.toml")
        });

        Self::from_file(&config_file)
    }

    /// 从指定文件创建配置管理器
    pub fn from_file(config_path: impl AsRef<Path>) -> Result<Self> {
        let overrides = Self::build_env_overrides(env::vars());
        Self::from_file_with_overrides(config_path, &overrides)
    }

    /// 从指定文件创建配置管理器，并应用给定的覆盖项（键为 `section.key`）
    pub fn from_file_with_overrides(
        config_path: impl AsRef<Path>,
        overrides: &HashMap<String, String>,
    ) -> Result<Self> {
        let config_path = config_path.as_ref();
        let mut config = Self::load_config_file(config_path)?;

        Self::apply_env_overrides(&mut config, overrides)?;
        config.validate()?;

        info!(
            config_file = %config_path.display(),
            overrides = overrides.len(),
            "配置管理器初始化完成"
        );

        Ok(Self {
            config,
            source: config_path.to_path_buf(),
            override_count: overrides.len(),
        })
    }

    /// 获取当前配置
    #[must_use]
    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 取出配置
    #[must_use]
    pub fn into_config(self) -> AppConfig {
        self.config
    }

    /// 配置文件路径
    #[must_use]
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// 已应用的环境变量覆盖数量
    #[must_use]
    pub const fn override_count(&self) -> usize {
        self.override_count
    }

    /// 加载配置文件
    fn load_config_file(path: &Path) -> Result<AppConfig> {
        if !path.exists() {
            return Err(ProxyError::config(format!(
                "配置文件不存在: {}",
                path.display()
            )));
        }

        let config_content = std::fs::read_to_string(path).map_err(|e| {
            ProxyError::config_with_source(format!("读取配置文件失败: {}", path.display()), e)
        })?;

        toml::from_str(&config_content).map_err(|e| {
            ProxyError::config_with_source(
                format!("TOML解析失败 - 配置文件: {}", path.display()),
                e,
            )
        })
    }

    /// 构建环境变量覆盖映射
    ///
    /// `REGISTRY_PROXY_HEALTH_INTERVAL_SECS` 变为 `health.interval_secs`：
    /// 第一个下划线分隔 section，其余部分保持为字段名。
    pub fn build_env_overrides(
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> HashMap<String, String> {
        let mut overrides = HashMap::new();

        for (key, value) in vars {
            if key == CONFIG_PATH_ENV {
                continue;
            }
            if let Some(config_key) = key.strip_prefix(ENV_PREFIX) {
                let lowered = config_key.to_lowercase();
                let config_path = match lowered.split_once('_') {
                    Some((section, field)) => format!("{section}.{field}"),
                    None => lowered,
                };
                overrides.insert(config_path, value);
            }
        }

        debug!("发现 {} 个环境变量覆盖", overrides.len());
        overrides
    }

    /// 应用环境变量覆盖
    fn apply_env_overrides(
        config: &mut AppConfig,
        overrides: &HashMap<String, String>,
    ) -> Result<()> {
        for (path, value) in overrides {
            debug!(
                "应用环境变量覆盖: {} = {}",
                path,
                if path.contains("password") || path == "database.url" {
                    "***"
                } else {
                    value.as_str()
                }
            );

            Self::apply_override_to_config(config, path, value)?;
        }
        Ok(())
    }

    /// 将环境变量覆盖应用到配置对象
    fn apply_override_to_config(config: &mut AppConfig, path: &str, value: &str) -> Result<()> {
        let parts: Vec<&str> = path.split('.').collect();

        match parts.as_slice() {
            ["server", "host"] => config.server.host = value.to_string(),
            ["server", "port"] => config.server.port = parse_value(path, value)?,
            ["server", "public_scheme"] => config.server.public_scheme = value.to_lowercase(),
            ["database", "url"] => config.database.url = value.to_string(),
            ["database", "max_connections"] => {
                config.database.max_connections = parse_value(path, value)?;
            }
            ["database", "connect_timeout"] => {
                config.database.connect_timeout = parse_value(path, value)?;
            }
            ["upstream", "fallback_registry"] => {
                config.upstream.fallback_registry = value.trim_end_matches('/').to_string();
            }
            ["upstream", "auth_endpoint"] => config.upstream.auth_endpoint = value.to_string(),
            ["upstream", "connect_timeout_secs"] => {
                config.upstream.connect_timeout_secs = parse_value(path, value)?;
            }
            ["health", "interval_secs"] => config.health.interval_secs = parse_value(path, value)?,
            ["health", "probe_timeout_secs"] => {
                config.health.probe_timeout_secs = parse_value(path, value)?;
            }
            ["health", "max_concurrency"] => {
                config.health.max_concurrency = parse_value(path, value)?;
            }
            ["health", "reprobe_disabled"] => {
                config.health.reprobe_disabled = parse_value(path, value)?;
            }
            ["feed", "enabled"] => config.feed.enabled = parse_value(path, value)?,
            ["feed", "url"] => config.feed.url = value.to_string(),
            ["feed", "interval_secs"] => config.feed.interval_secs = parse_value(path, value)?,
            ["feed", "timeout_secs"] => config.feed.timeout_secs = parse_value(path, value)?,
            ["feed", "reject_markers"] => {
                config.feed.reject_markers = value
                    .split(',')
                    .map(str::trim)
                    .filter(|marker| !marker.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            _ => {
                warn!("未知的配置路径，忽略环境变量覆盖: {}", path);
            }
        }

        Ok(())
    }
}

fn parse_value<T>(path: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value.trim().parse().map_err(|e| {
        ProxyError::config_with_source(format!("无效的配置值 {path}: {value}"), e)
    })
}
