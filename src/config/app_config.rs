//! # 应用配置结构定义

use crate::ensure_config;
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Docker Hub 官方 registry，所有镜像都不可用时的兜底上游
pub const DEFAULT_FALLBACK_REGISTRY: &str = "https://registry-1.docker.io";
/// Docker Hub 官方 token 服务
pub const DEFAULT_AUTH_ENDPOINT: &str = "https://auth.docker.io/token";
/// 公开镜像状态源
pub const DEFAULT_FEED_URL: &str = "https://status.anye.xyz/status.json";

/// 应用主配置结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 代理监听配置
    #[serde(default)]
    pub server: ServerConfig,
    /// 数据库配置
    #[serde(default)]
    pub database: super::DatabaseConfig,
    /// 上游 registry 配置
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// 节点健康检查配置
    #[serde(default)]
    pub health: HealthConfig,
    /// 镜像源采集配置
    #[serde(default)]
    pub feed: FeedConfig,
    /// 首次启动时写入的种子节点
    #[serde(default)]
    pub seed: Vec<SeedNodeConfig>,
}

/// 代理监听配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// 客户端未携带 `X-Forwarded-Proto` 时改写 realm 使用的协议
    pub public_scheme: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            public_scheme: "http".to_string(),
        }
    }
}

impl ServerConfig {
    /// 监听地址 `host:port`
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 上游 registry 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub fallback_registry: String,
    pub auth_endpoint: String,
    /// 仅限制建立连接的时间，响应体传输不设总超时
    pub connect_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            fallback_registry: DEFAULT_FALLBACK_REGISTRY.to_string(),
            auth_endpoint: DEFAULT_AUTH_ENDPOINT.to_string(),
            connect_timeout_secs: 10,
        }
    }
}

/// 节点健康检查配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub interval_secs: u64,
    pub probe_timeout_secs: u64,
    pub max_concurrency: usize,
    /// 周期任务是否同时重新探测已禁用节点
    pub reprobe_disabled: bool,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3600,
            probe_timeout_secs: 5,
            max_concurrency: 8,
            reprobe_disabled: false,
        }
    }
}

/// 镜像源采集配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub enabled: bool,
    pub url: String,
    pub interval_secs: u64,
    pub timeout_secs: u64,
    /// 标签中含有任一标记的候选会被丢弃
    pub reject_markers: Vec<String>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: DEFAULT_FEED_URL.to_string(),
            interval_secs: 3600,
            timeout_secs: 10,
            reject_markers: vec!["付费".to_string(), "内网".to_string(), "需登陆".to_string()],
        }
    }
}

/// 种子节点
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedNodeConfig {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub route_prefix: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl AppConfig {
    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        ensure_config!(self.server.port != 0, "无效的服务器端口: 0");
        ensure_config!(
            matches!(self.server.public_scheme.as_str(), "http" | "https"),
            "public_scheme 只能是 http 或 https: {}",
            self.server.public_scheme
        );

        ensure_config!(!self.database.url.is_empty(), "数据库URL不能为空");
        ensure_config!(
            self.database.max_connections > 0,
            "数据库最大连接数必须大于0"
        );

        ensure_config!(
            is_http_url(&self.upstream.fallback_registry),
            "无效的兜底 registry 地址: {}",
            self.upstream.fallback_registry
        );
        ensure_config!(
            is_http_url(&self.upstream.auth_endpoint),
            "无效的认证服务地址: {}",
            self.upstream.auth_endpoint
        );
        ensure_config!(
            self.upstream.connect_timeout_secs > 0,
            "connect_timeout_secs 必须大于0"
        );

        ensure_config!(self.health.interval_secs > 0, "健康检查间隔必须大于0");
        ensure_config!(self.health.probe_timeout_secs > 0, "探测超时必须大于0");
        ensure_config!(self.health.max_concurrency > 0, "探测并发数必须大于0");

        if self.feed.enabled {
            ensure_config!(
                is_http_url(&self.feed.url),
                "无效的镜像源地址: {}",
                self.feed.url
            );
            ensure_config!(self.feed.interval_secs > 0, "采集间隔必须大于0");
        }

        for seed in &self.seed {
            ensure_config!(is_http_url(&seed.url), "无效的种子节点地址: {}", seed.url);
        }

        Ok(())
    }
}

fn is_http_url(value: &str) -> bool {
    url::Url::parse(value).is_ok_and(|u| matches!(u.scheme(), "http" | "https"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.health.interval_secs, 3600);
        assert_eq!(config.health.probe_timeout_secs, 5);
        assert_eq!(config.upstream.fallback_registry, DEFAULT_FALLBACK_REGISTRY);
        assert!(!config.feed.enabled);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [server]
            port = 9000

            [[seed]]
            name = "ghcr mirror"
            url = "https://mirror.example.com"
            route_prefix = "ghcr"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.feed.reject_markers.len(), 3);
        assert_eq!(config.seed[0].route_prefix.as_deref(), Some("ghcr"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_scheme_and_urls() {
        let mut config = AppConfig::default();
        config.server.public_scheme = "ftp".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.upstream.fallback_registry = "registry-1.docker.io".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.health.max_concurrency = 0;
        assert!(config.validate().is_err());
    }
}
