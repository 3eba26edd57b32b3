//! # 上游节点类型定义

use chrono::NaiveDateTime;
use serde::Serialize;

/// 探测失败或尚未测量时写入的延迟值（毫秒）
pub const LATENCY_SENTINEL: f64 = 9999.0;

/// 兜底节点的 id，数据库自增 id 从 1 开始，不会冲突
pub const FALLBACK_NODE_ID: i32 = 0;

/// 上游镜像节点
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProxyNode {
    pub id: i32,
    pub name: String,
    /// 规范化后的基础地址，无尾部斜杠
    pub url: String,
    pub registry_type: String,
    pub route_prefix: Option<String>,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub enabled: bool,
    pub latency: f64,
    pub failure_reason: Option<String>,
    pub last_check: Option<NaiveDateTime>,
}

impl ProxyNode {
    /// 指向官方 registry 的临时节点，不落库
    #[must_use]
    pub fn fallback(url: &str) -> Self {
        Self {
            id: FALLBACK_NODE_ID,
            name: "Docker Hub".to_string(),
            url: normalize_registry_url(url),
            registry_type: "dockerhub".to_string(),
            route_prefix: None,
            username: None,
            password: None,
            enabled: true,
            latency: LATENCY_SENTINEL,
            failure_reason: None,
            last_check: None,
        }
    }

    #[must_use]
    pub const fn is_fallback(&self) -> bool {
        self.id == FALLBACK_NODE_ID
    }

    /// 节点是否可以参与选路
    #[must_use]
    pub fn is_selectable(&self) -> bool {
        self.enabled && self.latency < LATENCY_SENTINEL
    }

    /// 去掉两端斜杠后的路由前缀，空串视为无前缀
    #[must_use]
    pub fn normalized_prefix(&self) -> Option<&str> {
        self.route_prefix
            .as_deref()
            .map(|prefix| prefix.trim_matches('/'))
            .filter(|prefix| !prefix.is_empty())
    }

    /// 同时配置了用户名和密码时才返回凭据
    #[must_use]
    pub fn basic_auth(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => Some((user, pass)),
            _ => None,
        }
    }
}

impl From<entity::proxy_nodes::Model> for ProxyNode {
    fn from(model: entity::proxy_nodes::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            url: model.url,
            registry_type: model.registry_type,
            route_prefix: model.route_prefix,
            username: model.username,
            password: model.password,
            enabled: model.enabled,
            latency: model.latency,
            failure_reason: model.failure_reason,
            last_check: model.last_check,
        }
    }
}

/// 新建节点参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProxyNode {
    pub name: String,
    pub url: String,
    pub registry_type: String,
    pub route_prefix: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl NewProxyNode {
    /// Docker Hub 镜像节点
    pub fn dockerhub(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            registry_type: "dockerhub".to_string(),
            route_prefix: None,
            username: None,
            password: None,
        }
    }

    #[must_use]
    pub fn with_route_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.route_prefix = Some(prefix.into());
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }
}

/// 去除首尾空白和尾部斜杠
#[must_use]
pub fn normalize_registry_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_registry_url() {
        assert_eq!(normalize_registry_url("https://m.example.com/"), "https://m.example.com");
        assert_eq!(normalize_registry_url(" https://m.example.com// "), "https://m.example.com");
        assert_eq!(normalize_registry_url("https://m.example.com"), "https://m.example.com");
    }

    #[test]
    fn test_prefix_normalization() {
        let mut node = ProxyNode::fallback("https://registry-1.docker.io/");
        assert_eq!(node.url, "https://registry-1.docker.io");
        assert!(node.is_fallback());

        node.route_prefix = Some("/ghcr/".to_string());
        assert_eq!(node.normalized_prefix(), Some("ghcr"));

        node.route_prefix = Some("//".to_string());
        assert_eq!(node.normalized_prefix(), None);
    }

    #[test]
    fn test_basic_auth_requires_both_parts() {
        let mut node = ProxyNode::fallback("https://registry-1.docker.io");
        node.username = Some("alice".to_string());
        assert_eq!(node.basic_auth(), None);

        node.password = Some("secret".to_string());
        assert_eq!(node.basic_auth(), Some(("alice", "secret")));
    }

    #[test]
    fn test_fallback_is_not_selectable() {
        // 兜底节点只在没有候选时直接返回，本身不参与排序
        assert!(!ProxyNode::fallback("https://registry-1.docker.io").is_selectable());
    }
}
