//! # 上游选择器
//!
//! 延迟排序 + 最长路由前缀匹配，没有可用节点时回落到官方 registry

use super::store::NodeStore;
use super::types::ProxyNode;
use crate::logging::{LogComponent, LogStage, log_proxy_error};
use std::sync::Arc;

/// 选路结果
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamSelection {
    pub node: ProxyNode,
    /// 去掉匹配前缀后的路径（无前导斜杠）
    pub adjusted_path: String,
}

/// 上游选择器
pub struct UpstreamSelector {
    store: Arc<dyn NodeStore>,
    fallback_url: String,
}

impl UpstreamSelector {
    pub fn new(store: Arc<dyn NodeStore>, fallback_url: impl Into<String>) -> Self {
        Self {
            store,
            fallback_url: fallback_url.into(),
        }
    }

    /// 为请求路径选择上游。读库失败时记录日志并使用兜底节点，不向上抛错
    pub async fn select_upstream(&self, request_id: &str, path: &str) -> UpstreamSelection {
        let ranked = match self.store.list_enabled_by_latency().await {
            Ok(nodes) => nodes,
            Err(err) => {
                log_proxy_error(
                    request_id,
                    LogStage::Scheduling,
                    LogComponent::Selector,
                    "load_nodes_failed",
                    "读取候选节点失败，使用兜底 registry",
                    &err,
                    &[("path", path.to_string())],
                );
                Vec::new()
            }
        };

        let selection = select_from(&ranked, path, &self.fallback_url);
        crate::ldebug!(
            request_id,
            LogStage::Scheduling,
            LogComponent::Selector,
            "upstream_selected",
            "已选择上游节点",
            node_id = selection.node.id,
            node_url = %selection.node.url,
            candidates = ranked.len(),
            adjusted_path = %selection.adjusted_path
        );
        selection
    }
}

/// 纯函数选路
///
/// 1. 只考虑 `enabled` 且延迟低于哨兵值的节点，按延迟稳定排序；
/// 2. 路径以 `<prefix>/` 开头的节点中取前缀最长者，等长时取更快者，并剥掉前缀；
/// 3. 否则取最快的无前缀节点；
/// 4. 否则返回兜底节点。
#[must_use]
pub fn select_from(nodes: &[ProxyNode], path: &str, fallback_url: &str) -> UpstreamSelection {
    let path = path.trim_start_matches('/');

    let mut ranked: Vec<&ProxyNode> = nodes.iter().filter(|n| n.is_selectable()).collect();
    ranked.sort_by(|a, b| a.latency.total_cmp(&b.latency));

    let mut best: Option<(&ProxyNode, usize)> = None;
    for node in &ranked {
        let Some(prefix) = node.normalized_prefix() else {
            continue;
        };
        let matches = path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'));
        if matches && best.is_none_or(|(_, len)| prefix.len() > len) {
            best = Some((node, prefix.len()));
        }
    }

    if let Some((node, prefix_len)) = best {
        return UpstreamSelection {
            node: node.clone(),
            adjusted_path: path[prefix_len + 1..].to_string(),
        };
    }

    if let Some(node) = ranked.iter().find(|n| n.normalized_prefix().is_none()) {
        return UpstreamSelection {
            node: (*node).clone(),
            adjusted_path: path.to_string(),
        };
    }

    UpstreamSelection {
        node: ProxyNode::fallback(fallback_url),
        adjusted_path: path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::node;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    const FALLBACK: &str = "https://registry-1.docker.io";

    #[test]
    fn test_empty_pool_returns_fallback_with_path() {
        let selection = select_from(&[], "library/nginx/manifests/latest", FALLBACK);
        assert!(selection.node.is_fallback());
        assert_eq!(selection.node.url, FALLBACK);
        assert_eq!(selection.adjusted_path, "library/nginx/manifests/latest");
    }

    #[test]
    fn test_generic_picks_fastest() {
        let nodes = vec![
            node(1, "https://slow.example.com", 300.0, None),
            node(2, "https://fast.example.com", 50.0, None),
        ];
        let selection = select_from(&nodes, "/library/alpine/tags/list", FALLBACK);
        assert_eq!(selection.node.id, 2);
        assert_eq!(selection.adjusted_path, "library/alpine/tags/list");
    }

    #[test]
    fn test_never_returns_disabled_or_sentinel() {
        let mut disabled = node(1, "https://disabled.example.com", 10.0, None);
        disabled.enabled = false;
        let sentinel = node(2, "https://sentinel.example.com", 9999.0, None);
        let over = node(3, "https://over.example.com", 12000.0, None);

        let selection = select_from(&[disabled, sentinel, over], "library/redis", FALLBACK);
        assert!(selection.node.is_fallback());
    }

    #[test]
    fn test_longest_prefix_wins() {
        let nodes = vec![
            node(1, "https://short.example.com", 10.0, Some("ghcr")),
            node(2, "https://long.example.com", 500.0, Some("ghcr/org")),
        ];
        let selection = select_from(&nodes, "ghcr/org/app/manifests/v1", FALLBACK);
        assert_eq!(selection.node.id, 2);
        assert_eq!(selection.adjusted_path, "app/manifests/v1");
    }

    #[test]
    fn test_equal_prefix_prefers_faster() {
        let nodes = vec![
            node(1, "https://a.example.com", 200.0, Some("ghcr")),
            node(2, "https://b.example.com", 80.0, Some("/ghcr/")),
        ];
        let selection = select_from(&nodes, "ghcr/x/blobs/sha256:abc", FALLBACK);
        assert_eq!(selection.node.id, 2);
        assert_eq!(selection.adjusted_path, "x/blobs/sha256:abc");
    }

    #[test]
    fn test_prefix_requires_following_slash() {
        let nodes = vec![
            node(1, "https://prefixed.example.com", 10.0, Some("ghcr")),
            node(2, "https://generic.example.com", 100.0, None),
        ];

        let selection = select_from(&nodes, "ghcrx/foo", FALLBACK);
        assert_eq!(selection.node.id, 2);
        assert_eq!(selection.adjusted_path, "ghcrx/foo");

        // 路径恰好等于前缀时同样不匹配
        let selection = select_from(&nodes, "ghcr", FALLBACK);
        assert_eq!(selection.node.id, 2);
    }

    #[test]
    fn test_prefixed_nodes_do_not_serve_generic_paths() {
        let nodes = vec![node(1, "https://prefixed.example.com", 10.0, Some("ghcr"))];
        let selection = select_from(&nodes, "library/nginx", FALLBACK);
        assert!(selection.node.is_fallback());
        assert_eq!(selection.adjusted_path, "library/nginx");
    }

    #[test]
    fn test_empty_prefix_counts_as_generic() {
        let nodes = vec![node(1, "https://blank.example.com", 10.0, Some("/"))];
        let selection = select_from(&nodes, "library/nginx", FALLBACK);
        assert_eq!(selection.node.id, 1);
    }

    #[rstest]
    #[case("mirror/library/nginx/manifests/latest", 2, "library/nginx/manifests/latest")]
    #[case("mirror/deep/org/app/blobs/sha256:1", 3, "org/app/blobs/sha256:1")]
    #[case("mirror/deep", 2, "deep")]
    #[case("mirrors/x", 1, "mirrors/x")]
    #[case("", 1, "")]
    fn test_prefix_stripping(
        #[case] path: &str,
        #[case] expected_id: i32,
        #[case] expected_path: &str,
    ) {
        let nodes = vec![
            node(1, "https://generic.example.com", 300.0, None),
            node(2, "https://mirror.example.com", 100.0, Some("mirror")),
            node(3, "https://deep.example.com", 200.0, Some("mirror/deep")),
        ];
        let selection = select_from(&nodes, path, FALLBACK);
        assert_eq!(selection.node.id, expected_id);
        assert_eq!(selection.adjusted_path, expected_path);
    }
}
