//! # 测试数据

use crate::upstream::ProxyNode;

/// 构造一个启用状态的节点
pub fn node(id: i32, url: &str, latency: f64, route_prefix: Option<&str>) -> ProxyNode {
    ProxyNode {
        id,
        name: format!("node-{id}"),
        url: url.to_string(),
        registry_type: "dockerhub".to_string(),
        route_prefix: route_prefix.map(str::to_string),
        username: None,
        password: None,
        enabled: true,
        latency,
        failure_reason: None,
        last_check: None,
    }
}

