//! # 上游节点模块
//!
//! 节点模型、持久化接口与选路算法

pub mod selector;
pub mod store;
pub mod types;

pub use selector::{UpstreamSelection, UpstreamSelector, select_from};
pub use store::{DbNodeStore, NodeStore};
pub use types::{
    FALLBACK_NODE_ID, LATENCY_SENTINEL, NewProxyNode, ProxyNode, normalize_registry_url,
};
