//! # Entity 模块
//!
//! 包含所有 Sea-ORM 实体定义

pub mod proxy_nodes;
pub mod traffic_stats;

pub use proxy_nodes::Entity as ProxyNodes;
pub use traffic_stats::Entity as TrafficStats;
