//! # Registry Proxy Library
//!
//! Docker Hub 镜像代理核心库：按延迟和路由前缀挑选上游镜像，流式转发并统计流量

pub mod app;
pub mod config;
pub mod database;
pub mod error;
pub mod health;
pub mod ingest;
pub mod logging;
pub mod proxy;
pub mod server_setup;
pub mod statistics;
pub mod upstream;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{ProxyError, Result};
