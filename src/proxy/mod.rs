//! # 代理服务模块
//!
//! Registry V2 请求的选路、转发与认证质询改写

pub mod auth_challenge;
pub mod context;
pub mod engine;
pub mod router;
pub mod server;
pub mod state;

pub use auth_challenge::rewrite_realm;
pub use context::RequestContext;
pub use engine::{ProxyEngine, ProxyRequest};
pub use router::create_router;
pub use server::ProxyServer;
pub use state::ProxyState;
