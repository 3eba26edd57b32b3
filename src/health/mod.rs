//! # 节点健康检查模块
//!
//! 探测各镜像节点的 `/v2/` 端点，维护选路所需的延迟与启用状态

pub mod checker;
pub mod scheduler;
pub mod service;
pub mod types;

pub use checker::RegistryProber;
pub use scheduler::{HealthCheckScheduler, spawn_interval_loop};
pub use service::HealthCheckService;
pub use types::{ProbeFailure, ProbeOutcome, RefreshSummary};
