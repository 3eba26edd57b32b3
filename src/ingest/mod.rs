//! 镜像采集模块

pub mod feed;
pub mod scheduler;
pub mod service;

pub use feed::{FeedCandidate, FeedReject, UNKNOWN_MIRROR_NAME, parse_entry};
pub use scheduler::IngestionScheduler;
pub use service::{IngestionReport, IngestionService};
