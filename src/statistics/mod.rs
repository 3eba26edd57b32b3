//! 流量统计模块
//!
//! 按自然日累计代理的上下行字节数与记账次数。

pub mod accountant;
pub mod store;

pub use accountant::TrafficAccountant;
pub use store::{
    DEFAULT_HISTORY_DAYS, DailyTraffic, DbTrafficStore, TrafficDelta, TrafficStore, local_today,
};
