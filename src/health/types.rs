//! # 健康检查类型定义

use crate::upstream::LATENCY_SENTINEL;
use serde::Serialize;
use std::fmt;

/// 探测失败原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeFailure {
    /// 超过探测超时
    Timeout,
    /// 连接被拒绝或域名解析失败
    Connect(String),
    /// 既不是 200 也不是 401
    UnexpectedStatus(u16),
    /// 其他错误（TLS、协议错误等）
    Other(String),
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "Connection Timeout"),
            Self::Connect(detail) if detail.is_empty() => write!(f, "Connection Failed"),
            Self::Connect(detail) => write!(f, "Connection Failed: {detail}"),
            Self::UnexpectedStatus(code) => write!(f, "Status: {code}"),
            Self::Other(detail) => write!(f, "{detail}"),
        }
    }
}

/// 单次探测结果
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    /// 往返耗时（毫秒），失败时为哨兵值
    pub latency_ms: f64,
    pub failure: Option<ProbeFailure>,
}

impl ProbeOutcome {
    #[must_use]
    pub const fn alive(latency_ms: f64) -> Self {
        Self {
            latency_ms,
            failure: None,
        }
    }

    #[must_use]
    pub const fn failed(failure: ProbeFailure) -> Self {
        Self {
            latency_ms: LATENCY_SENTINEL,
            failure: Some(failure),
        }
    }

    /// 节点是否应保持启用
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.failure.is_none() && self.latency_ms < LATENCY_SENTINEL
    }

    /// 写入 `failure_reason` 列的文本
    #[must_use]
    pub fn failure_reason(&self) -> Option<String> {
        self.failure.as_ref().map(ToString::to_string)
    }
}

/// 一轮批量探测的汇总
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefreshSummary {
    pub probed: usize,
    pub healthy: usize,
    pub failed: usize,
}

impl RefreshSummary {
    pub(crate) fn record(&mut self, outcome: &ProbeOutcome) {
        self.probed += 1;
        if outcome.is_alive() {
            self.healthy += 1;
        } else {
            self.failed += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_rendering() {
        assert_eq!(ProbeFailure::Timeout.to_string(), "Connection Timeout");
        assert_eq!(ProbeFailure::Connect(String::new()).to_string(), "Connection Failed");
        assert_eq!(
            ProbeFailure::Connect("dns error".to_string()).to_string(),
            "Connection Failed: dns error"
        );
        assert_eq!(ProbeFailure::UnexpectedStatus(503).to_string(), "Status: 503");
        assert_eq!(ProbeFailure::Other("tls handshake".to_string()).to_string(), "tls handshake");
    }

    #[test]
    fn test_outcome_liveness() {
        assert!(ProbeOutcome::alive(12.5).is_alive());
        assert!(!ProbeOutcome::alive(LATENCY_SENTINEL).is_alive());

        let failed = ProbeOutcome::failed(ProbeFailure::UnexpectedStatus(500));
        assert!(!failed.is_alive());
        assert_eq!(failed.failure_reason().as_deref(), Some("Status: 500"));
    }

    #[test]
    fn test_summary_counts() {
        let mut summary = RefreshSummary::default();
        summary.record(&ProbeOutcome::alive(10.0));
        summary.record(&ProbeOutcome::failed(ProbeFailure::Timeout));
        assert_eq!(
            summary,
            RefreshSummary {
                probed: 2,
                healthy: 1,
                failed: 1
            }
        );
    }
}
