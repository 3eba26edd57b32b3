//! # 代理上下文模块
//!
//! 单个客户端请求在处理过程中携带的上下文

use axum::http::{HeaderMap, header};
use std::time::Instant;

/// 请求上下文
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// 请求ID
    pub request_id: String,
    /// 客户端看到的协议（http/https）
    pub scheme: String,
    /// 客户端看到的主机名（含端口）
    pub authority: String,
    /// 开始时间
    pub start_time: Instant,
}

impl RequestContext {
    pub fn new(scheme: impl Into<String>, authority: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            scheme: scheme.into(),
            authority: authority.into(),
            start_time: Instant::now(),
        }
    }

    /// 从请求头推断客户端视角的协议和主机
    ///
    /// 协议取 `X-Forwarded-Proto`，缺省为配置的 `public_scheme`；
    /// 主机取 `X-Forwarded-Host`，其次 `Host`。
    #[must_use]
    pub fn from_headers(headers: &HeaderMap, public_scheme: &str) -> Self {
        let scheme = first_value(headers, "x-forwarded-proto")
            .map_or_else(|| public_scheme.to_string(), str::to_ascii_lowercase);
        let authority = first_value(headers, "x-forwarded-host")
            .or_else(|| first_value(headers, header::HOST.as_str()))
            .unwrap_or("localhost")
            .to_string();

        Self::new(scheme, authority)
    }

    /// 改写后的 token 服务地址
    #[must_use]
    pub fn token_realm(&self) -> String {
        format!("{}://{}/token", self.scheme, self.authority)
    }

    /// 已耗时（毫秒）
    #[must_use]
    pub fn elapsed_ms(&self) -> u128 {
        self.start_time.elapsed().as_millis()
    }
}

fn first_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}
