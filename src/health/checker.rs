//! # Registry 探测器实现

use super::types::{ProbeFailure, ProbeOutcome};
use crate::error::{ProxyError, Result};
use crate::upstream::ProxyNode;
use reqwest::{Client, StatusCode};
use std::error::Error as _;
use std::time::{Duration, Instant};

/// 对节点的 `/v2/` 端点发起 GET，200 或 401 视为存活
#[derive(Clone)]
pub struct RegistryProber {
    client: Client,
}

impl RegistryProber {
    /// 创建新的探测器
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| ProxyError::health_check_with_source("创建探测 HTTP 客户端失败", e))?;

        Ok(Self { client })
    }

    /// 探测单个节点，从不返回错误
    pub async fn probe(&self, node: &ProxyNode) -> ProbeOutcome {
        let url = format!("{}/v2/", node.url.trim_end_matches('/'));
        let start_time = Instant::now();

        let mut request = self.client.get(&url);
        if let Some((username, password)) = node.basic_auth() {
            request = request.basic_auth(username, Some(password));
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                if status == StatusCode::OK || status == StatusCode::UNAUTHORIZED {
                    ProbeOutcome::alive(start_time.elapsed().as_secs_f64() * 1000.0)
                } else {
                    ProbeOutcome::failed(ProbeFailure::UnexpectedStatus(status.as_u16()))
                }
            }
            Err(e) => ProbeOutcome::failed(classify_error(&e)),
        }
    }
}

fn classify_error(err: &reqwest::Error) -> ProbeFailure {
    if err.is_timeout() {
        ProbeFailure::Timeout
    } else if err.is_connect() {
        ProbeFailure::Connect(root_cause(err))
    } else {
        ProbeFailure::Other(err.to_string())
    }
}

/// reqwest 的顶层信息只有 "error sending request"，取最底层原因
fn root_cause(err: &reqwest::Error) -> String {
    let mut cause: &dyn std::error::Error = err;
    while let Some(next) = cause.source() {
        cause = next;
    }
    cause.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::node;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn prober() -> RegistryProber {
        RegistryProber::new(Duration::from_millis(500)).unwrap()
    }

    #[tokio::test]
    async fn test_unauthorized_counts_as_alive() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let outcome = prober().probe(&node(1, &server.uri(), 9999.0, None)).await;
        assert!(outcome.is_alive());
        assert!(outcome.latency_ms >= 0.0);
    }

    #[tokio::test]
    async fn test_unexpected_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let outcome = prober().probe(&node(1, &server.uri(), 9999.0, None)).await;
        assert_eq!(outcome.failure, Some(ProbeFailure::UnexpectedStatus(503)));
        assert!(!outcome.is_alive());
    }

    #[tokio::test]
    async fn test_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let outcome = prober().probe(&node(1, &server.uri(), 9999.0, None)).await;
        assert_eq!(outcome.failure, Some(ProbeFailure::Timeout));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        // 绑定后立即释放，得到一个无人监听的端口
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let outcome = prober()
            .probe(&node(1, &format!("http://{addr}"), 9999.0, None))
            .await;
        assert!(matches!(outcome.failure, Some(ProbeFailure::Connect(_))));
        assert!(outcome.failure_reason().unwrap().starts_with("Connection Failed"));
    }

    #[tokio::test]
    async fn test_basic_auth_sent_only_with_both_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let mut with_creds = node(1, &server.uri(), 9999.0, None);
        with_creds.username = Some("user".to_string());
        with_creds.password = Some("pass".to_string());
        assert!(prober().probe(&with_creds).await.is_alive());

        let mut user_only = node(2, &server.uri(), 9999.0, None);
        user_only.username = Some("user".to_string());
        let outcome = prober().probe(&user_only).await;
        assert_eq!(outcome.failure, Some(ProbeFailure::UnexpectedStatus(403)));
    }

    #[tokio::test]
    async fn test_follows_redirects() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/"))
            .respond_with(
                ResponseTemplate::new(307).insert_header("location", "/moved/v2/"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/moved/v2/"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        assert!(prober().probe(&node(1, &server.uri(), 9999.0, None)).await.is_alive());
    }
}
