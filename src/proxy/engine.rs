//! # 流式代理引擎
//!
//! 对单个客户端请求：选路、转发、改写认证质询、边转发边计量响应体。

use super::auth_challenge::rewrite_realm;
use super::context::RequestContext;
use crate::error::{ProxyError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::statistics::TrafficAccountant;
use crate::upstream::UpstreamSelector;
use crate::{ldebug, linfo, lwarn};
use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, Method, Response, header};
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

/// 不转发给上游的请求头
const STRIPPED_REQUEST_HEADERS: [header::HeaderName; 2] = [header::HOST, header::CONTENT_LENGTH];

/// 不回传给客户端的响应头：长度和编码由本端重新决定，逐跳头不跨连接
const STRIPPED_RESPONSE_HEADERS: [header::HeaderName; 6] = [
    header::CONTENT_LENGTH,
    header::CONTENT_ENCODING,
    header::TRANSFER_ENCODING,
    header::CONNECTION,
    header::TRAILER,
    header::UPGRADE,
];

/// 转发给上游的请求
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    /// `/v2/` 之后的路径
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// 代理引擎
pub struct ProxyEngine {
    selector: Arc<UpstreamSelector>,
    accountant: Arc<TrafficAccountant>,
    client: reqwest::Client,
    auth_endpoint: String,
}

impl ProxyEngine {
    pub fn new(
        selector: Arc<UpstreamSelector>,
        accountant: Arc<TrafficAccountant>,
        client: reqwest::Client,
        auth_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            selector,
            accountant,
            client,
            auth_endpoint: auth_endpoint.into(),
        }
    }

    /// 上游 HTTP 客户端：跟随重定向，只限制建连时间，大文件下载不设总超时
    pub fn build_client(connect_timeout: Duration) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| ProxyError::server_init_with_source("创建上游 HTTP 客户端失败", e))
    }

    /// 代理 `/v2/...` 请求
    pub async fn handle(&self, ctx: RequestContext, request: ProxyRequest) -> Response<Body> {
        let path = request.path.trim_start_matches('/');
        let selection = self.selector.select_upstream(&ctx.request_id, path).await;

        let mut upstream_url = format!(
            "{}/v2/{}",
            selection.node.url.trim_end_matches('/'),
            selection.adjusted_path
        );
        if let Some(query) = request.query.as_deref().filter(|q| !q.is_empty()) {
            upstream_url.push('?');
            upstream_url.push_str(query);
        }

        linfo!(
            &ctx.request_id,
            LogStage::RequestStart,
            LogComponent::Proxy,
            "forward_request",
            "转发请求到上游",
            method = %request.method,
            path = %path,
            node_id = selection.node.id,
            upstream = %upstream_url
        );

        self.accountant.record(0, request.body.len() as u64);

        let sent = self
            .client
            .request(request.method.clone(), &upstream_url)
            .headers(forwarded_headers(&request.headers))
            .body(request.body)
            .send()
            .await;

        let response = match sent {
            Ok(response) => response,
            Err(err) => {
                let message = error_text(&err);
                lwarn!(
                    &ctx.request_id,
                    LogStage::UpstreamRequest,
                    LogComponent::Proxy,
                    "upstream_unreachable",
                    "上游连接失败",
                    upstream = %upstream_url,
                    error = %message
                );
                return error_response(&ProxyError::bad_gateway_with_source(message, err));
            }
        };

        let status = response.status();
        let mut headers = response.headers().clone();
        rewrite_challenges(&mut headers, &ctx);
        strip_response_headers(&mut headers);

        ldebug!(
            &ctx.request_id,
            LogStage::ResponseProcessing,
            LogComponent::Proxy,
            "upstream_response",
            "收到上游响应，开始流式回传",
            status = status.as_u16(),
            elapsed_ms = ctx.elapsed_ms()
        );

        let body = MeteredBody::new(
            Box::pin(response.bytes_stream()),
            Arc::clone(&self.accountant),
            ctx.request_id.clone(),
            upstream_url,
        );

        let mut builder = Response::builder().status(status);
        if let Some(target) = builder.headers_mut() {
            *target = headers;
        }
        builder
            .body(Body::from_stream(body))
            .unwrap_or_else(|_| internal_error())
    }

    /// 代理 `/token` 请求到认证服务，响应体较小，整体缓冲后返回
    pub async fn handle_token(
        &self,
        ctx: RequestContext,
        query: Option<String>,
        headers: &HeaderMap,
    ) -> Response<Body> {
        let query = query.unwrap_or_default();
        let mut url = self.auth_endpoint.clone();
        if !query.is_empty() {
            url.push('?');
            url.push_str(&query);
        }

        self.accountant.record(0, query.len() as u64);

        let sent = self
            .client
            .get(&url)
            .headers(forwarded_headers(headers))
            .send()
            .await;

        let result = match sent {
            Ok(response) => {
                let status = response.status();
                let mut headers = response.headers().clone();
                strip_response_headers(&mut headers);
                response.bytes().await.map(|body| (status, headers, body))
            }
            Err(err) => Err(err),
        };

        match result {
            Ok((status, headers, body)) => {
                linfo!(
                    &ctx.request_id,
                    LogStage::ResponseProcessing,
                    LogComponent::TokenProxy,
                    "token_forwarded",
                    "token 请求已转发",
                    status = status.as_u16(),
                    bytes = body.len()
                );
                let mut builder = Response::builder().status(status);
                if let Some(target) = builder.headers_mut() {
                    *target = headers;
                }
                builder
                    .body(Body::from(body))
                    .unwrap_or_else(|_| internal_error())
            }
            Err(err) => {
                let message = error_text(&err);
                lwarn!(
                    &ctx.request_id,
                    LogStage::UpstreamRequest,
                    LogComponent::TokenProxy,
                    "token_upstream_failed",
                    "认证服务请求失败",
                    error = %message
                );
                error_response(&ProxyError::bad_gateway_with_source(message, err))
            }
        }
    }
}

fn forwarded_headers(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = headers.clone();
    for name in &STRIPPED_REQUEST_HEADERS {
        forwarded.remove(name);
    }
    forwarded
}

fn strip_response_headers(headers: &mut HeaderMap) {
    for name in &STRIPPED_RESPONSE_HEADERS {
        headers.remove(name);
    }
}

/// 改写每个 `WWW-Authenticate` 值中的 realm，无法改写的值原样保留
fn rewrite_challenges(headers: &mut HeaderMap, ctx: &RequestContext) {
    let values: Vec<HeaderValue> = headers
        .get_all(header::WWW_AUTHENTICATE)
        .iter()
        .cloned()
        .collect();
    if values.is_empty() {
        return;
    }

    let realm = ctx.token_realm();
    headers.remove(header::WWW_AUTHENTICATE);
    for value in values {
        let rewritten = value
            .to_str()
            .ok()
            .and_then(|text| rewrite_realm(text, &realm))
            .and_then(|text| HeaderValue::from_str(&text).ok());

        if rewritten.is_none() {
            ldebug!(
                &ctx.request_id,
                LogStage::ResponseProcessing,
                LogComponent::AuthChallenge,
                "realm_not_rewritten",
                "认证质询中没有可改写的 realm，原样转发"
            );
        }
        headers.append(header::WWW_AUTHENTICATE, rewritten.unwrap_or(value));
    }
}

/// 错误文本：顶层信息加最底层原因
fn error_text(err: &reqwest::Error) -> String {
    let mut cause: &dyn std::error::Error = err;
    while let Some(next) = cause.source() {
        cause = next;
    }
    let root = cause.to_string();
    let top = err.to_string();
    if root == top { top } else { format!("{top}: {root}") }
}

/// 把错误转成纯文本响应，状态码取自错误类型
fn error_response(err: &ProxyError) -> Response<Body> {
    let (status, _) = err.to_http_response_parts();
    let mut response = Response::new(Body::from(err.to_string()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

fn internal_error() -> Response<Body> {
    error_response(&ProxyError::internal("构建响应失败"))
}

type UpstreamStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// 计量响应体：每个分块先记账再交给客户端；被丢弃时记录传输结果
///
/// 只有客户端拉取时才轮询上游，背压自然传导。
struct MeteredBody {
    inner: UpstreamStream,
    accountant: Arc<TrafficAccountant>,
    request_id: String,
    upstream_url: String,
    bytes: u64,
    chunks: u64,
    finished: bool,
    failed: bool,
}

impl MeteredBody {
    fn new(
        inner: UpstreamStream,
        accountant: Arc<TrafficAccountant>,
        request_id: String,
        upstream_url: String,
    ) -> Self {
        Self {
            inner,
            accountant,
            request_id,
            upstream_url,
            bytes: 0,
            chunks: 0,
            finished: false,
            failed: false,
        }
    }
}

impl Stream for MeteredBody {
    type Item = reqwest::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.bytes += chunk.len() as u64;
                this.chunks += 1;
                this.accountant.record(chunk.len() as u64, 0);
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(err))) => {
                this.failed = true;
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                this.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for MeteredBody {
    fn drop(&mut self) {
        if self.finished {
            linfo!(
                &self.request_id,
                LogStage::ResponseProcessing,
                LogComponent::Proxy,
                "stream_completed",
                "响应体传输完成",
                bytes = self.bytes,
                chunks = self.chunks
            );
        } else if self.failed {
            lwarn!(
                &self.request_id,
                LogStage::ResponseFailure,
                LogComponent::Proxy,
                "upstream_stream_failed",
                "上游响应体读取失败",
                upstream = %self.upstream_url,
                bytes = self.bytes
            );
        } else {
            lwarn!(
                &self.request_id,
                LogStage::ResponseFailure,
                LogComponent::Proxy,
                "client_disconnected",
                "客户端提前断开，释放上游连接",
                upstream = %self.upstream_url,
                bytes = self.bytes
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forwarded_headers_drop_host_and_length() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("proxy.local"));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("10"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

        let forwarded = forwarded_headers(&headers);
        assert!(forwarded.get(header::HOST).is_none());
        assert!(forwarded.get(header::CONTENT_LENGTH).is_none());
        assert_eq!(forwarded.get(header::AUTHORIZATION).unwrap(), "Bearer abc");
        assert_eq!(forwarded.len(), 2);
    }

    #[test]
    fn test_rewrite_challenges_handles_each_value() {
        let mut headers = HeaderMap::new();
        headers.append(
            header::WWW_AUTHENTICATE,
            HeaderValue::from_static(r#"Bearer realm="https://auth.docker.io/token",service="registry.docker.io""#),
        );
        headers.append(header::WWW_AUTHENTICATE, HeaderValue::from_static("Negotiate"));

        let ctx = RequestContext::new("https", "hub.example.com");
        rewrite_challenges(&mut headers, &ctx);

        let values: Vec<&str> = headers
            .get_all(header::WWW_AUTHENTICATE)
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(
            values,
            vec![
                r#"Bearer realm="https://hub.example.com/token",service="registry.docker.io""#,
                "Negotiate"
            ]
        );
    }

    #[tokio::test]
    async fn test_error_response_uses_error_status() {
        let response = error_response(&ProxyError::bad_gateway("connection refused"));
        assert_eq!(response.status(), axum::http::StatusCode::BAD_GATEWAY);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], "网关错误: connection refused".as_bytes());

        assert_eq!(
            internal_error().status(),
            axum::http::StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_strip_response_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("10"));
        headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        headers.insert("docker-content-digest", HeaderValue::from_static("sha256:abc"));

        strip_response_headers(&mut headers);
        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key("docker-content-digest"));
    }
}
