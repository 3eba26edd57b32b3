//! # 代理路由
//!
//! 对外暴露 Registry V2 API 与 token 端点

use super::context::RequestContext;
use super::engine::ProxyRequest;
use super::state::ProxyState;
use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, Method, Response, Uri};
use axum::routing::{MethodFilter, get, on};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

/// 代理转发的 HTTP 方法
fn proxied_methods() -> MethodFilter {
    MethodFilter::GET
        .or(MethodFilter::HEAD)
        .or(MethodFilter::POST)
        .or(MethodFilter::PUT)
        .or(MethodFilter::DELETE)
        .or(MethodFilter::PATCH)
}

/// 创建代理路由
pub fn create_router(state: ProxyState) -> Router {
    Router::new()
        .route("/token", get(token_handler))
        .route("/v2", on(proxied_methods(), registry_handler))
        .route("/v2/", on(proxied_methods(), registry_handler))
        .route("/v2/{*path}", on(proxied_methods(), registry_handler))
        // 推送镜像层时请求体可能很大
        .layer(DefaultBodyLimit::disable())
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

async fn registry_handler(
    State(state): State<ProxyState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response<Body> {
    let ctx = RequestContext::from_headers(&headers, state.public_scheme());
    let request = ProxyRequest {
        method,
        path: registry_path(&uri).to_string(),
        query: uri.query().map(str::to_string),
        headers,
        body,
    };
    state.handle(ctx, request).await
}

async fn token_handler(
    State(state): State<ProxyState>,
    uri: Uri,
    headers: HeaderMap,
) -> Response<Body> {
    let ctx = RequestContext::from_headers(&headers, state.public_scheme());
    state
        .handle_token(ctx, uri.query().map(str::to_string), &headers)
        .await
}

/// `/v2/` 之后的原始路径（保持百分号编码）
fn registry_path(uri: &Uri) -> &str {
    uri.path()
        .strip_prefix("/v2/")
        .or_else(|| uri.path().strip_prefix("/v2"))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_path() {
        let uri: Uri = "/v2/library/nginx/manifests/latest?x=1".parse().unwrap();
        assert_eq!(registry_path(&uri), "library/nginx/manifests/latest");

        let uri: Uri = "/v2/".parse().unwrap();
        assert_eq!(registry_path(&uri), "");

        let uri: Uri = "/v2".parse().unwrap();
        assert_eq!(registry_path(&uri), "");
    }
}
