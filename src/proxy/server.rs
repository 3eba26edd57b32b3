//! # 代理服务器
//!
//! 绑定监听地址并运行 axum 服务

use super::router::create_router;
use super::state::ProxyState;
use crate::error::{ProxyError, Result};
use crate::linfo;
use crate::logging::{LogComponent, LogStage};
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// 代理服务器
pub struct ProxyServer {
    listener: TcpListener,
    router: Router,
}

impl ProxyServer {
    /// 绑定监听地址，端口为 0 时由系统分配
    pub async fn bind(addr: &str, state: ProxyState) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ProxyError::server_init_with_source(format!("无法绑定地址 {addr}"), e))?;

        Ok(Self {
            listener,
            router: create_router(state),
        })
    }

    /// 实际监听地址
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| ProxyError::server_init_with_source("无法获取监听地址", e))
    }

    /// 运行直到出错
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// 运行直到 `shutdown` 完成，之后不再接受新连接
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.local_addr()?;
        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::ServerSetup,
            "server_start",
            "代理服务开始监听",
            address = %addr
        );

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ProxyError::server_start_with_source(format!("代理服务运行失败: {addr}"), e))
    }
}
