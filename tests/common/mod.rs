//! 集成测试共用的搭建代码

#![allow(dead_code)]

use registry_proxy::health::ProbeOutcome;
use registry_proxy::proxy::{ProxyEngine, ProxyServer, ProxyState};
use registry_proxy::statistics::{DbTrafficStore, TrafficAccountant, TrafficStore};
use registry_proxy::upstream::{DbNodeStore, NewProxyNode, NodeStore, ProxyNode, UpstreamSelector};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// 已迁移的内存数据库
pub async fn create_test_db() -> Arc<DatabaseConnection> {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(options).await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    Arc::new(db)
}

/// 写入节点并记录一次成功探测
pub async fn add_alive_node(
    store: &dyn NodeStore,
    url: &str,
    latency_ms: f64,
    route_prefix: Option<&str>,
) -> ProxyNode {
    let mut new_node = NewProxyNode::dockerhub(format!("mirror {url}"), url);
    if let Some(prefix) = route_prefix {
        new_node = new_node.with_route_prefix(prefix);
    }
    let node = store.create(new_node).await.unwrap();
    store
        .record_probe(node.id, &ProbeOutcome::alive(latency_ms))
        .await
        .unwrap();
    store.get(node.id).await.unwrap().unwrap()
}

/// 运行中的代理实例
pub struct TestProxy {
    pub addr: SocketAddr,
    pub node_store: Arc<dyn NodeStore>,
    pub traffic_store: Arc<dyn TrafficStore>,
    pub accountant: Arc<TrafficAccountant>,
}

impl TestProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }
}

/// 在随机端口上启动代理
pub async fn spawn_proxy(
    db: Arc<DatabaseConnection>,
    fallback_registry: &str,
    auth_endpoint: &str,
) -> TestProxy {
    let node_store: Arc<dyn NodeStore> = Arc::new(DbNodeStore::new(Arc::clone(&db)));
    let traffic_store: Arc<dyn TrafficStore> = Arc::new(DbTrafficStore::new(db));
    let accountant = TrafficAccountant::start(Arc::clone(&traffic_store));

    let selector = Arc::new(UpstreamSelector::new(
        Arc::clone(&node_store),
        fallback_registry,
    ));
    let client = ProxyEngine::build_client(Duration::from_secs(2)).unwrap();
    let engine = Arc::new(ProxyEngine::new(
        selector,
        Arc::clone(&accountant),
        client,
        auth_endpoint,
    ));

    let server = ProxyServer::bind("127.0.0.1:0", ProxyState::new(engine, "http"))
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.serve());

    TestProxy {
        addr,
        node_store,
        traffic_store,
        accountant,
    }
}

/// 一个当前没有进程监听的本地地址
pub async fn closed_port_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}
