//! 批量探测与节点状态回写

mod common;

use common::{closed_port_url, create_test_db};
use pretty_assertions::assert_eq;
use registry_proxy::health::{HealthCheckService, RegistryProber, RefreshSummary};
use registry_proxy::upstream::{DbNodeStore, LATENCY_SENTINEL, NewProxyNode, NodeStore};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn service(store: Arc<dyn NodeStore>, reprobe_disabled: bool) -> HealthCheckService {
    let prober = RegistryProber::new(Duration::from_secs(2)).unwrap();
    HealthCheckService::new(prober, store, 4, reprobe_disabled)
}

async fn registry(status: u16) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/"))
        .respond_with(ResponseTemplate::new(status))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_refresh_all_updates_each_node() {
    let db = create_test_db().await;
    let store: Arc<dyn NodeStore> = Arc::new(DbNodeStore::new(db));

    let healthy = registry(401).await;
    let broken = registry(503).await;
    let dead = closed_port_url().await;

    let a = store.create(NewProxyNode::dockerhub("a", healthy.uri())).await.unwrap();
    let b = store.create(NewProxyNode::dockerhub("b", broken.uri())).await.unwrap();
    let c = store.create(NewProxyNode::dockerhub("c", dead)).await.unwrap();

    let summary = service(Arc::clone(&store), false).refresh_all().await.unwrap();
    assert_eq!(
        summary,
        RefreshSummary {
            probed: 3,
            healthy: 1,
            failed: 2
        }
    );

    let a = store.get(a.id).await.unwrap().unwrap();
    assert!(a.enabled);
    assert!(a.latency < LATENCY_SENTINEL);
    assert!(a.last_check.is_some());

    let b = store.get(b.id).await.unwrap().unwrap();
    assert!(!b.enabled);
    assert_eq!(b.failure_reason.as_deref(), Some("Status: 503"));

    let c = store.get(c.id).await.unwrap().unwrap();
    assert!(!c.enabled);
    assert!(c.failure_reason.unwrap().starts_with("Connection Failed"));

    let selectable: Vec<i32> = store
        .list_enabled_by_latency()
        .await
        .unwrap()
        .into_iter()
        .map(|node| node.id)
        .collect();
    assert_eq!(selectable, vec![a.id]);
}

#[tokio::test]
async fn test_three_failed_probes_leave_node_disabled() {
    let db = create_test_db().await;
    let store: Arc<dyn NodeStore> = Arc::new(DbNodeStore::new(db));
    let broken = registry(500).await;
    let node = store.create(NewProxyNode::dockerhub("x", broken.uri())).await.unwrap();

    let service = service(Arc::clone(&store), false);
    for _ in 0..3 {
        let outcome = service.check_node(node.id).await.unwrap().unwrap();
        assert!(!outcome.is_alive());
    }

    let node = store.get(node.id).await.unwrap().unwrap();
    assert!(!node.enabled);
    assert_eq!(node.latency, LATENCY_SENTINEL);
    assert_eq!(node.failure_reason.as_deref(), Some("Status: 500"));
    assert!(store.list_enabled_by_latency().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_disabled_nodes_are_skipped_unless_reprobe_enabled() {
    let db = create_test_db().await;
    let store: Arc<dyn NodeStore> = Arc::new(DbNodeStore::new(db));
    let registry = registry(200).await;
    let node = store.create(NewProxyNode::dockerhub("x", registry.uri())).await.unwrap();

    let mut disabled = store.get(node.id).await.unwrap().unwrap();
    disabled.enabled = false;
    store.update(&disabled).await.unwrap();

    let summary = service(Arc::clone(&store), false).refresh_scheduled().await.unwrap();
    assert_eq!(summary.probed, 0);
    assert!(!store.get(node.id).await.unwrap().unwrap().enabled);

    let summary = service(Arc::clone(&store), true).refresh_scheduled().await.unwrap();
    assert_eq!(summary.healthy, 1);
    assert!(store.get(node.id).await.unwrap().unwrap().enabled);
}

#[tokio::test]
async fn test_check_missing_node_returns_none() {
    let db = create_test_db().await;
    let store: Arc<dyn NodeStore> = Arc::new(DbNodeStore::new(db));
    assert!(service(store, false).check_node(42).await.unwrap().is_none());
}
