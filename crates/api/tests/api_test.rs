use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use fleet_api::create_app;
use fleet_core::{DispatcherConfig, HealthCacheConfig, Node};
use fleet_dispatcher::FleetDispatcher;
use fleet_testing_utils::{test_nodes, MockNodeRegistry, MockNodeRpcClient, MockResultStore};

struct TestApp {
    app: Router,
    registry: MockNodeRegistry,
    rpc: MockNodeRpcClient,
    store: MockResultStore,
}

fn create_test_app(nodes: Vec<Node>) -> TestApp {
    let registry = MockNodeRegistry::with_nodes(nodes);
    let rpc = MockNodeRpcClient::new();
    let store = MockResultStore::new();
    let dispatcher = FleetDispatcher::new(
        Arc::new(registry.clone()),
        Arc::new(rpc.clone()),
        Arc::new(store.clone()),
        HealthCacheConfig::default(),
        DispatcherConfig::default(),
    );

    TestApp {
        app: create_app(Arc::new(dispatcher)),
        registry,
        rpc,
        store,
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let test_app = create_test_app(vec![]);
    let (status, body) = send(&test_app.app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_list_nodes_excludes_unreachable() {
    let test_app = create_test_app(test_nodes(3));
    test_app.rpc.set_unreachable(2);

    let (status, body) = send(&test_app.app, get("/api/v1/nodes")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let ids: Vec<i64> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["node_id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![1, 3]);
}

#[tokio::test]
async fn test_get_node_by_id() {
    let test_app = create_test_app(test_nodes(2));

    let (status, body) = send(&test_app.app, get("/api/v1/nodes/2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["node_name"], "node-2");

    let (status, body) = send(&test_app.app, get("/api/v1/nodes/42")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["type"], "NODE_NOT_FOUND");
}

#[tokio::test]
async fn test_select_node() {
    let nodes = vec![
        test_nodes(1)[0].clone().with_load(2).with_weight(1).with_capacity(4),
        test_nodes(2)[1].clone().with_load(1).with_weight(2).with_capacity(4),
    ];
    let test_app = create_test_app(nodes);

    let (status, body) = send(&test_app.app, get("/api/v1/nodes/select")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["node_id"], 2);
}

#[tokio::test]
async fn test_select_node_without_nodes() {
    let test_app = create_test_app(vec![]);

    let (status, body) = send(&test_app.app, get("/api/v1/nodes/select")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].is_null());
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn test_invalidate_cache() {
    let test_app = create_test_app(test_nodes(1));

    send(&test_app.app, get("/api/v1/nodes")).await;
    let (status, _) = send(
        &test_app.app,
        post_json("/api/v1/nodes/cache/invalidate", json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    send(&test_app.app, get("/api/v1/nodes")).await;
    assert_eq!(test_app.registry.call_count(), 2);
}

#[tokio::test]
async fn test_plan_batch() {
    let test_app = create_test_app(test_nodes(2));
    let jobs: Vec<Value> = (1..=5).map(|id| json!({"job_id": id, "weight": 10})).collect();

    let (status, body) = send(
        &test_app.app,
        post_json("/api/v1/batches/plan", json!({ "jobs": jobs })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total_weight"], 50);
    assert_eq!(body["data"]["shares"][0]["job_count"], 3);
    assert_eq!(body["data"]["shares"][1]["job_count"], 2);
    assert!(test_app.rpc.processed_jobs().is_empty());
}

#[tokio::test]
async fn test_plan_without_nodes_is_unavailable() {
    let test_app = create_test_app(vec![]);

    let (status, body) = send(
        &test_app.app,
        post_json("/api/v1/batches/plan", json!({"jobs": [{"job_id": 1}]})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["type"], "NO_NODES_AVAILABLE");
}

#[tokio::test]
async fn test_submit_batch() {
    let test_app = create_test_app(test_nodes(2));
    test_app.rpc.fail_job(3, "corrupt input");

    let (status, body) = send(
        &test_app.app,
        post_json(
            "/api/v1/batches",
            json!({
                "batch_id": 77,
                "jobs": [
                    {"job_id": 1, "name": "a.png", "weight": 300},
                    {"job_id": 2, "name": "b.png", "weight": 200},
                    {"job_id": 3, "name": "c.png", "weight": 100}
                ]
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["batch_id"], 77);
    assert_eq!(body["data"]["succeeded"], 2);
    assert_eq!(body["data"]["failed"], 1);
    assert_eq!(body["data"]["status"], "completed");
    assert_eq!(test_app.store.results().len(), 3);
}

#[tokio::test]
async fn test_submit_empty_batch_rejected() {
    let test_app = create_test_app(test_nodes(1));

    let (status, body) = send(
        &test_app.app,
        post_json("/api/v1/batches", json!({"batch_id": 1, "jobs": []})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_node_heartbeat_registers_node() {
    let test_app = create_test_app(test_nodes(1));
    send(&test_app.app, get("/api/v1/nodes")).await;

    let (status, body) = send(
        &test_app.app,
        post_json(
            "/api/v1/nodes/heartbeat",
            json!({"node_id": 9, "ip_address": "10.0.0.9", "port": 50051,
                   "cpu_cores": 4, "ram_gb": 8.0, "current_load": 0, "status": "active"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(test_app.registry.heartbeats().len(), 1);

    // 心跳使缓存失效，新节点立即可见
    let (_, body) = send(&test_app.app, get("/api/v1/nodes/9")).await;
    assert_eq!(body["data"]["node_name"], "node-9");
    assert_eq!(test_app.registry.call_count(), 2);
}

#[tokio::test]
async fn test_node_heartbeat_rejects_missing_address() {
    let test_app = create_test_app(test_nodes(1));

    let (status, body) = send(
        &test_app.app,
        post_json(
            "/api/v1/nodes/heartbeat",
            json!({"node_id": 9, "ip_address": " ", "port": 50051}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "BAD_REQUEST");
    assert!(test_app.registry.heartbeats().is_empty());
}

#[tokio::test]
async fn test_node_heartbeat_registry_down() {
    let test_app = create_test_app(test_nodes(1));
    test_app.registry.set_unavailable(true);

    let (status, body) = send(
        &test_app.app,
        post_json(
            "/api/v1/nodes/heartbeat",
            json!({"node_id": 1, "ip_address": "10.0.0.1", "port": 50051}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["type"], "REGISTRY_UNAVAILABLE");
}

#[tokio::test]
async fn test_batch_metrics() {
    let test_app = create_test_app(test_nodes(2));
    test_app.rpc.reject_job(2, "unsupported format");

    let (status, body) = send(&test_app.app, get("/api/v1/batches/12")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["type"], "BATCH_NOT_FOUND");

    send(
        &test_app.app,
        post_json(
            "/api/v1/batches",
            json!({"batch_id": 12, "jobs": [
                {"job_id": 1, "name": "a.png", "weight": 5},
                {"job_id": 2, "name": "b.png", "weight": 4},
                {"job_id": 3, "name": "c.png", "weight": 3}
            ]}),
        ),
    )
    .await;

    let (status, body) = send(&test_app.app, get("/api/v1/batches/12")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "completed");
    assert_eq!(body["data"]["total_jobs"], 3);
    assert_eq!(body["data"]["processed_jobs"], 2);
    assert_eq!(body["data"]["failed_jobs"], 1);
}
