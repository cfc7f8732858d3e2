use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use fleet_dispatcher::FleetDispatcher;

use crate::handlers::{
    batches::{get_batch_metrics, plan_batch, submit_batch},
    health::health_check,
    nodes::{get_node, invalidate_cache, list_nodes, node_heartbeat, select_node},
};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<FleetDispatcher>,
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        // 健康检查
        .route("/health", get(health_check))
        // 节点API
        .route("/api/v1/nodes", get(list_nodes))
        .route("/api/v1/nodes/select", get(select_node))
        .route("/api/v1/nodes/cache/invalidate", post(invalidate_cache))
        .route("/api/v1/nodes/heartbeat", post(node_heartbeat))
        .route("/api/v1/nodes/{id}", get(get_node))
        // 批次API
        .route("/api/v1/batches/plan", post(plan_batch))
        .route("/api/v1/batches", post(submit_batch))
        .route("/api/v1/batches/{id}", get(get_batch_metrics))
        .with_state(state)
}
