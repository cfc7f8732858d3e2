//! # Fleet API
//!
//! 分派服务的HTTP接口，基于Axum构建。
//!
//! ## API 端点
//!
//! - `GET /health` - 健康检查
//! - `GET /api/v1/nodes` - 已验证的可用节点
//! - `GET /api/v1/nodes/select` - 加权最少连接选择一个节点
//! - `GET /api/v1/nodes/{id}` - 节点详情
//! - `POST /api/v1/nodes/cache/invalidate` - 使节点健康缓存失效
//! - `POST /api/v1/batches/plan` - 只计算分配方案
//! - `POST /api/v1/batches` - 分配并执行批次
//!
//! 所有接口返回 [`response::ApiResponse`] 格式。

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;

use axum::Router;
use std::sync::Arc;
use tower::ServiceBuilder;

use fleet_dispatcher::FleetDispatcher;
use middleware::{cors_layer, request_logging, trace_layer};
use routes::{create_routes, AppState};

/// 创建完整的API应用
pub fn create_app(dispatcher: Arc<FleetDispatcher>) -> Router {
    create_routes(AppState { dispatcher }).layer(
        ServiceBuilder::new()
            .layer(trace_layer())
            .layer(cors_layer())
            .layer(axum::middleware::from_fn(request_logging)),
    )
}
