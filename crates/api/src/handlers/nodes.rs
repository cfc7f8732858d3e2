use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use fleet_core::{Node, NodeHeartbeat};
use tracing::info;

use crate::{
    error::{ApiError, ApiResult},
    response::{success, ApiResponse},
    routes::AppState,
};

/// 获取已验证的可用节点
pub async fn list_nodes(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let nodes = state.dispatcher.available_nodes().await;
    Ok(success(nodes))
}

/// 按ID获取可用节点
pub async fn get_node(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let node = state.dispatcher.node_by_id(id).await?;
    Ok(success(node))
}

/// 加权最少连接选择单个节点
pub async fn select_node(State(state): State<AppState>) -> ApiResult<ApiResponse<Node>> {
    Ok(match state.dispatcher.select_node().await {
        Some(node) => ApiResponse::success(node),
        None => ApiResponse::empty_with_message("没有可选择的节点".to_string()),
    })
}

/// 使健康缓存失效，下一次请求会重新探活
pub async fn invalidate_cache(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    state.dispatcher.invalidate_health_cache().await;
    info!("通过API使节点缓存失效");
    Ok(ApiResponse::<()>::empty_with_message("节点缓存已失效".to_string()))
}

/// 接收节点心跳，登记后使健康缓存失效
pub async fn node_heartbeat(
    State(state): State<AppState>,
    Json(heartbeat): Json<NodeHeartbeat>,
) -> ApiResult<impl IntoResponse> {
    if heartbeat.host.trim().is_empty() || heartbeat.port == 0 {
        return Err(ApiError::BadRequest("心跳缺少有效的节点地址".to_string()));
    }
    state.dispatcher.record_heartbeat(&heartbeat).await?;
    Ok(ApiResponse::<()>::empty_with_message("心跳已登记".to_string()))
}
