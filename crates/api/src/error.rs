use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use fleet_core::FleetError;
use serde_json::json;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("调度错误: {0}")]
    Fleet(#[from] FleetError),

    #[error("请求参数错误: {0}")]
    BadRequest(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            ApiError::Fleet(FleetError::NoNodesAvailable) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "NO_NODES_AVAILABLE",
                "没有可用的处理节点".to_string(),
            ),
            ApiError::Fleet(FleetError::NodeNotFound { id }) => (
                StatusCode::NOT_FOUND,
                "NODE_NOT_FOUND",
                format!("节点 {id} 不存在或未通过验证"),
            ),
            ApiError::Fleet(FleetError::BatchNotFound { id }) => (
                StatusCode::NOT_FOUND,
                "BATCH_NOT_FOUND",
                format!("批次 {id} 不存在"),
            ),
            ApiError::Fleet(FleetError::RegistryUnavailable(msg)) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "REGISTRY_UNAVAILABLE",
                format!("节点注册中心不可用: {msg}"),
            ),
            ApiError::Fleet(FleetError::InvalidJob(msg)) => (
                StatusCode::BAD_REQUEST,
                "INVALID_JOB",
                format!("作业无效: {msg}"),
            ),
            ApiError::Fleet(FleetError::PoolClosed) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SHUTTING_DOWN",
                "服务正在关闭".to_string(),
            ),
            ApiError::Fleet(other) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                other.to_string(),
            ),
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                "BAD_REQUEST",
                format!("请求参数错误: {msg}"),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = self.parts();
        if status.is_server_error() {
            error!("请求处理失败: {}", self);
        }

        let body = Json(json!({
            "success": false,
            "data": null,
            "message": message,
            "error": {
                "type": error_type,
                "code": status.as_u16(),
            },
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }));

        (status, body).into_response()
    }
}
