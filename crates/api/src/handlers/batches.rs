use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use fleet_core::Job;
use serde::Deserialize;
use tracing::info;

use crate::{
    error::{ApiError, ApiResult},
    response::success,
    routes::AppState,
};

/// 分配请求
#[derive(Debug, Deserialize)]
pub struct PlanRequest {
    pub jobs: Vec<Job>,
}

/// 批次提交请求
#[derive(Debug, Deserialize)]
pub struct SubmitBatchRequest {
    pub batch_id: i64,
    pub jobs: Vec<Job>,
}

/// 只计算分配方案，不执行
pub async fn plan_batch(
    State(state): State<AppState>,
    Json(request): Json<PlanRequest>,
) -> ApiResult<impl IntoResponse> {
    let plan = state.dispatcher.distribute(request.jobs).await?;
    Ok(success(plan))
}

/// 分配并执行一个批次，执行结束后返回汇总
pub async fn submit_batch(
    State(state): State<AppState>,
    Json(request): Json<SubmitBatchRequest>,
) -> ApiResult<impl IntoResponse> {
    if request.jobs.is_empty() {
        return Err(ApiError::BadRequest("批次中没有作业".to_string()));
    }

    info!(batch_id = request.batch_id, "收到批次: {} 个作业", request.jobs.len());
    let outcome = state
        .dispatcher
        .submit_batch(request.batch_id, request.jobs)
        .await?;
    Ok(success(outcome))
}

/// 查询批次进度
pub async fn get_batch_metrics(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let metrics = state.dispatcher.batch_metrics(id).await?;
    Ok(success(metrics))
}
