//! HTTP调用的错误映射

use fleet_core::FleetError;
use reqwest::Response;
use tracing::warn;

/// HTTP操作上下文，用于错误信息
#[derive(Debug, Clone, Copy)]
pub enum HttpOperation {
    ListNodes,
    RecordHeartbeat,
    RecordResult,
    MarkProcessed,
    UpdateBatch,
    AppendLog,
    GetBatch,
    ProbeStatus,
    ProcessJob,
}

impl std::fmt::Display for HttpOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpOperation::ListNodes => write!(f, "获取活跃节点"),
            HttpOperation::RecordHeartbeat => write!(f, "登记节点心跳"),
            HttpOperation::RecordResult => write!(f, "记录作业结果"),
            HttpOperation::MarkProcessed => write!(f, "标记作业已处理"),
            HttpOperation::UpdateBatch => write!(f, "更新批次状态"),
            HttpOperation::AppendLog => write!(f, "写入执行日志"),
            HttpOperation::GetBatch => write!(f, "查询批次"),
            HttpOperation::ProbeStatus => write!(f, "节点探活"),
            HttpOperation::ProcessJob => write!(f, "节点执行作业"),
        }
    }
}

/// 把reqwest错误映射为 `FleetError::Network`
pub fn map_request_error(operation: HttpOperation, err: reqwest::Error) -> FleetError {
    let kind = if err.is_timeout() {
        "超时"
    } else if err.is_connect() {
        "连接失败"
    } else if err.is_decode() {
        "响应解析失败"
    } else {
        "请求失败"
    };
    FleetError::Network(format!("{operation}{kind}: {err}"))
}

/// 非2xx响应转换为错误，响应体作为错误信息的一部分
pub async fn ensure_success(operation: HttpOperation, response: Response) -> Result<Response, FleetError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    warn!("{}返回 HTTP {}: {}", operation, status, body);
    Err(FleetError::Network(format!(
        "{operation}失败: HTTP {} - {}",
        status.as_u16(),
        truncate(&body, 200)
    )))
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => format!("{}...", &text[..index]),
        None => text.to_string(),
    }
}
