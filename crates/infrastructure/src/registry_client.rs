use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use fleet_core::{
    BatchMetrics, BatchStatus, FleetError, FleetResult, JobResultRecord, LogLevel, LogScope,
    Node, NodeHeartbeat, NodeRegistry, RegistryConfig, ResultStore,
};

use crate::error_handling::{ensure_success, map_request_error, HttpOperation};

#[derive(Debug, Serialize)]
struct BatchStatusUpdate {
    status: BatchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    processed_count: Option<usize>,
}

#[derive(Debug, Serialize)]
struct LogEntry<'a> {
    #[serde(flatten)]
    scope: &'a LogScope,
    level: LogLevel,
    message: &'a str,
}

/// 持久化服务返回的批次记录，只取统计需要的字段
#[derive(Debug, Deserialize)]
struct BatchRecord {
    status: BatchStatus,
    #[serde(default)]
    total_images: usize,
    #[serde(default)]
    processed_images: usize,
}

impl BatchRecord {
    fn into_metrics(self, batch_id: i64) -> BatchMetrics {
        BatchMetrics {
            batch_id,
            status: self.status,
            total_jobs: self.total_images,
            processed_jobs: self.processed_images,
            failed_jobs: self.total_images.saturating_sub(self.processed_images),
        }
    }
}

/// 持久化服务的REST客户端
///
/// 同时充当节点注册中心和结果存储。
#[derive(Debug, Clone)]
pub struct RestRegistryClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl RestRegistryClient {
    pub fn new(config: &RegistryConfig) -> FleetResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| FleetError::Configuration(format!("无法创建HTTP客户端: {e}")))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http_client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl NodeRegistry for RestRegistryClient {
    #[instrument(skip(self))]
    async fn list_active_nodes(&self) -> FleetResult<Vec<Node>> {
        let url = self.url("/api/nodes/active");
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| {
                FleetError::RegistryUnavailable(map_request_error(HttpOperation::ListNodes, e).to_string())
            })?;
        let response = ensure_success(HttpOperation::ListNodes, response)
            .await
            .map_err(|e| FleetError::RegistryUnavailable(e.to_string()))?;

        let nodes: Vec<Node> = response
            .json()
            .await
            .map_err(|e| FleetError::RegistryUnavailable(format!("节点列表解析失败: {e}")))?;

        debug!("注册中心返回 {} 个活跃节点", nodes.len());
        Ok(nodes)
    }

    #[instrument(skip(self, heartbeat), fields(node_id = heartbeat.node_id))]
    async fn record_heartbeat(&self, heartbeat: &NodeHeartbeat) -> FleetResult<()> {
        let url = self.url(&format!("/api/nodes/{}/heartbeat", heartbeat.node_id));
        let response = self
            .http_client
            .put(&url)
            .json(heartbeat)
            .send()
            .await
            .map_err(|e| {
                FleetError::RegistryUnavailable(
                    map_request_error(HttpOperation::RecordHeartbeat, e).to_string(),
                )
            })?;
        ensure_success(HttpOperation::RecordHeartbeat, response)
            .await
            .map_err(|e| FleetError::RegistryUnavailable(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl ResultStore for RestRegistryClient {
    async fn record_job_result(&self, job_id: i64, record: &JobResultRecord) -> FleetResult<()> {
        let url = self.url(&format!("/api/images/{job_id}/result"));
        let response = self
            .http_client
            .post(&url)
            .json(record)
            .send()
            .await
            .map_err(|e| map_request_error(HttpOperation::RecordResult, e))?;
        ensure_success(HttpOperation::RecordResult, response)
            .await
            .map_err(into_persistence)?;
        Ok(())
    }

    async fn mark_job_processed(&self, job_id: i64) -> FleetResult<()> {
        let url = self.url(&format!("/api/images/{job_id}/processed"));
        let response = self
            .http_client
            .put(&url)
            .send()
            .await
            .map_err(|e| map_request_error(HttpOperation::MarkProcessed, e))?;
        ensure_success(HttpOperation::MarkProcessed, response)
            .await
            .map_err(into_persistence)?;
        Ok(())
    }

    async fn update_batch_status(
        &self,
        batch_id: i64,
        status: BatchStatus,
        processed_count: Option<usize>,
    ) -> FleetResult<()> {
        let url = self.url(&format!("/api/batches/{batch_id}/status"));
        let body = BatchStatusUpdate {
            status,
            processed_count,
        };
        let response = self
            .http_client
            .put(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_request_error(HttpOperation::UpdateBatch, e))?;
        ensure_success(HttpOperation::UpdateBatch, response)
            .await
            .map_err(into_persistence)?;
        Ok(())
    }

    async fn append_log(&self, scope: &LogScope, level: LogLevel, message: &str) -> FleetResult<()> {
        let url = self.url("/api/logs");
        let body = LogEntry {
            scope,
            level,
            message,
        };
        let response = self
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_request_error(HttpOperation::AppendLog, e))?;
        ensure_success(HttpOperation::AppendLog, response)
            .await
            .map_err(into_persistence)?;
        Ok(())
    }

    async fn batch_metrics(&self, batch_id: i64) -> FleetResult<Option<BatchMetrics>> {
        let url = self.url(&format!("/api/batches/{batch_id}"));
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| into_persistence(map_request_error(HttpOperation::GetBatch, e)))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = ensure_success(HttpOperation::GetBatch, response)
            .await
            .map_err(into_persistence)?;

        let record: BatchRecord = response
            .json()
            .await
            .map_err(|e| FleetError::Persistence(format!("批次记录解析失败: {e}")))?;
        Ok(Some(record.into_metrics(batch_id)))
    }
}

fn into_persistence(err: FleetError) -> FleetError {
    match err {
        FleetError::Network(message) => FleetError::Persistence(message),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash() {
        let client = RestRegistryClient::new(&RegistryConfig {
            base_url: "http://registry:5000/".to_string(),
            request_timeout_seconds: 5,
        })
        .unwrap();
        assert_eq!(client.base_url(), "http://registry:5000");
        assert_eq!(
            client.url("/api/nodes/active"),
            "http://registry:5000/api/nodes/active"
        );
    }

    #[test]
    fn test_log_entry_is_flat() {
        let scope = LogScope::job(1, 2, 3);
        let entry = LogEntry {
            scope: &scope,
            level: LogLevel::Warning,
            message: "slow node",
        };
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["batch_id"], 1);
        assert_eq!(value["job_id"], 2);
        assert_eq!(value["node_id"], 3);
        assert_eq!(value["level"], "warning");
        assert_eq!(value["message"], "slow node");
    }

    #[test]
    fn test_batch_record_metrics() {
        let record: BatchRecord = serde_json::from_str(
            r#"{"batch_id": 9, "batch_name": "holiday", "status": "completed",
                "total_images": 10, "processed_images": 7}"#,
        )
        .unwrap();
        let metrics = record.into_metrics(9);
        assert_eq!(metrics.total_jobs, 10);
        assert_eq!(metrics.processed_jobs, 7);
        assert_eq!(metrics.failed_jobs, 3);
        assert_eq!(metrics.status, BatchStatus::Completed);
    }

    #[test]
    fn test_batch_status_body() {
        let body = BatchStatusUpdate {
            status: BatchStatus::Processing,
            processed_count: None,
        };
        assert_eq!(
            serde_json::to_string(&body).unwrap(),
            r#"{"status":"processing"}"#
        );
    }
}
