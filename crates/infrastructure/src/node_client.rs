use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use fleet_core::{
    FleetError, FleetResult, Job, JobExecutionResult, Node, NodeRpcClient, NodeStatusReport,
    TransformSpec,
};

use crate::error_handling::{ensure_success, map_request_error, HttpOperation};

#[derive(Debug, Serialize)]
struct ProcessJobRequest<'a> {
    job_id: i64,
    name: &'a str,
    payload: &'a serde_json::Value,
    transforms: &'a [TransformSpec],
}

/// 节点RPC的HTTP实现
///
/// 探活请求带单独的超时，作业请求不设超时。
#[derive(Debug, Clone)]
pub struct HttpNodeClient {
    http_client: reqwest::Client,
    probe_timeout: Duration,
}

impl HttpNodeClient {
    pub fn new(probe_timeout: Duration) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            probe_timeout,
        }
    }

    fn status_url(node: &Node) -> String {
        format!("http://{}/status/{}", node.address(), node.node_id)
    }

    fn jobs_url(node: &Node) -> String {
        format!("http://{}/jobs", node.address())
    }
}

#[async_trait]
impl NodeRpcClient for HttpNodeClient {
    async fn probe_status(&self, node: &Node) -> FleetResult<NodeStatusReport> {
        let unreachable = |message: String| FleetError::NodeUnreachable {
            node_id: node.node_id,
            message,
        };

        let response = self
            .http_client
            .get(Self::status_url(node))
            .timeout(self.probe_timeout)
            .send()
            .await
            .map_err(|e| unreachable(map_request_error(HttpOperation::ProbeStatus, e).to_string()))?;
        let response = ensure_success(HttpOperation::ProbeStatus, response)
            .await
            .map_err(|e| unreachable(e.to_string()))?;

        let report: NodeStatusReport = response
            .json()
            .await
            .map_err(|e| unreachable(format!("状态解析失败: {e}")))?;

        debug!(
            node_id = node.node_id,
            "节点 {} 状态: {} (CPU {:.1}%, 内存 {:.1}%)",
            node.name,
            report.status,
            report.cpu_usage,
            report.memory_usage
        );
        Ok(report)
    }

    async fn process_job(&self, node: &Node, job: &Job) -> FleetResult<JobExecutionResult> {
        let request = ProcessJobRequest {
            job_id: job.job_id,
            name: &job.name,
            payload: &job.payload,
            transforms: &job.transforms,
        };

        let response = self
            .http_client
            .post(Self::jobs_url(node))
            .json(&request)
            .send()
            .await
            .map_err(|e| map_request_error(HttpOperation::ProcessJob, e))?;
        let response = ensure_success(HttpOperation::ProcessJob, response).await?;

        response
            .json::<JobExecutionResult>()
            .await
            .map_err(|e| map_request_error(HttpOperation::ProcessJob, e))
    }
}
