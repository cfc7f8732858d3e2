use std::collections::{HashMap, HashSet};
use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use fleet_core::{
    BatchMetrics, BatchStatus, FleetError, FleetResult, JobResultRecord, JobStatus, LogLevel,
    LogScope, Node, NodeHeartbeat, NodeRegistry, NodeStatus, ResultStore,
};

#[derive(Debug, Default)]
struct RegistryState {
    nodes: Vec<Node>,
    results: HashMap<i64, JobResultRecord>,
    processed: HashSet<i64>,
    batches: HashMap<i64, BatchStatus>,
}

/// 内存节点注册中心和结果存储
///
/// 用于 `--nodes-file` 嵌入式运行和演示，不依赖外部持久化服务。
/// 只返回状态为 `active` 的节点。每个作业只保留最后一条结果记录，
/// 执行日志不落盘，直接写入本地 tracing 日志。
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    state: RwLock<RegistryState>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_nodes(nodes: Vec<Node>) -> Self {
        Self {
            state: RwLock::new(RegistryState {
                nodes,
                ..RegistryState::default()
            }),
        }
    }

    /// 从JSON文件加载节点列表
    pub async fn from_json_file(path: impl AsRef<Path>) -> FleetResult<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            FleetError::Configuration(format!("无法读取节点文件 {}: {e}", path.display()))
        })?;
        let nodes: Vec<Node> = serde_json::from_str(&content)?;
        info!("从 {} 加载了 {} 个节点", path.display(), nodes.len());
        Ok(Self::with_nodes(nodes))
    }
}

#[async_trait]
impl NodeRegistry for InMemoryRegistry {
    async fn list_active_nodes(&self) -> FleetResult<Vec<Node>> {
        let state = self.state.read().await;
        Ok(state
            .nodes
            .iter()
            .filter(|n| n.status == NodeStatus::Active)
            .cloned()
            .collect())
    }

    async fn record_heartbeat(&self, heartbeat: &NodeHeartbeat) -> FleetResult<()> {
        let now = Utc::now();
        let mut state = self.state.write().await;
        match state
            .nodes
            .iter_mut()
            .find(|n| n.node_id == heartbeat.node_id)
        {
            Some(node) => node.apply_heartbeat(heartbeat, now),
            None => {
                info!(node_id = heartbeat.node_id, "新节点通过心跳注册");
                state.nodes.push(Node::from_heartbeat(heartbeat, now));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ResultStore for InMemoryRegistry {
    async fn record_job_result(&self, job_id: i64, record: &JobResultRecord) -> FleetResult<()> {
        self.state
            .write()
            .await
            .results
            .insert(job_id, record.clone());
        Ok(())
    }

    async fn mark_job_processed(&self, job_id: i64) -> FleetResult<()> {
        self.state.write().await.processed.insert(job_id);
        Ok(())
    }

    async fn update_batch_status(
        &self,
        batch_id: i64,
        status: BatchStatus,
        _processed_count: Option<usize>,
    ) -> FleetResult<()> {
        debug!(batch_id, "批次状态 -> {}", status);
        self.state.write().await.batches.insert(batch_id, status);
        Ok(())
    }

    async fn append_log(&self, scope: &LogScope, level: LogLevel, message: &str) -> FleetResult<()> {
        let (batch_id, job_id, node_id) = (scope.batch_id, scope.job_id, scope.node_id);
        match level {
            LogLevel::Error | LogLevel::Warning => {
                warn!(?batch_id, ?job_id, ?node_id, "执行日志: {}", message)
            }
            LogLevel::Info | LogLevel::Debug => {
                debug!(?batch_id, ?job_id, ?node_id, "执行日志: {}", message)
            }
        }
        Ok(())
    }

    async fn batch_metrics(&self, batch_id: i64) -> FleetResult<Option<BatchMetrics>> {
        let state = self.state.read().await;
        let Some(status) = state.batches.get(&batch_id).copied() else {
            return Ok(None);
        };

        let mut metrics = BatchMetrics {
            batch_id,
            status,
            total_jobs: 0,
            processed_jobs: 0,
            failed_jobs: 0,
        };
        for (job_id, record) in state.results.iter().filter(|(_, r)| r.batch_id == batch_id) {
            metrics.total_jobs += 1;
            if state.processed.contains(job_id) {
                metrics.processed_jobs += 1;
            }
            if record.status == JobStatus::Failed {
                metrics.failed_jobs += 1;
            }
        }
        Ok(Some(metrics))
    }
}
