//! Mock implementations for the collaborator traits
//!
//! In-memory test doubles for the node registry, the node RPC client and the
//! result store. Every mock records the calls it receives so tests can assert
//! on probe counts, dispatched jobs and persisted records.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use fleet_core::{
    BatchMetrics, BatchStatus, FleetError, FleetResult, Job, JobExecutionResult, JobResultRecord,
    JobStatus, LogLevel, LogScope, Node, NodeHeartbeat, NodeRegistry, NodeRpcClient,
    NodeStatusReport, ResultStore,
};

/// Mock implementation of NodeRegistry for testing
#[derive(Debug, Clone, Default)]
pub struct MockNodeRegistry {
    nodes: Arc<Mutex<Vec<Node>>>,
    heartbeats: Arc<Mutex<Vec<NodeHeartbeat>>>,
    unavailable: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
}

impl MockNodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_nodes(nodes: Vec<Node>) -> Self {
        let registry = Self::new();
        registry.set_nodes(nodes);
        registry
    }

    pub fn set_nodes(&self, nodes: Vec<Node>) {
        *self.nodes.lock().unwrap() = nodes;
    }

    /// 模拟注册中心不可达
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn heartbeats(&self) -> Vec<NodeHeartbeat> {
        self.heartbeats.lock().unwrap().clone()
    }
}

#[async_trait]
impl NodeRegistry for MockNodeRegistry {
    async fn list_active_nodes(&self) -> FleetResult<Vec<Node>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(FleetError::RegistryUnavailable(
                "connection refused".to_string(),
            ));
        }
        Ok(self.nodes.lock().unwrap().clone())
    }

    async fn record_heartbeat(&self, heartbeat: &NodeHeartbeat) -> FleetResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(FleetError::RegistryUnavailable(
                "connection refused".to_string(),
            ));
        }
        self.heartbeats.lock().unwrap().push(heartbeat.clone());

        let now = Utc::now();
        let mut nodes = self.nodes.lock().unwrap();
        match nodes.iter_mut().find(|n| n.node_id == heartbeat.node_id) {
            Some(node) => node.apply_heartbeat(heartbeat, now),
            None => nodes.push(Node::from_heartbeat(heartbeat, now)),
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum JobBehaviour {
    /// RPC层错误
    Error(String),
    /// 节点返回 success = false
    Rejected(String),
    Panic,
}

#[derive(Debug, Default)]
struct RpcState {
    unreachable: HashSet<i64>,
    hanging: HashSet<i64>,
    error_status: HashSet<i64>,
    failing_nodes: HashSet<i64>,
    job_behaviour: HashMap<i64, JobBehaviour>,
    probed: Vec<i64>,
    processed: Vec<(i64, i64)>,
}

/// Mock implementation of NodeRpcClient for testing
#[derive(Debug, Clone, Default)]
pub struct MockNodeRpcClient {
    state: Arc<Mutex<RpcState>>,
    job_delay: Arc<Mutex<Option<Duration>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl MockNodeRpcClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 探活返回连接错误
    pub fn set_unreachable(&self, node_id: i64) {
        self.state.lock().unwrap().unreachable.insert(node_id);
    }

    pub fn set_reachable(&self, node_id: i64) {
        self.state.lock().unwrap().unreachable.remove(&node_id);
    }

    /// 探活永不返回，只能由超时结束
    pub fn set_hanging(&self, node_id: i64) {
        self.state.lock().unwrap().hanging.insert(node_id);
    }

    /// 探活返回 status = "error"
    pub fn set_error_status(&self, node_id: i64) {
        self.state.lock().unwrap().error_status.insert(node_id);
    }

    /// 该节点上的所有作业都返回RPC错误
    pub fn fail_jobs_on_node(&self, node_id: i64) {
        self.state.lock().unwrap().failing_nodes.insert(node_id);
    }

    pub fn fail_job(&self, job_id: i64, message: &str) {
        self.state
            .lock()
            .unwrap()
            .job_behaviour
            .insert(job_id, JobBehaviour::Error(message.to_string()));
    }

    pub fn reject_job(&self, job_id: i64, message: &str) {
        self.state
            .lock()
            .unwrap()
            .job_behaviour
            .insert(job_id, JobBehaviour::Rejected(message.to_string()));
    }

    pub fn panic_on_job(&self, job_id: i64) {
        self.state
            .lock()
            .unwrap()
            .job_behaviour
            .insert(job_id, JobBehaviour::Panic);
    }

    pub fn set_job_delay(&self, delay: Duration) {
        *self.job_delay.lock().unwrap() = Some(delay);
    }

    pub fn probe_count(&self) -> usize {
        self.state.lock().unwrap().probed.len()
    }

    pub fn probed_nodes(&self) -> Vec<i64> {
        self.state.lock().unwrap().probed.clone()
    }

    /// 已执行的 (job_id, node_id)，按调用顺序
    pub fn processed_jobs(&self) -> Vec<(i64, i64)> {
        self.state.lock().unwrap().processed.clone()
    }

    /// 同时执行中的作业数峰值
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NodeRpcClient for MockNodeRpcClient {
    async fn probe_status(&self, node: &Node) -> FleetResult<NodeStatusReport> {
        let (hanging, unreachable, error_status) = {
            let mut state = self.state.lock().unwrap();
            state.probed.push(node.node_id);
            (
                state.hanging.contains(&node.node_id),
                state.unreachable.contains(&node.node_id),
                state.error_status.contains(&node.node_id),
            )
        };

        if hanging {
            std::future::pending::<()>().await;
        }
        if unreachable {
            return Err(FleetError::NodeUnreachable {
                node_id: node.node_id,
                message: "connection refused".to_string(),
            });
        }
        if error_status {
            return Ok(NodeStatusReport::healthy("error"));
        }
        Ok(NodeStatusReport {
            status: "active".to_string(),
            cpu_usage: 12.5,
            memory_usage: 40.0,
        })
    }

    async fn process_job(&self, node: &Node, job: &Job) -> FleetResult<JobExecutionResult> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let delay = *self.job_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let (behaviour, node_failing) = {
            let mut state = self.state.lock().unwrap();
            state.processed.push((job.job_id, node.node_id));
            (
                state.job_behaviour.get(&job.job_id).cloned(),
                state.failing_nodes.contains(&node.node_id),
            )
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if node_failing {
            return Err(FleetError::Network(format!(
                "节点 {} 连接中断",
                node.node_id
            )));
        }
        match behaviour {
            Some(JobBehaviour::Error(message)) => Err(FleetError::Network(message)),
            Some(JobBehaviour::Rejected(message)) => Ok(JobExecutionResult::failed(message)),
            Some(JobBehaviour::Panic) => panic!("simulated node client panic"),
            None => Ok(JobExecutionResult::succeeded(
                format!("batch/{}_processed", job.name),
                15,
                job.weight,
            )),
        }
    }
}

#[derive(Debug, Default)]
struct StoreState {
    results: Vec<(i64, JobResultRecord)>,
    processed: Vec<i64>,
    batch_updates: Vec<(i64, BatchStatus, Option<usize>)>,
    logs: Vec<(LogScope, LogLevel, String)>,
}

/// Mock implementation of ResultStore for testing
#[derive(Debug, Clone, Default)]
pub struct MockResultStore {
    state: Arc<Mutex<StoreState>>,
    failing: Arc<AtomicBool>,
}

impl MockResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 所有写入都返回持久化错误
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn results(&self) -> Vec<(i64, JobResultRecord)> {
        self.state.lock().unwrap().results.clone()
    }

    pub fn processed_jobs(&self) -> Vec<i64> {
        self.state.lock().unwrap().processed.clone()
    }

    pub fn batch_updates(&self) -> Vec<(i64, BatchStatus, Option<usize>)> {
        self.state.lock().unwrap().batch_updates.clone()
    }

    pub fn logs(&self) -> Vec<(LogScope, LogLevel, String)> {
        self.state.lock().unwrap().logs.clone()
    }

    pub fn last_batch_status(&self, batch_id: i64) -> Option<(BatchStatus, Option<usize>)> {
        self.state
            .lock()
            .unwrap()
            .batch_updates
            .iter()
            .rev()
            .find(|(id, _, _)| *id == batch_id)
            .map(|(_, status, count)| (*status, *count))
    }

    fn check(&self) -> FleetResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(FleetError::Persistence("database unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ResultStore for MockResultStore {
    async fn record_job_result(&self, job_id: i64, record: &JobResultRecord) -> FleetResult<()> {
        self.check()?;
        self.state
            .lock()
            .unwrap()
            .results
            .push((job_id, record.clone()));
        Ok(())
    }

    async fn mark_job_processed(&self, job_id: i64) -> FleetResult<()> {
        self.check()?;
        self.state.lock().unwrap().processed.push(job_id);
        Ok(())
    }

    async fn update_batch_status(
        &self,
        batch_id: i64,
        status: BatchStatus,
        processed_count: Option<usize>,
    ) -> FleetResult<()> {
        self.check()?;
        self.state
            .lock()
            .unwrap()
            .batch_updates
            .push((batch_id, status, processed_count));
        Ok(())
    }

    async fn append_log(&self, scope: &LogScope, level: LogLevel, message: &str) -> FleetResult<()> {
        self.check()?;
        self.state
            .lock()
            .unwrap()
            .logs
            .push((scope.clone(), level, message.to_string()));
        Ok(())
    }

    async fn batch_metrics(&self, batch_id: i64) -> FleetResult<Option<BatchMetrics>> {
        self.check()?;
        let state = self.state.lock().unwrap();
        let Some(status) = state
            .batch_updates
            .iter()
            .rev()
            .find(|(id, _, _)| *id == batch_id)
            .map(|(_, status, _)| *status)
        else {
            return Ok(None);
        };

        let records: Vec<&(i64, JobResultRecord)> = state
            .results
            .iter()
            .filter(|(_, r)| r.batch_id == batch_id)
            .collect();
        Ok(Some(BatchMetrics {
            batch_id,
            status,
            total_jobs: records.len(),
            processed_jobs: records
                .iter()
                .filter(|(job_id, _)| state.processed.contains(job_id))
                .count(),
            failed_jobs: records
                .iter()
                .filter(|(_, r)| r.status == JobStatus::Failed)
                .count(),
        }))
    }
}
