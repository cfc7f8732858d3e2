use async_trait::async_trait;

use crate::{
    models::{
        BatchMetrics, BatchStatus, Job, JobExecutionResult, JobResultRecord, LogLevel, LogScope,
        Node, NodeHeartbeat, NodeStatusReport,
    },
    FleetResult,
};

/// 节点注册中心接口
#[async_trait]
pub trait NodeRegistry: Send + Sync {
    /// 获取注册中心中所有活跃节点（未经连通性验证）
    async fn list_active_nodes(&self) -> FleetResult<Vec<Node>>;

    /// 登记节点心跳，未知节点按心跳内容注册
    async fn record_heartbeat(&self, heartbeat: &NodeHeartbeat) -> FleetResult<()>;
}

/// 结果持久化接口
///
/// 写入调用都是尽力而为：调用方只记录失败，不把失败传播为作业或批次失败。
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// 记录作业处理结果
    async fn record_job_result(&self, job_id: i64, record: &JobResultRecord) -> FleetResult<()>;

    /// 标记作业已处理
    async fn mark_job_processed(&self, job_id: i64) -> FleetResult<()>;

    /// 更新批次状态
    async fn update_batch_status(
        &self,
        batch_id: i64,
        status: BatchStatus,
        processed_count: Option<usize>,
    ) -> FleetResult<()>;

    /// 追加执行日志
    async fn append_log(&self, scope: &LogScope, level: LogLevel, message: &str) -> FleetResult<()>;

    /// 查询批次进度，批次不存在时返回 `None`
    async fn batch_metrics(&self, batch_id: i64) -> FleetResult<Option<BatchMetrics>>;
}

/// 节点RPC客户端接口
#[async_trait]
pub trait NodeRpcClient: Send + Sync {
    /// 探活调用，调用方负责施加超时
    async fn probe_status(&self, node: &Node) -> FleetResult<NodeStatusReport>;

    /// 在节点上执行作业，长时间运行，不设超时
    async fn process_job(&self, node: &Node, job: &Job) -> FleetResult<JobExecutionResult>;
}
