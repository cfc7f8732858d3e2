use std::sync::Arc;
use std::time::Instant;

use futures::future::FutureExt;
use futures::stream::{FuturesUnordered, StreamExt};
use metrics::{counter, histogram};
use tracing::{error, info, info_span, warn, Instrument};

use fleet_core::{
    format_bytes, Assignment, BatchOutcome, BatchStatus, FleetError, FleetResult,
    JobExecutionResult, JobOutcome, JobResultRecord, JobStatus, LogLevel, LogScope,
    NodeRpcClient, ResultStore,
};

use crate::worker_pool::WorkerPool;

/// 作业任务在日志与持久化中使用的标识
#[derive(Debug, Clone)]
struct TaskLabel {
    batch_id: i64,
    job_id: i64,
    node_id: i64,
    job_name: String,
    node_name: String,
}

impl TaskLabel {
    fn new(batch_id: i64, assignment: &Assignment) -> Self {
        Self {
            batch_id,
            job_id: assignment.job.job_id,
            node_id: assignment.node.node_id,
            job_name: assignment.job.name.clone(),
            node_name: assignment.node.name.clone(),
        }
    }

    fn scope(&self) -> LogScope {
        LogScope::job(self.batch_id, self.job_id, self.node_id)
    }
}

/// 记录作业失败：本地错误日志、失败结果记录和执行日志
///
/// 节点返回的部分结果（输出路径、耗时）会保留在失败记录中。
async fn record_failure(
    store: &dyn ResultStore,
    label: &TaskLabel,
    message: &str,
    result: Option<JobExecutionResult>,
) {
    error!(
        job_id = label.job_id,
        node_id = label.node_id,
        "✗ {} 在 {} 上处理失败: {}",
        label.job_name,
        label.node_name,
        message
    );

    let record = match result {
        Some(result) => JobResultRecord {
            batch_id: label.batch_id,
            node_id: label.node_id,
            status: JobStatus::Failed,
            output_path: result.output_path,
            processing_time_ms: result.processing_time_ms,
            output_bytes: result.output_bytes,
            error_message: message.to_string(),
        },
        None => JobResultRecord::failed(label.batch_id, label.node_id, message),
    };
    if let Err(e) = store.record_job_result(label.job_id, &record).await {
        warn!(job_id = label.job_id, "记录作业失败结果失败: {}", e);
    }

    let entry = format!(
        "Failed {} on {}: {}",
        label.job_name, label.node_name, message
    );
    if let Err(e) = store.append_log(&label.scope(), LogLevel::Error, &entry).await {
        warn!(job_id = label.job_id, "写入执行日志失败: {}", e);
    }
}

/// 单个作业的分派任务
///
/// 调用节点执行作业，并尽力持久化结果。任何失败都转换为失败的 [`JobOutcome`]，
/// 不会越过任务边界向外传播。
pub struct JobTask {
    label: TaskLabel,
    assignment: Assignment,
    rpc: Arc<dyn NodeRpcClient>,
    store: Arc<dyn ResultStore>,
}

impl JobTask {
    pub fn new(
        batch_id: i64,
        assignment: Assignment,
        rpc: Arc<dyn NodeRpcClient>,
        store: Arc<dyn ResultStore>,
    ) -> Self {
        Self {
            label: TaskLabel::new(batch_id, &assignment),
            assignment,
            rpc,
            store,
        }
    }

    pub async fn run(self) -> JobOutcome {
        let job = &self.assignment.job;
        let node = &self.assignment.node;
        let scope = self.label.scope();

        info!(
            job_id = job.job_id,
            node_id = node.node_id,
            "分发 {} ({}) 到 {} ({})",
            job.name,
            format_bytes(job.weight),
            node.name,
            node.address()
        );
        self.log(
            &scope,
            LogLevel::Info,
            &format!(
                "Delegating {} ({}) to {}",
                job.name,
                format_bytes(job.weight),
                node.name
            ),
        )
        .await;

        let started = Instant::now();
        let result = self.rpc.process_job(node, job).await;
        histogram!("fleet_job_duration_ms").record(started.elapsed().as_millis() as f64);

        let outcome = match result {
            Ok(result) if result.success => self.on_success(&scope, result).await,
            Ok(result) => {
                let message = if result.error_message.is_empty() {
                    "节点返回失败".to_string()
                } else {
                    result.error_message.clone()
                };
                self.on_failure(message, Some(result)).await
            }
            Err(e) => {
                let err = FleetError::JobDispatch {
                    job_id: job.job_id,
                    message: e.to_string(),
                };
                self.on_failure(err.to_string(), None).await
            }
        };

        let label = if outcome.is_success() { "success" } else { "failure" };
        counter!("fleet_jobs_dispatched_total", "outcome" => label).increment(1);
        outcome
    }

    async fn on_success(&self, scope: &LogScope, result: JobExecutionResult) -> JobOutcome {
        let job = &self.assignment.job;
        let node = &self.assignment.node;

        info!(
            job_id = job.job_id,
            node_id = node.node_id,
            "✓ {} 处理完成，用时 {}ms",
            job.name,
            result.processing_time_ms
        );

        let record = JobResultRecord {
            batch_id: self.label.batch_id,
            node_id: node.node_id,
            status: JobStatus::Success,
            output_path: result.output_path.clone(),
            processing_time_ms: result.processing_time_ms,
            output_bytes: result.output_bytes,
            error_message: String::new(),
        };
        self.persist(
            "记录作业结果",
            self.store.record_job_result(job.job_id, &record).await,
        );
        self.persist(
            "标记作业已处理",
            self.store.mark_job_processed(job.job_id).await,
        );
        self.log(
            scope,
            LogLevel::Info,
            &format!(
                "Completed {} in {}ms on {}",
                job.name, result.processing_time_ms, node.name
            ),
        )
        .await;

        JobOutcome::success(job.job_id, node.node_id, result.processing_time_ms)
    }

    async fn on_failure(&self, message: String, result: Option<JobExecutionResult>) -> JobOutcome {
        record_failure(self.store.as_ref(), &self.label, &message, result).await;
        JobOutcome::failure(self.label.job_id, self.label.node_id, message)
    }

    fn persist(&self, action: &str, result: FleetResult<()>) {
        if let Err(e) = result {
            warn!(
                job_id = self.assignment.job.job_id,
                "{}失败: {}", action, e
            );
        }
    }

    async fn log(&self, scope: &LogScope, level: LogLevel, message: &str) {
        if let Err(e) = self.store.append_log(scope, level, message).await {
            warn!(job_id = self.assignment.job.job_id, "写入执行日志失败: {}", e);
        }
    }
}

/// 批次分派协调器
///
/// 每个分配项在工作池上运行一个 [`JobTask`]，等待全部完成后汇总并更新批次状态。
pub struct DispatchCoordinator {
    pool: WorkerPool,
    rpc: Arc<dyn NodeRpcClient>,
    store: Arc<dyn ResultStore>,
}

impl DispatchCoordinator {
    pub fn new(pool: WorkerPool, rpc: Arc<dyn NodeRpcClient>, store: Arc<dyn ResultStore>) -> Self {
        Self { pool, rpc, store }
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// 运行一个批次，总是返回汇总结果
    pub async fn run_batch(&self, batch_id: i64, assignments: Vec<Assignment>) -> BatchOutcome {
        let span = info_span!("run_batch", batch_id, job_count = assignments.len());
        self.run_batch_inner(batch_id, assignments)
            .instrument(span)
            .await
    }

    async fn run_batch_inner(&self, batch_id: i64, assignments: Vec<Assignment>) -> BatchOutcome {
        let started = Instant::now();
        let total = assignments.len();
        let scope = LogScope::batch(batch_id);

        info!("开始处理批次 {}: {} 个作业", batch_id, total);
        self.update_status(batch_id, BatchStatus::Processing, None)
            .await;
        self.log(
            &scope,
            LogLevel::Info,
            &format!("Started processing batch with {total} jobs"),
        )
        .await;

        let mut outcome = BatchOutcome::new(batch_id, total);
        let mut pending = FuturesUnordered::new();

        for assignment in assignments {
            let label = TaskLabel::new(batch_id, &assignment);
            let task = JobTask::new(
                batch_id,
                assignment,
                Arc::clone(&self.rpc),
                Arc::clone(&self.store),
            );

            match self.pool.submit(task.run().in_current_span()).await {
                Ok(handle) => pending.push(handle.map(move |joined| (label, joined))),
                Err(e) => {
                    let message = format!("无法提交作业: {e}");
                    outcome.record(self.fail_unrun(&label, message).await);
                }
            }
        }

        while let Some((label, joined)) = pending.next().await {
            let job_outcome = match joined {
                Ok(job_outcome) => job_outcome,
                Err(e) => {
                    let err = FleetError::Internal(format!("作业任务异常终止: {e}"));
                    self.fail_unrun(&label, err.to_string()).await
                }
            };
            outcome.record(job_outcome);
        }

        outcome.finalize(started.elapsed().as_millis() as u64);

        self.update_status(batch_id, outcome.status, Some(outcome.succeeded))
            .await;
        let level = if outcome.status == BatchStatus::Failed {
            LogLevel::Error
        } else {
            LogLevel::Info
        };
        self.log(
            &scope,
            level,
            &format!(
                "Batch finished: {} succeeded, {} failed in {}ms",
                outcome.succeeded, outcome.failed, outcome.elapsed_ms
            ),
        )
        .await;

        counter!("fleet_batches_total", "status" => outcome.status.as_str()).increment(1);
        info!(
            "批次 {} 完成: {}/{} 成功, {} 失败, 状态 {}, 用时 {}ms",
            batch_id,
            outcome.succeeded,
            outcome.total,
            outcome.failed,
            outcome.status,
            outcome.elapsed_ms
        );

        outcome
    }

    /// 任务未能提交或异常终止时，由协调器代为记录失败
    async fn fail_unrun(&self, label: &TaskLabel, message: String) -> JobOutcome {
        record_failure(self.store.as_ref(), label, &message, None).await;
        counter!("fleet_jobs_dispatched_total", "outcome" => "failure").increment(1);
        JobOutcome::failure(label.job_id, label.node_id, message)
    }

    async fn update_status(&self, batch_id: i64, status: BatchStatus, processed: Option<usize>) {
        if let Err(e) = self
            .store
            .update_batch_status(batch_id, status, processed)
            .await
        {
            warn!(batch_id, "更新批次状态为 {} 失败: {}", status, e);
        }
    }

    async fn log(&self, scope: &LogScope, level: LogLevel, message: &str) {
        if let Err(e) = self.store.append_log(scope, level, message).await {
            warn!("写入批次日志失败: {}", e);
        }
    }
}
