use serde::{Deserialize, Serialize};

/// 批次状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl BatchStatus {
    /// 根据成功数计算最终状态：只有全部失败时才标记为失败
    pub fn from_counts(total: usize, succeeded: usize) -> Self {
        if total > 0 && succeeded == 0 {
            BatchStatus::Failed
        } else {
            BatchStatus::Completed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Pending => "pending",
            BatchStatus::Processing => "processing",
            BatchStatus::Completed => "completed",
            BatchStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个作业的最终状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Success,
    Failed,
}

/// 单个作业的分派结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobOutcome {
    pub job_id: i64,
    pub node_id: i64,
    pub status: JobStatus,
    pub error_message: Option<String>,
    pub processing_time_ms: u64,
}

impl JobOutcome {
    pub fn success(job_id: i64, node_id: i64, processing_time_ms: u64) -> Self {
        Self {
            job_id,
            node_id,
            status: JobStatus::Success,
            error_message: None,
            processing_time_ms,
        }
    }

    pub fn failure(job_id: i64, node_id: i64, error_message: impl Into<String>) -> Self {
        Self {
            job_id,
            node_id,
            status: JobStatus::Failed,
            error_message: Some(error_message.into()),
            processing_time_ms: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Success
    }
}

/// 批次汇总结果
///
/// 随作业完成增量累计，全部作业结束后由 [`BatchOutcome::finalize`] 定稿。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchOutcome {
    pub batch_id: i64,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub status: BatchStatus,
    pub jobs: Vec<JobOutcome>,
    pub elapsed_ms: u64,
}

impl BatchOutcome {
    pub fn new(batch_id: i64, total: usize) -> Self {
        Self {
            batch_id,
            total,
            succeeded: 0,
            failed: 0,
            status: BatchStatus::Processing,
            jobs: Vec::with_capacity(total),
            elapsed_ms: 0,
        }
    }

    pub fn record(&mut self, outcome: JobOutcome) {
        if outcome.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.jobs.push(outcome);
    }

    pub fn finalize(&mut self, elapsed_ms: u64) {
        self.status = BatchStatus::from_counts(self.total, self.succeeded);
        self.elapsed_ms = elapsed_ms;
    }

    pub fn outcome_for(&self, job_id: i64) -> Option<&JobOutcome> {
        self.jobs.iter().find(|j| j.job_id == job_id)
    }
}

/// 写入持久化服务的作业结果记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobResultRecord {
    pub batch_id: i64,
    pub node_id: i64,
    pub status: JobStatus,
    pub output_path: String,
    pub processing_time_ms: u64,
    pub output_bytes: u64,
    pub error_message: String,
}

impl JobResultRecord {
    /// 没有节点执行结果时的失败记录
    pub fn failed(batch_id: i64, node_id: i64, error_message: impl Into<String>) -> Self {
        Self {
            batch_id,
            node_id,
            status: JobStatus::Failed,
            output_path: String::new(),
            processing_time_ms: 0,
            output_bytes: 0,
            error_message: error_message.into(),
        }
    }
}

/// 批次进度统计
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchMetrics {
    pub batch_id: i64,
    pub status: BatchStatus,
    pub total_jobs: usize,
    pub processed_jobs: usize,
    pub failed_jobs: usize,
}

/// 执行日志级别
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

/// 执行日志关联的范围
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LogScope {
    pub batch_id: Option<i64>,
    pub job_id: Option<i64>,
    pub node_id: Option<i64>,
}

impl LogScope {
    pub fn batch(batch_id: i64) -> Self {
        Self {
            batch_id: Some(batch_id),
            ..Self::default()
        }
    }

    pub fn job(batch_id: i64, job_id: i64, node_id: i64) -> Self {
        Self {
            batch_id: Some(batch_id),
            job_id: Some(job_id),
            node_id: Some(node_id),
        }
    }
}
