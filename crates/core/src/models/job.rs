use serde::{Deserialize, Serialize};

use super::node::Node;

/// 单个变换描述，对调度器不透明
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransformSpec {
    pub name: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

/// 一个待处理的作业
///
/// 提交给调度器后不再修改。`weight` 通常为负载字节数，缺省为0。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub job_id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub weight: u64,
    #[serde(default)]
    pub transforms: Vec<TransformSpec>,
}

impl Job {
    pub fn new(job_id: i64, weight: u64) -> Self {
        Self {
            job_id,
            name: format!("job-{job_id}"),
            payload: serde_json::Value::Null,
            weight,
            transforms: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_transform(mut self, name: impl Into<String>, parameters: serde_json::Value) -> Self {
        self.transforms.push(TransformSpec {
            name: name.into(),
            parameters,
        });
        self
    }

    /// 截断超出上限的变换，返回被丢弃的数量
    pub fn cap_transforms(&mut self, max: usize) -> usize {
        if self.transforms.len() <= max {
            return 0;
        }
        let dropped = self.transforms.len() - max;
        self.transforms.truncate(max);
        dropped
    }
}

/// 调度结果中的一条分配：作业绑定到节点
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Assignment {
    pub job: Job,
    pub node: Node,
}

impl Assignment {
    pub fn new(job: Job, node: Node) -> Self {
        Self { job, node }
    }
}

/// 节点执行作业后返回的结果
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JobExecutionResult {
    pub success: bool,
    #[serde(default)]
    pub output_path: String,
    #[serde(default)]
    pub error_message: String,
    #[serde(default)]
    pub processing_time_ms: u64,
    #[serde(default)]
    pub output_bytes: u64,
}

impl JobExecutionResult {
    pub fn succeeded(output_path: impl Into<String>, processing_time_ms: u64, output_bytes: u64) -> Self {
        Self {
            success: true,
            output_path: output_path.into(),
            error_message: String::new(),
            processing_time_ms,
            output_bytes,
        }
    }

    pub fn failed(error_message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_message: error_message.into(),
            ..Self::default()
        }
    }
}
