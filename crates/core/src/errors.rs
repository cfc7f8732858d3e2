use thiserror::Error;

/// 调度系统错误类型定义
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("节点注册中心不可用: {0}")]
    RegistryUnavailable(String),

    #[error("节点不可达: {node_id} - {message}")]
    NodeUnreachable { node_id: i64, message: String },

    #[error("没有可用的节点")]
    NoNodesAvailable,

    #[error("作业分派失败: {job_id} - {message}")]
    JobDispatch { job_id: i64, message: String },

    #[error("节点未找到: {id}")]
    NodeNotFound { id: i64 },

    #[error("批次未找到: {id}")]
    BatchNotFound { id: i64 },

    #[error("持久化错误: {0}")]
    Persistence(String),

    #[error("网络错误: {0}")]
    Network(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("工作池已关闭")]
    PoolClosed,

    #[error("无效的作业: {0}")]
    InvalidJob(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for FleetError {
    fn from(err: serde_json::Error) -> Self {
        FleetError::Serialization(err.to_string())
    }
}

/// 统一的Result类型
pub type FleetResult<T> = std::result::Result<T, FleetError>;
