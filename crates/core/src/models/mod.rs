//! # 数据模型
//!
//! 调度核心使用的强类型数据结构。
//!
//! - [`Node`] - 工作节点注册信息（注册中心的只读缓存副本）
//! - [`NodeHeartbeat`] - 节点上报的心跳
//! - [`Job`] - 一个带权重的待处理作业
//! - [`Assignment`] - 作业与节点的绑定
//! - [`DistributionPlan`] - 一次加权分配的结果与每个节点的份额
//! - [`BatchOutcome`] - 批次的成功/失败计数与逐作业状态
//! - [`BatchMetrics`] - 持久化侧记录的批次进度
//!
//! 所有模型都实现了 `serde` 序列化，字段名与持久化服务的REST接口保持一致。
//! 缺省值：节点 `weight = 1`、`max_concurrent_jobs = 5`、`current_load = 0`；
//! 作业 `weight = 0`。

pub mod batch;
pub mod job;
pub mod node;
pub mod plan;

pub use batch::*;
pub use job::*;
pub use node::*;
pub use plan::*;
