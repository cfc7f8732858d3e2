//! 分派服务核心组件
//!
//! 节点健康缓存、按权重的批次划分、加权最少连接节点选择，
//! 以及在有界工作池上执行批次的分派协调器。

pub mod balancer;
pub mod coordinator;
pub mod health_cache;
pub mod service;
pub mod strategies;
pub mod worker_pool;


pub use balancer::{partition_by_weight, Bin, WeightedScheduler};
pub use coordinator::{DispatchCoordinator, JobTask};
pub use health_cache::{dedup_by_address, NodeHealthCache};
pub use service::FleetDispatcher;
pub use strategies::*;
pub use worker_pool::WorkerPool;
