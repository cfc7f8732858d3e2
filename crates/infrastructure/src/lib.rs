//! 外部协作方的实现：持久化服务REST客户端、节点HTTP客户端、
//! 内存注册中心以及指标导出。

pub mod error_handling;
pub mod in_memory_registry;
pub mod node_client;
pub mod observability;
pub mod registry_client;

pub use error_handling::*;
pub use in_memory_registry::*;
pub use node_client::*;
pub use observability::*;
pub use registry_client::*;
