pub mod config;
pub mod errors;
pub mod models;
pub mod traits;
pub mod utils;

pub use self::config::*;
pub use errors::*;
pub use models::*;
pub use traits::{NodeRegistry, NodeRpcClient, ResultStore};
pub use utils::format_bytes;
