//! # Fleet Testing Utils
//!
//! Shared testing utilities for the fleet workspace: in-memory mocks of the
//! collaborator traits, node/job builders and small async helpers.
//!
//! ```toml
//! [dev-dependencies]
//! fleet-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
