//! rh-core: Shared abstractions for ReconHive
//!
//! This crate provides the task model, result containers, RPC method
//! catalogue and configuration structures used by both the controller and
//! the worker fleet.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod result;
pub mod task;
pub mod time;
pub mod types;

pub use error::{ConfigError, RhError, RpcError, TaskError};
pub use task::{ScanConfig, TaskDescriptor, TaskType};
pub use types::{PerformanceMode, ScanPhase, TaskId, WorkerId};
