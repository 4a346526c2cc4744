//! Worker fleet bookkeeping and the resync signal

mod registry;
mod watcher;

pub use registry::{WorkerRegistry, WorkerStatus};
pub use watcher::{run_sync_watcher, watch_sync_dir};
