//! rh-worker: ReconHive scan worker
//!
//! A worker pulls tasks from the controller, runs one scan phase per task
//! against its registered engines, submits the merged results and queues the
//! follow-on tasks for the next phase.

pub mod engine;
pub mod logging;
pub mod reconnect;
pub mod rpc;
pub mod scan;
pub mod settings;
pub mod sync;
pub mod task;

pub use engine::EngineSet;
pub use reconnect::ExponentialBackoff;
pub use rpc::{ControllerApi, RpcClient};
pub use scan::{Dispatcher, PhaseOutcome, ScanOrchestrator};
pub use settings::{FileSettings, SettingsSource, StaticSettings};
pub use task::{TaskReport, TaskRunner};
