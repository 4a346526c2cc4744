//! rh-controller: RPC server for the ReconHive worker fleet
//!
//! The controller accepts authenticated RPC calls from workers, hands out
//! queued tasks, records results through a [`store::ControllerStore`] and
//! keeps the fleet registry used to tell workers when to resync.

pub mod fleet;
pub mod server;
pub mod service;
pub mod state;
pub mod store;

pub use fleet::WorkerRegistry;
pub use server::RpcServer;
pub use service::{build_method_table, MethodTable, ServiceError};
pub use state::ControllerState;
pub use store::{ControllerStore, MemoryStore};
