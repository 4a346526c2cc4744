//! RPC server implementation

mod handler;
mod listener;
mod tls;

pub use handler::{handle_connection, process_frame};
pub use listener::{RpcServer, ServerError};
pub use tls::{load_acceptor, TlsError};
