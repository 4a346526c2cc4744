//! Controller RPC access

mod api;
mod client;
pub mod tls;

pub use api::ControllerApi;
pub use client::RpcClient;
