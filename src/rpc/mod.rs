// RPC surface: a second TCP listener reusing the peer wire framing.

pub mod client;
pub mod server;

pub use client::RpcClient;
pub use server::RpcServer;
