// Peer-to-peer wire protocol: framing, the outbound client, and the
// inbound server.

pub mod client;
pub mod protocol;
pub mod server;

pub use client::PeerClient;
