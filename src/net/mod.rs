//! Peer-to-peer networking: message types, TCP server and transport.

mod client;
mod remote_tree;
pub mod rpc;
mod server;

pub use client::{TcpTransport, Transport, TransportConfig};
pub use remote_tree::RemoteTree;
pub use server::{RequestHandler, RpcServer};
