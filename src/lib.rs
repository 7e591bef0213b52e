//! Self-balancing replicated key-value store over a consistent-hash ring.
//!
//! This crate provides a peer-to-peer key-value store where:
//! - **Routing** follows a consistent-hash ring of peers, each owning the
//!   arc between its predecessor and itself
//! - **Replication** forwards each key to the R-1 successors of its
//!   primary owner
//! - **Anti-entropy** reconciles Merkle radix trees between neighbors and
//!   cleans up keys a node no longer owns
//! - **Self-balancing** lets an overloaded node drift its ring position
//!   toward its successor until owned-key counts even out
//!
//! # Example
//!
//! ```rust,no_run
//! use gyre::{StoreConfig, StoreNode};
//! use gyre::digest;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = StoreConfig::new("127.0.0.1:9000").with_redundancy(3);
//!     let node = StoreNode::new(config);
//!     node.start().await?;
//!
//!     // join an existing cluster through any live peer
//!     node.join("127.0.0.1:9001").await?;
//!
//!     // local data operations; replication and rebalancing run behind
//!     // the scenes
//!     let key = digest::sum(b"user:123");
//!     node.put(key, b"Alice".to_vec());
//!     if let Some(values) = node.get(key) {
//!         println!("found: {:?}", values);
//!     }
//!
//!     node.stop();
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                 StoreNode                   │
//! │  put/get/remove · owned() · listeners       │
//! └─────────────────────────────────────────────┘
//!           │               │              │
//!           ▼               ▼              ▼
//!    ┌────────────┐  ┌────────────┐  ┌──────────┐
//!    │  Routing   │  │   Merkle   │  │ Periodic │
//!    │   (ring)   │  │ radix tree │  │ workers  │
//!    └────────────┘  └────────────┘  └──────────┘
//!           │               │              │
//!           └───────────────┴──────────────┘
//!                           │
//!                  ┌─────────────────┐
//!                  │  TCP transport  │
//!                  └─────────────────┘
//! ```
//!
//! # Consistency model
//!
//! Writes land on one node and spread to the other owners within a few
//! sync ticks; the store is eventually consistent. Conflicting writes
//! resolve by writer timestamp from the network-conformed clock. Data
//! survives as long as fewer than R replicas are lost at once.

pub mod clock;
pub mod config;
pub mod digest;
pub mod error;
pub mod net;
pub mod ring;
pub mod routing;
pub mod setop;
pub mod store;
pub mod testing;
pub mod tree;
pub mod types;

// Re-export main types for convenience
pub use config::StoreConfig;
pub use error::{Error, NetworkError, Result};
pub use store::{CleanListener, MigrateListener, StoreNode, SyncListener};
pub use types::Position;

// Re-export ring and routing types
pub use ring::{Remote, Ring};
pub use routing::{RingChangeListener, RoutingNode};

// Re-export tree types
pub use tree::{Entry, SharedTree, SubtreeDigest, SyncOutcome, SyncTree, TreeSync};

// Re-export network types
pub use net::{RemoteTree, TcpTransport, Transport, TransportConfig};

// Re-export clock and set-operation types
pub use clock::NetworkClock;
pub use setop::{SetExpression, SetOp, SetOpMerge, SetOpResult, SetOpSource, SetOpType};
