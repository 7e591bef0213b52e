//! Testing utilities for the store.
//!
//! Provides a cluster harness that starts real nodes on loopback ports and
//! deadline-polling helpers, plus the end-to-end cluster scenarios that
//! exercise replication, cleanup, migration and failure recovery.

mod harness;


pub use harness::{free_addr, wait_until, TestCluster};
