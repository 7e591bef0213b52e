//! Membership and routing: the node's guarded view of the ring.

mod node;

pub use node::{RingChangeListener, RoutingNode};
