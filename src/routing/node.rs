//! The routing node: local identity plus a guarded ring.

use crate::ring::{Remote, Ring};
use crate::types::Position;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

/// Callback invoked with a ring snapshot after every effective mutation.
pub type RingChangeListener = Arc<dyn Fn(&Ring) + Send + Sync>;

/// Local identity plus the ring, with circular routing queries.
///
/// Routing queries take the read lock; membership mutations take the write
/// lock. Listeners run with no lock held.
pub struct RoutingNode {
    addr: String,
    redundancy: usize,
    position: RwLock<Position>,
    ring: RwLock<Ring>,
    listeners: RwLock<Vec<RingChangeListener>>,
}

impl RoutingNode {
    /// Create a routing node whose ring initially holds only itself.
    pub fn new(addr: impl Into<String>, position: Position, redundancy: usize) -> Self {
        let addr = addr.into();
        let mut ring = Ring::new();
        ring.add(Remote::new(position, addr.clone()));
        Self {
            addr,
            redundancy,
            position: RwLock::new(position),
            ring: RwLock::new(ring),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// The local RPC address.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// The replication factor R.
    pub fn redundancy(&self) -> usize {
        self.redundancy
    }

    /// The local ring position.
    pub fn position(&self) -> Position {
        *self.position.read()
    }

    /// The local node as a remote.
    pub fn remote(&self) -> Remote {
        Remote::new(self.position(), self.addr.clone())
    }

    /// A snapshot of the current ring.
    pub fn ring(&self) -> Ring {
        self.ring.read().clone()
    }

    /// Register a callback fired after every effective ring mutation.
    pub fn add_change_listener(&self, listener: RingChangeListener) {
        self.listeners.write().push(listener);
    }

    fn notify(&self) {
        let snapshot = self.ring();
        let listeners: Vec<RingChangeListener> = self.listeners.read().clone();
        for listener in &listeners {
            listener(&snapshot);
        }
    }

    /// Insert or move a peer. Listeners fire only when the ring changed.
    pub fn add(&self, remote: Remote) -> bool {
        let changed = self.ring.write().add(remote);
        if changed {
            self.notify();
        }
        changed
    }

    /// Merge a peer learned from gossip.
    ///
    /// Entries bearing the local address are ignored: the local entry is
    /// authoritative, and a peer's stale view must not move us.
    pub fn merge(&self, remote: Remote) -> bool {
        if remote.addr == self.addr {
            return false;
        }
        self.add(remote)
    }

    /// Remove a peer by address. Listeners fire only when the ring changed.
    pub fn remove(&self, addr: &str) -> bool {
        let changed = self.ring.write().remove(addr);
        if changed {
            debug!(peer = addr, "peer removed from ring");
            self.notify();
        }
        changed
    }

    /// Move the local entry to a new position and fire listeners.
    pub fn set_position(&self, position: Position) {
        {
            let mut pos = self.position.write();
            let mut ring = self.ring.write();
            ring.remove(&self.addr);
            ring.add(Remote::new(position, self.addr.clone()));
            *pos = position;
        }
        self.notify();
    }

    /// First peer at a position strictly after the local one, wrapping.
    pub fn successor(&self) -> Remote {
        let pos = self.position();
        let ring = self.ring.read();
        let (_, _, after) = ring.indices(pos);
        ring.nodes()[after].clone()
    }

    /// Last peer at a position strictly before the local one, wrapping.
    pub fn predecessor(&self) -> Remote {
        let pos = self.position();
        let ring = self.ring.read();
        let (before, _, _) = ring.indices(pos);
        ring.nodes()[before].clone()
    }

    /// Primary owner of a key: the first peer at or after it, wrapping.
    pub fn successor_for(&self, key: Position) -> Remote {
        let ring = self.ring.read();
        let (_, at, after) = ring.indices(key);
        ring.nodes()[at.unwrap_or(after)].clone()
    }

    /// The strict successor of a peer in full remote order, wrapping.
    pub fn successor_of(&self, remote: &Remote) -> Remote {
        let ring = self.ring.read();
        let nodes = ring.nodes();
        let i = nodes.partition_point(|n| n <= remote);
        nodes[if i == nodes.len() { 0 } else { i }].clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pos(b: &[u8]) -> Position {
        Position::from_slice(b)
    }

    fn three_node() -> RoutingNode {
        let node = RoutingNode::new("a:1", pos(&[0x00]), 2);
        node.add(Remote::new(pos(&[0x55]), "b:1"));
        node.add(Remote::new(pos(&[0xAA]), "c:1"));
        node
    }

    #[test]
    fn test_successor_predecessor() {
        let node = three_node();
        assert_eq!(node.successor().addr, "b:1");
        assert_eq!(node.predecessor().addr, "c:1");
    }

    #[test]
    fn test_single_node_is_its_own_neighbor() {
        let node = RoutingNode::new("a:1", pos(&[0x40]), 2);
        assert_eq!(node.successor().addr, "a:1");
        assert_eq!(node.predecessor().addr, "a:1");
    }

    #[test]
    fn test_successor_for() {
        let node = three_node();
        assert_eq!(node.successor_for(pos(&[0x40])).addr, "b:1");
        assert_eq!(node.successor_for(pos(&[0x55])).addr, "b:1");
        assert_eq!(node.successor_for(pos(&[0xF0])).addr, "a:1");
    }

    #[test]
    fn test_successor_of_walks_the_ring() {
        let node = three_node();
        let mut current = node.successor(); // b
        current = node.successor_of(&current);
        assert_eq!(current.addr, "c:1");
        current = node.successor_of(&current);
        assert_eq!(current.addr, "a:1");
        current = node.successor_of(&current);
        assert_eq!(current.addr, "b:1");
    }

    #[test]
    fn test_listeners_fire_only_on_change() {
        let node = three_node();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        node.add_change_listener(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        node.add(Remote::new(pos(&[0x55]), "b:1")); // identical, no-op
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        node.add(Remote::new(pos(&[0x60]), "b:1")); // moved
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        node.remove("nope:1");
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        node.remove("b:1");
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_merge_ignores_local_address() {
        let node = three_node();
        assert!(!node.merge(Remote::new(pos(&[0x99]), "a:1")));
        assert_eq!(node.position(), pos(&[0x00]));
    }

    #[test]
    fn test_set_position_moves_ring_entry() {
        let node = three_node();
        node.set_position(pos(&[0x77]));
        assert_eq!(node.position(), pos(&[0x77]));
        assert_eq!(node.successor().addr, "c:1");
        assert_eq!(node.predecessor().addr, "b:1");

        let ring = node.ring();
        assert_eq!(ring.len(), 3);
        assert!(ring.contains_addr("a:1"));
    }
}
