//! The store node: lifecycle, ownership, periodic drivers and RPC dispatch.
//!
//! A node wraps the routing layer, the local Merkle tree and the network
//! clock, and runs the periodic workers that keep the cluster converging:
//! replication sync with the successors, cleanup of disowned keys, load
//! migration, ring gossip and clock sampling.

use crate::clock::NetworkClock;
use crate::config::StoreConfig;
use crate::digest;
use crate::error::{Error, NetworkError, Result};
use crate::net::rpc::{Request, Response};
use crate::net::{RemoteTree, RequestHandler, RpcServer, TcpTransport, Transport};
use crate::ring::{Remote, Ring};
use crate::routing::RoutingNode;
use crate::tree::{Entry, SharedTree, TreeSync};
use crate::types::Position;
use parking_lot::RwLock;
use rand::Rng;
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Listener invoked after a sync pass that moved data, with the keys
/// fetched from and distributed to the successors.
pub type SyncListener = Arc<dyn Fn(&StoreNode, usize, usize) + Send + Sync>;

/// Listener invoked after a clean pass that moved data, with the keys
/// cleaned away locally and redistributed to their owners.
pub type CleanListener = Arc<dyn Fn(&StoreNode, usize, usize) + Send + Sync>;

/// Listener invoked after the node moved its ring position.
pub type MigrateListener = Arc<dyn Fn(&StoreNode, Position, Position) + Send + Sync>;

const CREATED: u8 = 0;
const STARTED: u8 = 1;
const STOPPED: u8 = 2;

/// Fewer owned keys than this never triggers a migration.
const MIGRATE_FLOOR: usize = 10;

/// A peer node in the self-balancing key-value ring.
pub struct StoreNode {
    config: StoreConfig,
    state: AtomicU8,
    last_sync: AtomicI64,
    last_reroute: Arc<AtomicI64>,
    last_migrate: AtomicI64,
    sync_listeners: RwLock<Vec<SyncListener>>,
    clean_listeners: RwLock<Vec<CleanListener>>,
    migrate_listeners: RwLock<Vec<MigrateListener>>,
    routing: Arc<RoutingNode>,
    clock: Arc<NetworkClock>,
    tree: SharedTree,
    transport: Arc<dyn Transport>,
    cancel: CancellationToken,
}

impl StoreNode {
    /// Create a node with the default TCP transport.
    pub fn new(config: StoreConfig) -> Arc<Self> {
        Self::with_transport(config, Arc::new(TcpTransport::new()))
    }

    /// Create a node speaking through the given transport.
    pub fn with_transport(config: StoreConfig, transport: Arc<dyn Transport>) -> Arc<Self> {
        let position = config
            .position
            .unwrap_or_else(|| digest::sum(config.addr.as_bytes()));
        let routing = Arc::new(RoutingNode::new(
            config.addr.clone(),
            position,
            config.redundancy,
        ));
        let clock = Arc::new(NetworkClock::new());
        let last_reroute = Arc::new(AtomicI64::new(0));

        // every effective ring change counts against migration quiescence
        {
            let last_reroute = last_reroute.clone();
            let clock = clock.clone();
            routing.add_change_listener(Arc::new(move |_| {
                last_reroute.store(clock.monotonic_ns(), Ordering::Relaxed);
            }));
        }

        Arc::new(Self {
            config,
            state: AtomicU8::new(CREATED),
            last_sync: AtomicI64::new(0),
            last_reroute,
            last_migrate: AtomicI64::new(0),
            sync_listeners: RwLock::new(Vec::new()),
            clean_listeners: RwLock::new(Vec::new()),
            migrate_listeners: RwLock::new(Vec::new()),
            routing,
            clock,
            tree: SharedTree::new(),
            transport,
            cancel: CancellationToken::new(),
        })
    }

    /// The node's advertise address.
    pub fn addr(&self) -> &str {
        self.routing.addr()
    }

    /// The node's current ring position.
    pub fn position(&self) -> Position {
        self.routing.position()
    }

    /// The routing layer.
    pub fn routing(&self) -> &RoutingNode {
        &self.routing
    }

    /// The local tree.
    pub fn tree(&self) -> &SharedTree {
        &self.tree
    }

    /// Network-adjusted time in nanoseconds since the Unix epoch.
    pub fn time(&self) -> i64 {
        self.clock.now()
    }

    fn has_state(&self, state: u8) -> bool {
        self.state.load(Ordering::SeqCst) == state
    }

    fn change_state(&self, from: u8, to: u8) -> bool {
        self.state
            .compare_exchange(from, to, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Bind the RPC server and launch the periodic workers.
    ///
    /// Fails on a configuration the workers cannot run with, and unless
    /// the node is freshly created; at most one caller wins.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        self.config.validate()?;
        if !self.change_state(CREATED, STARTED) {
            return Err(Error::State(format!(
                "node {} can only be started when in state created",
                self.config.addr
            )));
        }

        let handler: Arc<dyn RequestHandler> = self.clone();
        let server = RpcServer::bind(&self.config.addr, handler, self.cancel.clone()).await?;
        tokio::spawn(server.run());

        self.spawn_workers();
        info!(addr = %self.config.addr, position = %self.position(), "node started");
        Ok(())
    }

    /// Stop the node. Idempotent; periodic workers observe the transition
    /// at their next iteration boundary.
    pub fn stop(&self) {
        if self.change_state(STARTED, STOPPED) {
            self.cancel.cancel();
            info!(addr = %self.config.addr, "node stopped");
        }
    }

    fn spawn_workers(self: &Arc<Self>) {
        let interval = self.config.sync_interval;

        let node = self.clone();
        tokio::spawn(async move {
            while node.has_state(STARTED) {
                node.sync_once().await;
                if !node.sleep_tick(interval).await {
                    break;
                }
            }
        });

        let node = self.clone();
        tokio::spawn(async move {
            while node.has_state(STARTED) {
                node.clean_once().await;
                if !node.sleep_tick(interval).await {
                    break;
                }
            }
        });

        let node = self.clone();
        tokio::spawn(async move {
            while node.has_state(STARTED) {
                node.migrate_once().await;
                if !node.sleep_tick(interval).await {
                    break;
                }
            }
        });

        let node = self.clone();
        tokio::spawn(async move {
            while node.has_state(STARTED) {
                node.gossip_once().await;
                if !node.sleep_tick(interval).await {
                    break;
                }
            }
        });

        let node = self.clone();
        let clock_interval = self.config.clock_interval;
        tokio::spawn(async move {
            while node.has_state(STARTED) {
                if !node.sleep_tick(clock_interval).await {
                    break;
                }
                node.clock_once().await;
            }
        });
    }

    async fn sleep_tick(&self, interval: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(interval) => self.has_state(STARTED),
        }
    }

    /// Join the cluster through a seed peer: adopt a position in its ring's
    /// largest free slot (unless pinned), merge its ring, conform the clock
    /// and announce ourselves. Joining a peer we already know is a no-op.
    pub async fn join(&self, seed: &str) -> Result<()> {
        if seed == self.config.addr || self.routing.ring().contains_addr(seed) {
            return Ok(());
        }

        let seed_nodes = match self.transport.call(seed, Request::Ring).await? {
            Response::Ring(nodes) => nodes,
            other => return Err(unexpected(other)),
        };

        if self.config.position.is_none() && !seed_nodes.is_empty() {
            let mut seed_ring = Ring::new();
            for remote in &seed_nodes {
                seed_ring.add(remote.clone());
            }
            self.change_position(seed_ring.get_slot());
        }

        for remote in seed_nodes {
            self.routing.merge(remote);
        }

        match self.transport.call(seed, Request::Time).await? {
            Response::Time(sample) => self.clock.conform(sample),
            other => return Err(unexpected(other)),
        }

        match self
            .transport
            .call(seed, Request::Add(self.routing.remote()))
            .await?
        {
            Response::Added => {
                info!(addr = %self.config.addr, seed, "joined cluster");
                Ok(())
            }
            other => Err(unexpected(other)),
        }
    }

    /// Register a sync listener.
    pub fn add_sync_listener(&self, listener: SyncListener) {
        self.sync_listeners.write().push(listener);
    }

    /// Register a clean listener.
    pub fn add_clean_listener(&self, listener: CleanListener) {
        self.clean_listeners.write().push(listener);
    }

    /// Register a migrate listener.
    pub fn add_migrate_listener(&self, listener: MigrateListener) {
        self.migrate_listeners.write().push(listener);
    }

    /// Register a ring change listener.
    pub fn add_change_listener(&self, listener: crate::routing::RingChangeListener) {
        self.routing.add_change_listener(listener);
    }

    /// Store a value at a key, stamped with the network clock.
    pub fn put(&self, key: Position, value: Vec<u8>) {
        self.tree.put(key, Entry::new(value, self.clock.now()));
    }

    /// The value list at a key, if present locally.
    pub fn get(&self, key: Position) -> Option<Vec<Vec<u8>>> {
        self.tree.get(key).map(|entry| entry.values)
    }

    /// Remove a key locally.
    pub fn remove(&self, key: Position) {
        self.tree.remove(key);
    }

    /// Number of locally stored keys in the arc this node owns.
    pub fn owned(&self) -> usize {
        let pred = self.routing.predecessor();
        let me = self.routing.remote();
        if pred.pos < me.pos {
            self.tree
                .real_size_between(Some(pred.pos), Some(me.pos), true, false)
        } else if pred.pos > me.pos {
            self.tree.real_size_between(Some(pred.pos), None, true, false)
                + self.tree.real_size_between(None, Some(me.pos), true, false)
        } else if pred < me {
            // another node holds the same position and sorts first
            0
        } else {
            // sole node: everything is ours
            self.tree.real_size()
        }
    }

    /// The R owners of a key, primary first, and whether this node is among
    /// them. Successors repeat when the ring is smaller than R; the clean
    /// driver's destroy placement depends on the repetition.
    fn owners(&self, key: Position) -> (Vec<Remote>, bool) {
        let redundancy = self.routing.redundancy();
        let mut owners = Vec::with_capacity(redundancy);
        let mut is_owner = false;

        let primary = self.routing.successor_for(key);
        is_owner |= primary.addr == self.routing.addr();
        owners.push(primary);

        for i in 1..redundancy {
            let next = self.routing.successor_of(&owners[i - 1]);
            is_owner |= next.addr == self.routing.addr();
            owners.push(next);
        }
        (owners, is_owner)
    }

    /// The first stored key strictly after `pos`, wrapping to the smallest
    /// stored key.
    fn circular_next(&self, pos: Position) -> Option<Position> {
        self.tree.next_marker(pos).or_else(|| self.tree.first())
    }

    /// One replication pass: push our owned arc to each of the R-1
    /// successors and pull the same arc back from them.
    async fn sync_once(&self) {
        let mut fetched = 0;
        let mut distributed = 0;
        let mut next = self.routing.successor();

        for _ in 0..self.routing.redundancy().saturating_sub(1) {
            if next.addr == self.routing.addr() {
                break; // wrapped around: no further successors
            }

            let my_pos = self.routing.position();
            let pred = self.routing.predecessor();
            let remote = RemoteTree::new(next.addr.clone(), self.transport.clone());

            let push = TreeSync::new(&self.tree, &remote)
                .from_exclusive(pred.pos)
                .to(my_pos)
                .run()
                .await;
            let push = match push {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(peer = %next.addr, error = %e, "push sync failed, removing peer");
                    self.routing.remove(&next.addr);
                    break;
                }
            };

            let pull = TreeSync::new(&remote, &self.tree)
                .from_exclusive(pred.pos)
                .to(my_pos)
                .run()
                .await;
            let pull = match pull {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(peer = %next.addr, error = %e, "pull sync failed, removing peer");
                    self.routing.remove(&next.addr);
                    break;
                }
            };

            distributed += push.put_count;
            fetched += pull.put_count;
            next = self.routing.successor_of(&next);
        }

        if fetched != 0 || distributed != 0 {
            self.last_sync
                .store(self.clock.monotonic_ns(), Ordering::Relaxed);
            debug!(fetched, distributed, "sync pass moved data");
            let listeners = self.sync_listeners.read().clone();
            for listener in &listeners {
                listener(self, fetched, distributed);
            }
        }
    }

    /// One cleanup pass: find the first key past our position; if we are
    /// not among its owners, hand the disowned arc to each owner in turn,
    /// destroying our copies on the second-to-last of them (by then every
    /// owner but one has the data, and that one receives it from us last).
    async fn clean_once(&self) {
        let Some(next_key) = self.circular_next(self.routing.position()) else {
            return;
        };
        let (owners, is_owner) = self.owners(next_key);
        if is_owner {
            return;
        }

        let mut cleaned = 0;
        let mut redistributed = 0;
        let primary_pos = owners[0].pos;
        let destroy_index = owners.len().checked_sub(2);

        for (index, owner) in owners.iter().enumerate() {
            let remote = RemoteTree::new(owner.addr.clone(), self.transport.clone());
            let mut sync = TreeSync::new(&self.tree, &remote)
                .from_inclusive(next_key)
                .to(primary_pos);
            if Some(index) == destroy_index {
                sync = sync.destroy();
            }
            match sync.run().await {
                Ok(outcome) => {
                    cleaned += outcome.del_count;
                    redistributed += outcome.put_count;
                }
                Err(e) => {
                    warn!(peer = %owner.addr, error = %e, "clean sync failed, removing peer");
                    self.routing.remove(&owner.addr);
                    break;
                }
            }
        }

        if cleaned != 0 || redistributed != 0 {
            debug!(cleaned, redistributed, "clean pass moved data");
            let listeners = self.clean_listeners.read().clone();
            for listener in &listeners {
                listener(self, cleaned, redistributed);
            }
        }
    }

    /// One migration check. At most one position change per pass, and only
    /// when the ring has been quiet, the successor answered its size probe,
    /// and the imbalance clears the hysteresis gate.
    async fn migrate_once(&self) {
        let wait =
            self.config.sync_interval.as_nanos() as i64 * self.config.migrate_wait_factor as i64;
        let last_change = self
            .last_sync
            .load(Ordering::Relaxed)
            .max(self.last_reroute.load(Ordering::Relaxed))
            .max(self.last_migrate.load(Ordering::Relaxed));
        if self.clock.monotonic_ns() - last_change < wait {
            return;
        }

        let succ = self.routing.successor();
        if succ.addr == self.routing.addr() {
            return; // sole node
        }

        let succ_size = match self.transport.call(&succ.addr, Request::Owned).await {
            Ok(Response::Owned(n)) => n as usize,
            Ok(other) => {
                warn!(peer = %succ.addr, response = ?other, "unexpected owned response");
                return;
            }
            Err(e) => {
                warn!(peer = %succ.addr, error = %e, "owned probe failed, removing peer");
                self.routing.remove(&succ.addr);
                return;
            }
        };

        let my_size = self.owned();
        if my_size <= MIGRATE_FLOOR
            || (my_size as f64) <= (succ_size as f64) * self.config.migrate_hysteresis
        {
            return;
        }

        let wanted_delta = ((my_size - succ_size) / 2) as i64;
        let pred = self.routing.predecessor();
        let my_pos = self.routing.position();

        let wanted_pos = if pred.pos <= my_pos {
            let up_to_me = self.tree.real_size_between(None, Some(my_pos), true, false) as i64;
            self.tree.next_marker_index(up_to_me - wanted_delta)
        } else {
            // our arc wraps: ranks count from the keyspace start, which
            // lies inside the arc
            let owned_after_nil =
                self.tree.real_size_between(None, Some(succ.pos), true, false) as i64;
            if owned_after_nil > wanted_delta {
                self.tree.next_marker_index(owned_after_nil - wanted_delta)
            } else {
                self.tree.next_marker_index(
                    self.tree.real_size() as i64 + owned_after_nil - wanted_delta,
                )
            }
        };
        let Some(wanted_pos) = wanted_pos else {
            // rank not present; try again next tick
            return;
        };

        if wanted_pos.strictly_within(pred.pos, my_pos) {
            debug!(
                my_size,
                succ_size,
                wanted = %wanted_pos,
                "migrating toward successor"
            );
            self.change_position(wanted_pos);
        }
    }

    fn change_position(&self, new_pos: Position) {
        let old_pos = self.routing.position();
        if new_pos == old_pos {
            return;
        }
        self.routing.set_position(new_pos);
        self.last_migrate
            .store(self.clock.monotonic_ns(), Ordering::Relaxed);
        info!(old = %old_pos, new = %new_pos, "moved ring position");
        let listeners = self.migrate_listeners.read().clone();
        for listener in &listeners {
            listener(self, old_pos, new_pos);
        }
    }

    /// One gossip exchange with the successor: send our ring, merge theirs.
    /// Additive only; removals spread through each node's own probes.
    async fn gossip_once(&self) {
        let succ = self.routing.successor();
        if succ.addr == self.routing.addr() {
            return;
        }

        let ours = self.routing.ring().nodes().to_vec();
        match self.transport.call(&succ.addr, Request::Gossip(ours)).await {
            Ok(Response::Ring(theirs)) => {
                for remote in theirs {
                    self.routing.merge(remote);
                }
            }
            Ok(other) => {
                warn!(peer = %succ.addr, response = ?other, "unexpected gossip response");
            }
            Err(e) => {
                warn!(peer = %succ.addr, error = %e, "gossip failed, removing peer");
                self.routing.remove(&succ.addr);
            }
        }
    }

    /// Sample a random peer's clock and damp half the error into ours.
    async fn clock_once(&self) {
        let ring = self.routing.ring();
        let peers: Vec<Remote> = ring
            .nodes()
            .iter()
            .filter(|n| n.addr != self.routing.addr())
            .cloned()
            .collect();
        if peers.is_empty() {
            return;
        }
        let peer = &peers[rand::thread_rng().gen_range(0..peers.len())];

        let before = self.clock.now();
        match self.transport.call(&peer.addr, Request::Time).await {
            Ok(Response::Time(theirs)) => {
                let after = self.clock.now();
                let midpoint = before + (after - before) / 2;
                self.clock.adjust(theirs - midpoint);
            }
            Ok(other) => {
                debug!(peer = %peer.addr, response = ?other, "unexpected time response");
            }
            Err(e) => {
                debug!(peer = %peer.addr, error = %e, "clock sample failed");
            }
        }
    }
}

impl RequestHandler for StoreNode {
    fn handle(&self, request: Request) -> Response {
        match request {
            Request::Owned => Response::Owned(self.owned() as u64),
            Request::Ring => Response::Ring(self.routing.ring().nodes().to_vec()),
            Request::Add(remote) => {
                self.routing.merge(remote);
                Response::Added
            }
            Request::Gossip(theirs) => {
                for remote in theirs {
                    self.routing.merge(remote);
                }
                Response::Ring(self.routing.ring().nodes().to_vec())
            }
            Request::Time => Response::Time(self.clock.now()),
            Request::TreeSubtree { path } => Response::TreeSubtree(self.tree.subtree(&path)),
            Request::TreeChildren { path } => Response::TreeChildren(self.tree.children_of(&path)),
            Request::TreeEntry { key } => Response::TreeEntry(self.tree.get(key)),
            Request::TreeInsert { key, entry } => {
                Response::TreeInserted(self.tree.put_if_newer(key, entry))
            }
            Request::TreeDelete { key } => Response::TreeDeleted(self.tree.remove(key).is_some()),
        }
    }
}

fn unexpected(response: Response) -> Error {
    NetworkError::MismatchedResponse(format!("{:?}", response)).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(b: &[u8]) -> Position {
        Position::from_slice(b)
    }

    fn node_at(addr: &str, position: &[u8], redundancy: usize) -> Arc<StoreNode> {
        StoreNode::new(
            StoreConfig::new(addr)
                .with_redundancy(redundancy)
                .with_position(pos(position)),
        )
    }

    #[test]
    fn test_owned_single_node() {
        let node = node_at("127.0.0.1:41000", &[0x80], 2);
        node.put(pos(&[0x10]), b"a".to_vec());
        node.put(pos(&[0xC0]), b"b".to_vec());
        assert_eq!(node.owned(), node.tree().real_size());
    }

    #[test]
    fn test_owned_plain_arc() {
        let node = node_at("127.0.0.1:41001", &[0x80], 2);
        node.routing().add(Remote::new(pos(&[0x20]), "peer:1"));

        node.put(pos(&[0x40]), b"in".to_vec());
        node.put(pos(&[0x10]), b"out".to_vec());
        node.put(pos(&[0xC0]), b"out".to_vec());
        assert_eq!(node.owned(), 1);
    }

    #[test]
    fn test_owned_wrapped_arc() {
        let node = node_at("127.0.0.1:41002", &[0x20], 2);
        node.routing().add(Remote::new(pos(&[0x80]), "peer:1"));

        node.put(pos(&[0x90]), b"in".to_vec());
        node.put(pos(&[0x10]), b"in".to_vec());
        node.put(pos(&[0x40]), b"out".to_vec());
        assert_eq!(node.owned(), 2);
    }

    #[test]
    fn test_owners_with_small_ring() {
        let node = node_at("127.0.0.1:41003", &[0x00], 3);
        node.routing().add(Remote::new(pos(&[0x80]), "peer:1"));

        let (owners, is_owner) = node.owners(pos(&[0x40]));
        assert_eq!(owners.len(), 3);
        assert_eq!(owners[0].addr, "peer:1");
        assert_eq!(owners[1].addr, "127.0.0.1:41003");
        assert_eq!(owners[2].addr, "peer:1");
        assert!(is_owner);
    }

    #[test]
    fn test_owner_set_distinct_addresses() {
        let node = node_at("127.0.0.1:41004", &[0x00], 2);
        node.routing().add(Remote::new(pos(&[0x55]), "b:1"));
        node.routing().add(Remote::new(pos(&[0xAA]), "c:1"));

        let (owners, _) = node.owners(pos(&[0x40]));
        let mut addrs: Vec<&str> = owners.iter().map(|o| o.addr.as_str()).collect();
        addrs.dedup();
        assert_eq!(addrs.len(), 2);
        assert_eq!(addrs[0], "b:1");
        assert_eq!(addrs[1], "c:1");
    }

    #[test]
    fn test_circular_next_wraps() {
        let node = node_at("127.0.0.1:41005", &[0x80], 2);
        assert_eq!(node.circular_next(pos(&[0x80])), None);

        node.put(pos(&[0x40]), b"v".to_vec());
        assert_eq!(node.circular_next(pos(&[0x80])), Some(pos(&[0x40])));

        node.put(pos(&[0xC0]), b"v".to_vec());
        assert_eq!(node.circular_next(pos(&[0x80])), Some(pos(&[0xC0])));
    }

    #[tokio::test]
    async fn test_start_rejects_degenerate_config() {
        let config = StoreConfig::new("127.0.0.1:0")
            .with_position(pos(&[0x00]))
            .with_migrate_hysteresis(0.5);
        let node = StoreNode::new(config);
        assert!(matches!(node.start().await, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_start_requires_created() {
        let node = node_at("127.0.0.1:0", &[0x00], 2);
        node.start().await.unwrap();
        assert!(matches!(node.start().await, Err(Error::State(_))));

        node.stop();
        node.stop(); // idempotent
        assert!(matches!(node.start().await, Err(Error::State(_))));
    }

    /// Transport stub whose successor always reports an empty arc.
    struct EmptySuccessor;

    #[async_trait::async_trait]
    impl crate::net::Transport for EmptySuccessor {
        async fn call(
            &self,
            _addr: &str,
            request: crate::net::rpc::Request,
        ) -> crate::error::Result<crate::net::rpc::Response> {
            Ok(match request {
                crate::net::rpc::Request::Owned => crate::net::rpc::Response::Owned(0),
                _ => crate::net::rpc::Response::Added,
            })
        }
    }

    /// Transport stub where every peer is unreachable.
    struct DeadPeers;

    #[async_trait::async_trait]
    impl crate::net::Transport for DeadPeers {
        async fn call(
            &self,
            addr: &str,
            _request: crate::net::rpc::Request,
        ) -> crate::error::Result<crate::net::rpc::Response> {
            Err(crate::error::NetworkError::Unreachable {
                addr: addr.to_string(),
                reason: "peer is down".to_string(),
            }
            .into())
        }
    }

    async fn quiet_node(transport: Arc<dyn crate::net::Transport>) -> Arc<StoreNode> {
        let config = StoreConfig::new("127.0.0.1:41100")
            .with_redundancy(2)
            .with_sync_interval(Duration::from_millis(1))
            .with_position(pos(&[0x80]));
        let node = StoreNode::with_transport(config, transport);
        node.routing().add(Remote::new(pos(&[0x20]), "peer:1"));
        // let the reroute from adding the peer age past the quiescence gate
        tokio::time::sleep(Duration::from_millis(20)).await;
        node
    }

    #[tokio::test]
    async fn test_migration_skipped_below_floor() {
        let node = quiet_node(Arc::new(EmptySuccessor)).await;
        for i in 0..10u8 {
            node.put(pos(&[0x30, i]), b"v".to_vec());
        }

        node.migrate_once().await;
        // ten keys against an empty successor is still below the floor
        assert_eq!(node.position(), pos(&[0x80]));

        node.put(pos(&[0x30, 0xFF]), b"v".to_vec());
        tokio::time::sleep(Duration::from_millis(20)).await;
        node.migrate_once().await;
        assert_ne!(node.position(), pos(&[0x80]));
    }

    #[tokio::test]
    async fn test_failed_probe_removes_successor() {
        let node = quiet_node(Arc::new(DeadPeers)).await;
        for i in 0..20u8 {
            node.put(pos(&[0x30, i]), b"v".to_vec());
        }

        assert!(node.routing().ring().contains_addr("peer:1"));
        node.migrate_once().await;
        assert!(!node.routing().ring().contains_addr("peer:1"));
        assert_eq!(node.position(), pos(&[0x80]));
    }
}
