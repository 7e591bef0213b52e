//! Range reconciliation between two trees.

use crate::error::Result;
use crate::tree::{child_shift, span_last, Entry, SubtreeDigest, DEPTH};
use crate::types::Position;
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;

/// The tree operations reconciliation needs, served locally or across the
/// wire.
#[async_trait]
pub trait SyncTree: Send + Sync {
    /// Digest summary of the subtree at a nibble path.
    async fn sync_subtree(&self, path: &[u8]) -> Result<Option<SubtreeDigest>>;

    /// Digest summaries of the 16 children at a nibble path.
    async fn sync_children(&self, path: &[u8]) -> Result<Vec<Option<SubtreeDigest>>>;

    /// The entry at `key`.
    async fn sync_entry(&self, key: Position) -> Result<Option<Entry>>;

    /// Store the entry unless a newer one is present. Returns whether the
    /// entry was stored.
    async fn sync_insert(&self, key: Position, entry: Entry) -> Result<bool>;

    /// Remove the entry at `key`. Returns whether an entry was removed.
    async fn sync_delete(&self, key: Position) -> Result<bool>;
}

/// Counts reported by one sync run.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyncOutcome {
    /// Keys copied into the destination.
    pub put_count: usize,
    /// Keys removed from the source (destroy runs only).
    pub del_count: usize,
}

/// Reconciles a circular key arc from a source tree into a destination.
///
/// The walk compares Merkle digests top-down and descends only into
/// subtrees whose digests differ; keys absent or older in the destination
/// are copied. With [`destroy`](Self::destroy), every key the pass visits
/// is removed from the source once the destination has seen it.
pub struct TreeSync<'a> {
    source: &'a dyn SyncTree,
    dest: &'a dyn SyncTree,
    from: Position,
    to: Position,
    from_inclusive: bool,
    destroy: bool,
}

impl<'a> TreeSync<'a> {
    /// Sync over the whole key space.
    pub fn new(source: &'a dyn SyncTree, dest: &'a dyn SyncTree) -> Self {
        Self {
            source,
            dest,
            from: Position::ZERO,
            to: Position::ZERO,
            from_inclusive: false,
            destroy: false,
        }
    }

    /// Restrict to the arc starting strictly after `from`.
    pub fn from_exclusive(mut self, from: Position) -> Self {
        self.from = from;
        self.from_inclusive = false;
        self
    }

    /// Restrict to the arc starting at `from` itself.
    pub fn from_inclusive(mut self, from: Position) -> Self {
        self.from = from;
        self.from_inclusive = true;
        self
    }

    /// Restrict to the arc ending at `to`, inclusive.
    pub fn to(mut self, to: Position) -> Self {
        self.to = to;
        self
    }

    /// Remove every visited key from the source after transfer.
    pub fn destroy(mut self) -> Self {
        self.destroy = true;
        self
    }

    /// Run the reconciliation and report the transfer counts.
    pub async fn run(self) -> Result<SyncOutcome> {
        let mut outcome = SyncOutcome::default();
        for (lo, hi) in self.segments() {
            self.walk(&mut outcome, Vec::new(), 0, 0, lo, hi).await?;
        }
        Ok(outcome)
    }

    /// The arc as linear inclusive segments of the key space. A wrapping
    /// arc splits in two; `from == to` covers the full circle.
    fn segments(&self) -> Vec<(u128, u128)> {
        let from = self.from.to_u128();
        let to = self.to.to_u128();
        if from == to {
            return vec![(0, u128::MAX)];
        }
        let mut segments = Vec::with_capacity(2);
        if from < to {
            let lo = if self.from_inclusive { from } else { from + 1 };
            if lo <= to {
                segments.push((lo, to));
            }
        } else {
            if self.from_inclusive {
                segments.push((from, u128::MAX));
            } else if from < u128::MAX {
                segments.push((from + 1, u128::MAX));
            }
            segments.push((0, to));
        }
        segments
    }

    fn walk<'s>(
        &'s self,
        outcome: &'s mut SyncOutcome,
        path: Vec<u8>,
        base: u128,
        depth: usize,
        lo: u128,
        hi: u128,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 's>> {
        Box::pin(async move {
            if span_last(base, depth) < lo || base > hi {
                return Ok(());
            }
            let Some(src) = self.source.sync_subtree(&path).await? else {
                return Ok(());
            };
            let contained = base >= lo && span_last(base, depth) <= hi;
            if contained && !self.destroy {
                // A destroy pass must visit every source key regardless of
                // how similar the trees look.
                if let Some(dst) = self.dest.sync_subtree(&path).await? {
                    if dst == src {
                        return Ok(());
                    }
                }
            }
            if depth == DEPTH {
                let key = Position::from_u128(base);
                if let Some(entry) = self.source.sync_entry(key).await? {
                    if self.dest.sync_insert(key, entry).await? {
                        outcome.put_count += 1;
                    }
                    if self.destroy && self.source.sync_delete(key).await? {
                        outcome.del_count += 1;
                    }
                }
                return Ok(());
            }
            let children = self.source.sync_children(&path).await?;
            for (i, child) in children.iter().enumerate() {
                if child.is_none() {
                    continue;
                }
                let child_base = base | ((i as u128) << child_shift(depth));
                let mut child_path = path.clone();
                child_path.push(i as u8);
                self.walk(outcome, child_path, child_base, depth + 1, lo, hi)
                    .await?;
            }
            Ok(())
        })
    }
}
