//! The Merkle radix tree holding local data.
//!
//! Keys are fixed-width [`digest::SIZE`](crate::digest::SIZE)-byte
//! positions, stored in a nibble trie of fixed depth. Every node carries
//! the digest and key count of its subtree, which is what lets two trees
//! reconcile a range by comparing digests top-down and descending only
//! where they differ.

mod sync;

pub use sync::{SyncOutcome, SyncTree, TreeSync};

use crate::digest;
use crate::error::Result;
use crate::types::Position;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Trie depth in nibbles: two per key byte.
pub(crate) const DEPTH: usize = digest::SIZE * 2;

/// A stored value list plus the writer's timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub values: Vec<Vec<u8>>,
    pub timestamp: i64,
}

impl Entry {
    /// Create an entry holding a single value.
    pub fn new(value: Vec<u8>, timestamp: i64) -> Self {
        Self {
            values: vec![value],
            timestamp,
        }
    }
}

/// Digest and key count of one subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtreeDigest {
    pub digest: u128,
    pub size: u64,
}

/// Bit offset of the child index at a trie depth.
pub(crate) fn child_shift(depth: usize) -> u32 {
    (4 * (DEPTH - 1 - depth)) as u32
}

/// The highest key covered by the subtree rooted at `base` at `depth`.
pub(crate) fn span_last(base: u128, depth: usize) -> u128 {
    match depth {
        0 => u128::MAX,
        d if d >= DEPTH => base,
        d => base | (u128::MAX >> (4 * d)),
    }
}

fn nibble(key: &[u8; digest::SIZE], depth: usize) -> usize {
    let b = key[depth / 2];
    if depth % 2 == 0 {
        (b >> 4) as usize
    } else {
        (b & 0x0F) as usize
    }
}

#[derive(Debug, Default)]
struct TreeNode {
    children: [Option<Box<TreeNode>>; 16],
    entry: Option<Entry>,
    size: usize,
    digest: u128,
}

impl TreeNode {
    /// Refresh digest and size from the entry (leaves) or children.
    fn recompute(&mut self, leaf_key: Option<&[u8; digest::SIZE]>) {
        if let Some(entry) = &self.entry {
            let key = leaf_key.expect("leaf recompute without key");
            let mut buf = Vec::with_capacity(64);
            buf.extend_from_slice(key);
            buf.extend_from_slice(&entry.timestamp.to_be_bytes());
            for value in &entry.values {
                buf.extend_from_slice(&(value.len() as u32).to_be_bytes());
                buf.extend_from_slice(value);
            }
            self.digest = twox_hash::xxh3::hash128(&buf);
            self.size = 1;
        } else {
            let mut buf = Vec::with_capacity(17 * 16);
            let mut size = 0;
            for (i, child) in self.children.iter().enumerate() {
                if let Some(child) = child {
                    buf.push(i as u8);
                    buf.extend_from_slice(&child.digest.to_be_bytes());
                    size += child.size;
                }
            }
            self.digest = twox_hash::xxh3::hash128(&buf);
            self.size = size;
        }
    }
}

/// An ordered map from fixed-width key to value list, with a Merkle digest
/// per subtree and subtree key counts for rank lookups.
#[derive(Debug, Default)]
pub struct Tree {
    root: TreeNode,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored keys.
    pub fn real_size(&self) -> usize {
        self.root.size
    }

    /// Insert or replace the entry at `key`. Returns the previous entry.
    pub fn put(&mut self, key: Position, entry: Entry) -> Option<Entry> {
        Self::insert_at(&mut self.root, key.as_bytes(), 0, entry)
    }

    /// Insert the entry unless a newer or equally fresh one is present.
    /// Returns whether the entry was stored.
    pub fn put_if_newer(&mut self, key: Position, entry: Entry) -> bool {
        let fresh = match self.get(key) {
            Some(existing) => existing.timestamp < entry.timestamp,
            None => true,
        };
        if fresh {
            self.put(key, entry);
        }
        fresh
    }

    fn insert_at(
        node: &mut TreeNode,
        key: &[u8; digest::SIZE],
        depth: usize,
        entry: Entry,
    ) -> Option<Entry> {
        if depth == DEPTH {
            let prev = node.entry.replace(entry);
            node.recompute(Some(key));
            return prev;
        }
        let idx = nibble(key, depth);
        let child = node.children[idx].get_or_insert_with(Default::default);
        let prev = Self::insert_at(child, key, depth + 1, entry);
        node.recompute(None);
        prev
    }

    /// The entry at `key`, if any.
    pub fn get(&self, key: Position) -> Option<&Entry> {
        let bytes = key.as_bytes();
        let mut node = &self.root;
        for depth in 0..DEPTH {
            node = node.children[nibble(bytes, depth)].as_deref()?;
        }
        node.entry.as_ref()
    }

    /// Remove the entry at `key`. Returns the removed entry.
    pub fn remove(&mut self, key: Position) -> Option<Entry> {
        Self::remove_at(&mut self.root, key.as_bytes(), 0)
    }

    fn remove_at(node: &mut TreeNode, key: &[u8; digest::SIZE], depth: usize) -> Option<Entry> {
        if depth == DEPTH {
            let prev = node.entry.take();
            if prev.is_some() {
                node.recompute(Some(key));
            }
            return prev;
        }
        let idx = nibble(key, depth);
        let child = node.children[idx].as_mut()?;
        let prev = Self::remove_at(child, key, depth + 1);
        if prev.is_some() {
            if child.size == 0 {
                node.children[idx] = None;
            }
            node.recompute(None);
        }
        prev
    }

    /// Number of keys in the linear range between `from` and `to`, with
    /// `None` meaning the start or end of the key space.
    pub fn real_size_between(
        &self,
        from: Option<Position>,
        to: Option<Position>,
        from_inc: bool,
        to_inc: bool,
    ) -> usize {
        let lo = match from {
            None => 0,
            Some(p) => {
                let v = p.to_u128();
                if from_inc {
                    v
                } else {
                    match v.checked_add(1) {
                        Some(v) => v,
                        None => return 0,
                    }
                }
            }
        };
        let hi = match to {
            None => u128::MAX,
            Some(p) => {
                let v = p.to_u128();
                if to_inc {
                    v
                } else {
                    match v.checked_sub(1) {
                        Some(v) => v,
                        None => return 0,
                    }
                }
            }
        };
        if lo > hi {
            return 0;
        }
        Self::count_in(&self.root, 0, 0, lo, hi)
    }

    fn count_in(node: &TreeNode, base: u128, depth: usize, lo: u128, hi: u128) -> usize {
        let last = span_last(base, depth);
        if last < lo || base > hi {
            return 0;
        }
        if base >= lo && last <= hi {
            return node.size;
        }
        let mut total = 0;
        for (i, child) in node.children.iter().enumerate() {
            if let Some(child) = child {
                let child_base = base | ((i as u128) << child_shift(depth));
                total += Self::count_in(child, child_base, depth + 1, lo, hi);
            }
        }
        total
    }

    /// The smallest stored key, if any.
    pub fn first(&self) -> Option<Position> {
        self.first_at_or_after(0)
    }

    /// The smallest stored key strictly greater than `key`.
    pub fn next_marker(&self, key: Position) -> Option<Position> {
        let v = key.to_u128();
        match v.checked_add(1) {
            Some(lo) => self.first_at_or_after(lo),
            None => None,
        }
    }

    fn first_at_or_after(&self, lo: u128) -> Option<Position> {
        Self::seek(&self.root, 0, 0, lo)
    }

    fn seek(node: &TreeNode, base: u128, depth: usize, lo: u128) -> Option<Position> {
        if span_last(base, depth) < lo {
            return None;
        }
        if depth == DEPTH {
            return node.entry.as_ref().map(|_| Position::from_u128(base));
        }
        for (i, child) in node.children.iter().enumerate() {
            if let Some(child) = child {
                let child_base = base | ((i as u128) << child_shift(depth));
                if let Some(found) = Self::seek(child, child_base, depth + 1, lo) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// The key at 0-based `rank` in the sorted key set, if in range.
    pub fn next_marker_index(&self, rank: i64) -> Option<Position> {
        if rank < 0 || rank as usize >= self.root.size {
            return None;
        }
        let mut rank = rank as usize;
        let mut node = &self.root;
        let mut base = 0u128;
        let mut depth = 0usize;
        while depth < DEPTH {
            let mut next = None;
            for (i, child) in node.children.iter().enumerate() {
                if let Some(child) = child {
                    if rank < child.size {
                        next = Some((child.as_ref(), i));
                        break;
                    }
                    rank -= child.size;
                }
            }
            let (child, i) = next?;
            base |= (i as u128) << child_shift(depth);
            depth += 1;
            node = child;
        }
        Some(Position::from_u128(base))
    }

    /// Digest summary of the subtree at a nibble path, if present.
    pub fn subtree(&self, path: &[u8]) -> Option<SubtreeDigest> {
        let mut node = &self.root;
        for &n in path {
            node = node.children.get(n as usize)?.as_deref()?;
        }
        Some(SubtreeDigest {
            digest: node.digest,
            size: node.size as u64,
        })
    }

    /// Digest summaries of the 16 children of the subtree at a path.
    pub fn children_of(&self, path: &[u8]) -> Vec<Option<SubtreeDigest>> {
        let mut node = &self.root;
        for &n in path {
            match node.children.get(n as usize).and_then(|c| c.as_deref()) {
                Some(child) => node = child,
                None => return vec![None; 16],
            }
        }
        node.children
            .iter()
            .map(|child| {
                child.as_ref().map(|c| SubtreeDigest {
                    digest: c.digest,
                    size: c.size as u64,
                })
            })
            .collect()
    }
}

/// Thread-safe handle to a tree, shared between the store, its workers and
/// the RPC server.
#[derive(Clone, Default)]
pub struct SharedTree {
    inner: Arc<RwLock<Tree>>,
}

impl SharedTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, key: Position, entry: Entry) -> Option<Entry> {
        self.inner.write().put(key, entry)
    }

    pub fn put_if_newer(&self, key: Position, entry: Entry) -> bool {
        self.inner.write().put_if_newer(key, entry)
    }

    pub fn get(&self, key: Position) -> Option<Entry> {
        self.inner.read().get(key).cloned()
    }

    pub fn remove(&self, key: Position) -> Option<Entry> {
        self.inner.write().remove(key)
    }

    pub fn real_size(&self) -> usize {
        self.inner.read().real_size()
    }

    pub fn real_size_between(
        &self,
        from: Option<Position>,
        to: Option<Position>,
        from_inc: bool,
        to_inc: bool,
    ) -> usize {
        self.inner.read().real_size_between(from, to, from_inc, to_inc)
    }

    pub fn first(&self) -> Option<Position> {
        self.inner.read().first()
    }

    pub fn next_marker(&self, key: Position) -> Option<Position> {
        self.inner.read().next_marker(key)
    }

    pub fn next_marker_index(&self, rank: i64) -> Option<Position> {
        self.inner.read().next_marker_index(rank)
    }

    pub fn subtree(&self, path: &[u8]) -> Option<SubtreeDigest> {
        self.inner.read().subtree(path)
    }

    pub fn children_of(&self, path: &[u8]) -> Vec<Option<SubtreeDigest>> {
        self.inner.read().children_of(path)
    }
}

#[async_trait::async_trait]
impl SyncTree for SharedTree {
    async fn sync_subtree(&self, path: &[u8]) -> Result<Option<SubtreeDigest>> {
        Ok(self.subtree(path))
    }

    async fn sync_children(&self, path: &[u8]) -> Result<Vec<Option<SubtreeDigest>>> {
        Ok(self.children_of(path))
    }

    async fn sync_entry(&self, key: Position) -> Result<Option<Entry>> {
        Ok(self.get(key))
    }

    async fn sync_insert(&self, key: Position, entry: Entry) -> Result<bool> {
        Ok(self.put_if_newer(key, entry))
    }

    async fn sync_delete(&self, key: Position) -> Result<bool> {
        Ok(self.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(b: &[u8]) -> Position {
        Position::from_slice(b)
    }

    fn entry(value: &[u8], ts: i64) -> Entry {
        Entry::new(value.to_vec(), ts)
    }

    #[test]
    fn test_put_get_remove() {
        let mut tree = Tree::new();
        assert!(tree.put(pos(&[0x40]), entry(b"v1", 1)).is_none());
        assert_eq!(tree.real_size(), 1);
        assert_eq!(tree.get(pos(&[0x40])).unwrap().values, vec![b"v1".to_vec()]);

        let prev = tree.put(pos(&[0x40]), entry(b"v2", 2)).unwrap();
        assert_eq!(prev.values, vec![b"v1".to_vec()]);
        assert_eq!(tree.real_size(), 1);

        assert!(tree.remove(pos(&[0x40])).is_some());
        assert!(tree.get(pos(&[0x40])).is_none());
        assert_eq!(tree.real_size(), 0);
        assert!(tree.remove(pos(&[0x40])).is_none());
    }

    #[test]
    fn test_put_if_newer() {
        let mut tree = Tree::new();
        assert!(tree.put_if_newer(pos(&[0x40]), entry(b"old", 5)));
        assert!(!tree.put_if_newer(pos(&[0x40]), entry(b"stale", 3)));
        assert!(!tree.put_if_newer(pos(&[0x40]), entry(b"same", 5)));
        assert_eq!(tree.get(pos(&[0x40])).unwrap().values, vec![b"old".to_vec()]);

        assert!(tree.put_if_newer(pos(&[0x40]), entry(b"new", 7)));
        assert_eq!(tree.get(pos(&[0x40])).unwrap().values, vec![b"new".to_vec()]);
    }

    #[test]
    fn test_real_size_between() {
        let mut tree = Tree::new();
        for b in [0x10u8, 0x40, 0x80, 0xC0] {
            tree.put(pos(&[b]), entry(b"v", 1));
        }

        assert_eq!(tree.real_size_between(None, None, true, true), 4);
        assert_eq!(
            tree.real_size_between(Some(pos(&[0x10])), Some(pos(&[0x80])), true, false),
            2
        );
        assert_eq!(
            tree.real_size_between(Some(pos(&[0x10])), Some(pos(&[0x80])), false, true),
            2
        );
        assert_eq!(tree.real_size_between(None, Some(pos(&[0x80])), true, false), 2);
        assert_eq!(tree.real_size_between(Some(pos(&[0x80])), None, true, false), 2);
        assert_eq!(
            tree.real_size_between(Some(pos(&[0xC0])), Some(pos(&[0x10])), true, false),
            0
        );
    }

    #[test]
    fn test_markers() {
        let mut tree = Tree::new();
        for b in [0x40u8, 0x80, 0xC0] {
            tree.put(pos(&[b]), entry(b"v", 1));
        }

        assert_eq!(tree.first(), Some(pos(&[0x40])));
        assert_eq!(tree.next_marker(pos(&[0x40])), Some(pos(&[0x80])));
        assert_eq!(tree.next_marker(pos(&[0x41])), Some(pos(&[0x80])));
        assert_eq!(tree.next_marker(pos(&[0xC0])), None);
        assert_eq!(tree.next_marker(Position::ZERO), Some(pos(&[0x40])));
    }

    #[test]
    fn test_marker_rank() {
        let mut tree = Tree::new();
        for b in [0x40u8, 0x80, 0xC0] {
            tree.put(pos(&[b]), entry(b"v", 1));
        }

        assert_eq!(tree.next_marker_index(0), Some(pos(&[0x40])));
        assert_eq!(tree.next_marker_index(1), Some(pos(&[0x80])));
        assert_eq!(tree.next_marker_index(2), Some(pos(&[0xC0])));
        assert_eq!(tree.next_marker_index(3), None);
        assert_eq!(tree.next_marker_index(-1), None);
    }

    #[test]
    fn test_digests_track_content() {
        let mut a = Tree::new();
        let mut b = Tree::new();
        assert_eq!(a.subtree(&[]).unwrap(), b.subtree(&[]).unwrap());

        a.put(pos(&[0x40]), entry(b"v", 1));
        assert_ne!(a.subtree(&[]).unwrap(), b.subtree(&[]).unwrap());

        b.put(pos(&[0x40]), entry(b"v", 1));
        assert_eq!(a.subtree(&[]).unwrap(), b.subtree(&[]).unwrap());

        // different timestamp -> different digest
        b.put(pos(&[0x40]), entry(b"v", 2));
        assert_ne!(a.subtree(&[]).unwrap(), b.subtree(&[]).unwrap());
    }

    #[test]
    fn test_digest_independent_of_insert_order() {
        let mut a = Tree::new();
        let mut b = Tree::new();
        for byte in [0x10u8, 0x80, 0x40, 0xC0] {
            a.put(pos(&[byte]), entry(b"v", 1));
        }
        for byte in [0xC0u8, 0x10, 0x80, 0x40] {
            b.put(pos(&[byte]), entry(b"v", 1));
        }
        assert_eq!(a.subtree(&[]).unwrap(), b.subtree(&[]).unwrap());
    }

    #[test]
    fn test_children_of() {
        let mut tree = Tree::new();
        tree.put(pos(&[0x40]), entry(b"v", 1));
        tree.put(pos(&[0x80]), entry(b"v", 1));

        let children = tree.children_of(&[]);
        assert!(children[0x4].is_some());
        assert!(children[0x8].is_some());
        assert!(children[0x0].is_none());

        assert_eq!(tree.children_of(&[0x9]), vec![None; 16]);
    }

    #[test]
    fn test_removal_restores_digest() {
        let mut tree = Tree::new();
        tree.put(pos(&[0x40]), entry(b"v", 1));
        let digest_one = tree.subtree(&[]).unwrap();

        tree.put(pos(&[0x80]), entry(b"w", 2));
        tree.remove(pos(&[0x80]));
        assert_eq!(tree.subtree(&[]).unwrap(), digest_one);
    }
}
