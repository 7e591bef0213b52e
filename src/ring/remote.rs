//! A peer on the ring.

use crate::types::Position;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A peer node: its ring position and its RPC address.
///
/// Remotes order by position first, address second. Two remotes with the
/// same address are the same node, possibly after it moved.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Remote {
    pub pos: Position,
    pub addr: String,
}

impl Remote {
    /// Create a remote for the given position and address.
    pub fn new(pos: Position, addr: impl Into<String>) -> Self {
        Self {
            pos,
            addr: addr.into(),
        }
    }
}

impl fmt::Display for Remote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}@{}]", self.pos, self.addr)
    }
}

impl fmt::Debug for Remote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Remote({}@{})", self.pos, self.addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering() {
        let a = Remote::new(Position::from_slice(&[0x10]), "b:1");
        let b = Remote::new(Position::from_slice(&[0x20]), "a:1");
        let c = Remote::new(Position::from_slice(&[0x20]), "c:1");

        assert!(a < b);
        assert!(b < c); // position ties break on address
    }
}
