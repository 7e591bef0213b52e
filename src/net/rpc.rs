//! RPC message types for peer communication.

use crate::ring::Remote;
use crate::tree::{Entry, SubtreeDigest};
use crate::types::Position;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Largest frame a peer may send. Guards the length-prefix allocation.
pub const MAX_FRAME: u32 = 16 * 1024 * 1024;

/// A request to a peer node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    /// This node's owned-key count.
    Owned,

    /// A snapshot of the peer's ring.
    Ring,

    /// Announce a new or moved peer.
    Add(Remote),

    /// Exchange ring views: the peer merges these entries and replies with
    /// its own ring.
    Gossip(Vec<Remote>),

    /// The peer's current network time in nanoseconds.
    Time,

    /// Tree sync: subtree digest at a nibble path.
    TreeSubtree { path: Vec<u8> },

    /// Tree sync: the 16 child digests at a nibble path.
    TreeChildren { path: Vec<u8> },

    /// Tree sync: entry lookup.
    TreeEntry { key: Position },

    /// Tree sync: store an entry unless a newer one is present.
    TreeInsert { key: Position, entry: Entry },

    /// Tree sync: remove an entry.
    TreeDelete { key: Position },
}

/// A response from a peer node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    Owned(u64),
    Ring(Vec<Remote>),
    Added,
    Time(i64),
    TreeSubtree(Option<SubtreeDigest>),
    TreeChildren(Vec<Option<SubtreeDigest>>),
    TreeEntry(Option<Entry>),
    TreeInserted(bool),
    TreeDeleted(bool),
}

/// Encode a message to bytes.
pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>, bincode::Error> {
    bincode::serialize(msg)
}

/// Decode a message from bytes.
pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T, bincode::Error> {
    bincode::deserialize(data)
}

/// Frame a message with a length prefix for TCP transmission.
pub fn frame<T: Serialize>(msg: &T) -> Result<Vec<u8>, bincode::Error> {
    let data = encode(msg)?;
    let len = data.len() as u32;

    let mut framed = Vec::with_capacity(4 + data.len());
    framed.extend_from_slice(&len.to_be_bytes());
    framed.extend_from_slice(&data);

    Ok(framed)
}

/// Encode a message with its length prefix directly into a `BytesMut`
/// buffer, avoiding the intermediate allocation of [`frame`]. Returns the
/// number of bytes written.
pub fn frame_into<T: Serialize>(
    msg: &T,
    buffer: &mut bytes::BytesMut,
) -> Result<usize, bincode::Error> {
    let size = bincode::serialized_size(msg)? as usize;

    buffer.reserve(4 + size);
    buffer.extend_from_slice(&(size as u32).to_be_bytes());

    let start = buffer.len();
    buffer.resize(start + size, 0);

    let mut cursor = std::io::Cursor::new(&mut buffer[start..]);
    bincode::serialize_into(&mut cursor, msg)?;

    Ok(4 + size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_roundtrip() {
        let req = Request::TreeEntry {
            key: Position::from_slice(&[0x40]),
        };
        let encoded = encode(&req).unwrap();
        let decoded: Request = decode(&encoded).unwrap();

        if let Request::TreeEntry { key } = decoded {
            assert_eq!(key, Position::from_slice(&[0x40]));
        } else {
            panic!("wrong request variant");
        }
    }

    #[test]
    fn test_frame_length_prefix() {
        let msg = Request::Gossip(vec![Remote::new(
            Position::from_slice(&[0x10]),
            "127.0.0.1:9000",
        )]);

        let framed = frame(&msg).unwrap();
        let len = u32::from_be_bytes([framed[0], framed[1], framed[2], framed[3]]) as usize;
        assert_eq!(len, framed.len() - 4);

        let decoded: Request = decode(&framed[4..]).unwrap();
        if let Request::Gossip(remotes) = decoded {
            assert_eq!(remotes.len(), 1);
            assert_eq!(remotes[0].addr, "127.0.0.1:9000");
        } else {
            panic!("wrong request variant");
        }
    }

    #[test]
    fn test_frame_into_matches_frame() {
        let msg = Response::Owned(42);
        let framed = frame(&msg).unwrap();

        let mut buffer = bytes::BytesMut::new();
        let written = frame_into(&msg, &mut buffer).unwrap();

        assert_eq!(written, framed.len());
        assert_eq!(&buffer[..], &framed[..]);
    }
}
