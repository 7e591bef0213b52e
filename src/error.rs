//! Error types for the store.

use std::io;
use thiserror::Error;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the store.
#[derive(Error, Debug)]
pub enum Error {
    /// Network communication errors.
    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    /// The configuration cannot be run with.
    #[error("config error: {0}")]
    Config(String),

    /// Illegal lifecycle transition (e.g. starting an already started node).
    #[error("invalid state: {0}")]
    State(String),
}

/// Transport-level errors raised by peer calls and the RPC server.
///
/// The drivers treat any of these as "the peer is uncooperative" and
/// recover by dropping it from the ring.
#[derive(Error, Debug)]
pub enum NetworkError {
    /// Could not reach the peer at all.
    #[error("peer {addr} unreachable: {reason}")]
    Unreachable { addr: String, reason: String },

    /// The call did not complete within the transport deadline.
    #[error("peer call timed out")]
    Timeout,

    /// A frame announced a length beyond the wire limit.
    #[error("oversized frame: {0} bytes")]
    OversizedFrame(u32),

    /// A message failed to encode or decode.
    #[error("codec failure: {0}")]
    Codec(String),

    /// The peer answered with a response of the wrong shape.
    #[error("mismatched response: {0}")]
    MismatchedResponse(String),

    /// Socket-level I/O failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Network(NetworkError::Codec(e.to_string()))
    }
}
