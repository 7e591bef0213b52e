//! Ring membership: a sorted set of peers on the circular key space.

mod remote;
#[allow(clippy::module_inception)]
mod ring;

pub use remote::Remote;
pub use ring::Ring;
