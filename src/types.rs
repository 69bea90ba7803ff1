//! Core types used throughout PBus.

use std::fmt;

use rand::RngCore;

/// 4-byte correlation tag matching a reply to the request that produced it.
///
/// Tags are drawn randomly per request. Uniqueness against the live pending
/// set is enforced at allocation time by the connection, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag([u8; 4]);

impl Tag {
    pub const fn new(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Draw a random tag from the thread-local RNG.
    pub fn generate() -> Self {
        Self::generate_with(&mut rand::thread_rng())
    }

    /// Draw a random tag from the given RNG.
    pub fn generate_with<R: RngCore>(rng: &mut R) -> Self {
        let mut bytes = [0u8; 4];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl From<[u8; 4]> for Tag {
    fn from(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}
