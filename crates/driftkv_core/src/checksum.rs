//! Incremental keyspace checksum.

use crate::error::{CoreError, CoreResult};
use driftkv_codec::{to_canonical_vec, Value};
use sha2::{Digest, Sha256};
use std::fmt;

/// An 8-hex-digit running checksum over a keyspace.
///
/// Defined as the XOR over all entries of a 32-bit hash of the canonical
/// `(key, value)` pair. XOR makes the checksum order-independent and lets
/// `set`/`remove` maintain it in O(1): removing an entry XORs its hash back
/// out. The empty keyspace is `"00000000"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Checksum(u32);

impl Checksum {
    /// The checksum of the empty keyspace.
    #[must_use]
    pub const fn new() -> Self {
        Self(0)
    }

    /// Folds an entry into the checksum.
    pub fn add(&mut self, key: &str, value: &Value) {
        self.0 ^= entry_hash(key, value);
    }

    /// Folds an entry out of the checksum.
    ///
    /// XOR is its own inverse, so this is the same operation as [`add`];
    /// the distinct name keeps call sites readable.
    ///
    /// [`add`]: Checksum::add
    pub fn remove(&mut self, key: &str, value: &Value) {
        self.0 ^= entry_hash(key, value);
    }

    /// Parses an 8-hex-digit checksum string.
    pub fn parse(s: &str) -> CoreResult<Self> {
        if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(CoreError::invalid_argument(format!(
                "invalid checksum: {s}"
            )));
        }
        let bits = u32::from_str_radix(s, 16)
            .map_err(|_| CoreError::invalid_argument(format!("invalid checksum: {s}")))?;
        Ok(Self(bits))
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// 32-bit hash of one entry: the first four bytes of a SHA-256 over the
/// length-prefixed key followed by the canonical value bytes.
fn entry_hash(key: &str, value: &Value) -> u32 {
    let mut hasher = Sha256::new();
    hasher.update((key.len() as u64).to_le_bytes());
    hasher.update(key.as_bytes());
    hasher.update(to_canonical_vec(value));
    let digest = hasher.finalize();
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}
