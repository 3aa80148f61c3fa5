//! The 128-bit digest type.

use std::fmt;

use md5::{Digest as _, Md5};

/// A 128-bit fingerprint. Its only operations are equality, ordering (for use
/// as a store key), and lowercase hex rendering.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest(pub [u8; 16]);

impl Digest {
    pub const SIZE: usize = 16;

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// The low 64 bits, read little-endian from the leading bytes. Used where
    /// a lightweight identifier is enough (alias digests, global GUIDs).
    pub fn low64(&self) -> u64 {
        let mut word = [0u8; 8];
        word.copy_from_slice(&self.0[..8]);
        u64::from_le_bytes(word)
    }

    /// 32 lowercase hex characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

/// 64-bit global-value GUID: the low word of the MD5 of the value's name.
pub fn name_guid(name: &str) -> u64 {
    let mut hash = Md5::new();
    hash.update(name.as_bytes());
    let out: [u8; 16] = hash.finalize().into();
    Digest(out).low64()
}
