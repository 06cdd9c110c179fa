//! Blake3 content checksums
//!
//! Used for chunk key derivation and for verifying shard payload
//! integrity during full checks.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Blake3 checksum of a byte payload
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum([u8; 32]);

impl Checksum {
    /// Compute the checksum of a payload
    pub fn compute(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Get the raw checksum bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Verify that a payload matches this checksum
    pub fn verify(&self, data: &[u8]) -> bool {
        self == &Self::compute(data)
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_deterministic() {
        let a = Checksum::compute(b"hello world");
        let b = Checksum::compute(b"hello world");
        assert_eq!(a, b);

        let c = Checksum::compute(b"different data");
        assert_ne!(a, c);
    }

    #[test]
    fn test_checksum_verify() {
        let sum = Checksum::compute(b"payload");
        assert!(sum.verify(b"payload"));
        assert!(!sum.verify(b"tampered"));
    }
}
