//! Hash computation for vote digests
//!
//! Vote digests must be identical across every observer, so fields are
//! written in a fixed order with explicit lengths and hashed with keccak256.

use tiny_keccak::{Hasher, Keccak};

/// Incremental, length-prefixed keccak256 over a sequence of fields.
///
/// Each variable-length field is prefixed with its length as a big-endian
/// u64, so `("ab", "c")` and `("a", "bc")` never collide.
pub struct DigestWriter {
    hasher: Keccak,
}

impl DigestWriter {
    /// Start a digest under a domain tag (e.g. `"inbound"`)
    pub fn new(domain: &str) -> Self {
        let mut writer = Self {
            hasher: Keccak::v256(),
        };
        writer.bytes(domain.as_bytes());
        writer
    }

    pub fn bytes(&mut self, data: &[u8]) -> &mut Self {
        self.hasher.update(&(data.len() as u64).to_be_bytes());
        self.hasher.update(data);
        self
    }

    pub fn text(&mut self, s: &str) -> &mut Self {
        self.bytes(s.as_bytes())
    }

    pub fn u64(&mut self, value: u64) -> &mut Self {
        self.hasher.update(&value.to_be_bytes());
        self
    }

    pub fn finish(self) -> [u8; 32] {
        let mut output = [0u8; 32];
        self.hasher.finalize(&mut output);
        output
    }
}

/// Convert a 32-byte hash to a 0x-prefixed hex string
pub fn bytes32_to_hex(bytes: &[u8; 32]) -> String {
    format!("0x{}", hex::encode(bytes))
}
