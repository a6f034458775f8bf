//! SHA-1 content addresses.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha1::{Digest, Sha1};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Length of a SHA-1 digest in bytes.
pub const CHECKSUM_LEN: usize = 20;

/// Length of a SHA-1 digest in hex characters.
pub const CHECKSUM_HEX_LEN: usize = CHECKSUM_LEN * 2;

/// A SHA-1 content address represented as 20 bytes.
///
/// This is the primary key of every stored binary. Two blobs with the same
/// checksum are treated as identical content.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Sha1Checksum([u8; CHECKSUM_LEN]);

impl Sha1Checksum {
    /// Create a checksum from raw bytes.
    pub fn from_bytes(bytes: [u8; CHECKSUM_LEN]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; CHECKSUM_LEN] {
        &self.0
    }

    /// Compute the SHA-1 checksum of data.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Create an incremental hasher.
    pub fn hasher() -> Sha1Hasher {
        Sha1Hasher(Sha1::new())
    }

    /// Parse from a hex string (case-insensitive).
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        if s.len() != CHECKSUM_HEX_LEN {
            return Err(crate::Error::InvalidChecksum(format!(
                "expected {CHECKSUM_HEX_LEN} hex chars, got {}",
                s.len()
            )));
        }
        // from_str_radix alone would let a sign such as "+f" through.
        if let Some(bad) = s.chars().find(|c| !c.is_ascii_hexdigit()) {
            return Err(crate::Error::InvalidChecksum(format!(
                "{s}: invalid hex character {bad:?}"
            )));
        }
        let mut bytes = [0u8; CHECKSUM_LEN];
        for (i, pair) in s.as_bytes().chunks(2).enumerate() {
            bytes[i] = (hex_value(pair[0]) << 4) | hex_value(pair[1]);
        }
        Ok(Self(bytes))
    }

    /// Encode as lowercase hex string.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Relative sharded path for this checksum.
    ///
    /// `levels` directories of `width` hex characters each, taken from the
    /// front of the checksum, followed by the full checksum as file name.
    /// `shard_path(1, 2)` yields `ab/abcdef...`.
    pub fn shard_path(&self, levels: usize, width: usize) -> PathBuf {
        let hex = self.to_hex();
        let mut path = PathBuf::new();
        for level in 0..levels {
            let start = level * width;
            let end = start + width;
            if end > hex.len() {
                break;
            }
            path.push(&hex[start..end]);
        }
        path.push(&hex);
        path
    }
}

/// Value of one ASCII hex digit. Callers check the digit first.
fn hex_value(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        _ => digit - b'A' + 10,
    }
}

impl fmt::Debug for Sha1Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sha1Checksum({})", &self.to_hex()[..12])
    }
}

impl fmt::Display for Sha1Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for Sha1Checksum {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::from_hex(s)
    }
}

impl Serialize for Sha1Checksum {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Sha1Checksum {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Incremental SHA-1 hasher.
pub struct Sha1Hasher(Sha1);

impl Sha1Hasher {
    /// Update the hasher with data.
    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    /// Finalize and return the checksum.
    pub fn finalize(self) -> Sha1Checksum {
        Sha1Checksum(self.0.finalize().into())
    }
}

impl Default for Sha1Hasher {
    fn default() -> Self {
        Sha1Checksum::hasher()
    }
}
