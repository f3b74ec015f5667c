//! Object identifiers.
//!
//! An [`ObjectId`] is a 12-byte opaque identifier whose canonical text form
//! is 24 lowercase hex characters. Freshly generated ids follow the usual
//! document-database layout:
//!
//! ```text
//! | 4 bytes: unix seconds (BE) | 5 bytes: per-process random | 3 bytes: counter (BE) |
//! ```
//!
//! so ids generated by one process are unique and roughly time-ordered.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::StoreError;

/// Random value shared by every id generated in this process.
static PROCESS_UNIQUE: LazyLock<[u8; 5]> = LazyLock::new(|| {
    let seed = uuid::Uuid::new_v4();
    let mut out = [0u8; 5];
    out.copy_from_slice(&seed.as_bytes()[..5]);
    out
});

/// Counter for the low three bytes, seeded randomly.
static COUNTER: LazyLock<AtomicU32> = LazyLock::new(|| {
    let seed = uuid::Uuid::new_v4();
    let b = seed.as_bytes();
    AtomicU32::new(u32::from_be_bytes([0, b[0], b[1], b[2]]))
});

/// A 12-byte object identifier.
///
/// # Examples
///
/// ```
/// use trackvault_core::ObjectId;
///
/// let id: ObjectId = "65f1a2b3c4d5e6f708192a3b".parse().unwrap();
/// assert_eq!(id.to_hex(), "65f1a2b3c4d5e6f708192a3b");
/// assert!("65f1a2b3".parse::<ObjectId>().is_err());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 12]);

impl ObjectId {
    /// Length of an identifier in raw bytes.
    pub const LEN: usize = 12;

    /// Length of the canonical hex encoding.
    pub const HEX_LEN: usize = 24;

    /// Generate a fresh identifier.
    #[must_use]
    pub fn new() -> Self {
        let secs = u32::try_from(Utc::now().timestamp()).unwrap_or(u32::MAX);
        let count = COUNTER.fetch_add(1, Ordering::Relaxed) & 0x00FF_FFFF;

        let mut bytes = [0u8; Self::LEN];
        bytes[..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..9].copy_from_slice(&*PROCESS_UNIQUE);
        bytes[9..].copy_from_slice(&count.to_be_bytes()[1..]);
        Self(bytes)
    }

    /// Build an identifier from its raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    /// Parse the 24-character hex form (either case).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidIdentifier`] if `s` is not exactly 24 hex
    /// characters.
    pub fn parse_str(s: &str) -> Result<Self, StoreError> {
        let invalid = || StoreError::InvalidIdentifier {
            value: s.to_owned(),
        };
        if s.len() != Self::HEX_LEN || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let mut bytes = [0u8; Self::LEN];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| invalid())?;
        Ok(Self(bytes))
    }

    /// The raw bytes.
    #[must_use]
    pub const fn bytes(&self) -> &[u8; 12] {
        &self.0
    }

    /// Canonical lowercase hex encoding.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// The creation time embedded in the first four bytes.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        let secs = u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]]);
        DateTime::from_timestamp(i64::from(secs), 0).unwrap_or_default()
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for ObjectId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_str(s)
    }
}

impl TryFrom<&[u8]> for ObjectId {
    type Error = StoreError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; 12] = value
            .try_into()
            .map_err(|_| StoreError::InvalidIdentifier {
                value: hex::encode(value),
            })?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse_str(&s).map_err(serde::de::Error::custom)
    }
}
