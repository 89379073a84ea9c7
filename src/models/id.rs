//! Store-native object identifiers.
//!
//! Ids are 12 bytes rendered as 24 lowercase hex characters:
//! 4-byte big-endian seconds, 5 process-unique bytes, 3-byte big-endian counter.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

static PROCESS_UNIQUE: OnceLock<[u8; 5]> = OnceLock::new();
static COUNTER: OnceLock<AtomicU32> = OnceLock::new();

fn process_unique() -> [u8; 5] {
    *PROCESS_UNIQUE.get_or_init(|| {
        let b = *Uuid::new_v4().as_bytes();
        [b[0], b[1], b[2], b[3], b[4]]
    })
}

fn next_count() -> u32 {
    // Start in the lower half of the 24-bit range so wrapping needs millions of ids.
    let counter = COUNTER.get_or_init(|| {
        let b = *Uuid::new_v4().as_bytes();
        AtomicU32::new(u32::from_be_bytes([0, b[0], b[1], b[2]]) & 0x007F_FFFF)
    });
    counter.fetch_add(1, Ordering::SeqCst) & 0x00FF_FFFF
}

/// Opaque 12-byte identifier.
///
/// Ids generated by one process sort in creation order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 12]);

impl ObjectId {
    /// Generate a fresh id.
    pub fn new() -> Self {
        let mut bytes = [0u8; 12];
        let secs = Utc::now().timestamp().clamp(0, u32::MAX as i64) as u32;
        bytes[0..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..9].copy_from_slice(&process_unique());
        bytes[9..12].copy_from_slice(&next_count().to_be_bytes()[1..4]);
        Self(bytes)
    }

    /// Parse a 24-character hex string.
    pub fn parse(s: &str) -> AppResult<Self> {
        if s.len() != 24 {
            return Err(AppError::InvalidInput(format!(
                "'{}' is not a valid id (expected 24 hex characters)",
                s
            )));
        }
        let mut bytes = [0u8; 12];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|_| AppError::InvalidInput(format!("'{}' is not a valid id", s)))?;
        Ok(Self(bytes))
    }

    /// Parse a required reference, naming the field in the error.
    pub fn parse_required(value: Option<&str>, field: &str) -> AppResult<Self> {
        match value {
            Some(s) if !s.is_empty() => Self::parse(s),
            _ => Err(AppError::InvalidInput(format!("{} is required", field))),
        }
    }

    pub fn bytes(&self) -> &[u8; 12] {
        &self.0
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for ObjectId {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self)
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
