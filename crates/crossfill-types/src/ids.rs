//! Identifiers used throughout Crossfill.
//!
//! Settlement attempts use UUIDv7 for time-ordered sorting. The engine's
//! identity is the raw ed25519 public key that signs its receipts.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// AttemptId
// ---------------------------------------------------------------------------

/// Identifier of one settlement attempt. Uses UUIDv7 for time-ordered sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct AttemptId(pub Uuid);

impl AttemptId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for AttemptId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "attempt:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// EngineId
// ---------------------------------------------------------------------------

/// Identity of a settlement engine instance.
/// This is the raw ed25519 public key (32 bytes) that signs receipts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct EngineId(pub [u8; 32]);

impl EngineId {
    #[must_use]
    pub fn from_pubkey(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "engine:{}", hex::encode(&self.0[..8]))
    }
}

// ---------------------------------------------------------------------------
// VenueId
// ---------------------------------------------------------------------------

/// One of the two exchange protocols being arbitraged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum VenueId {
    /// Signed-order venue with keccak-256 order hashes and unix-time expiry.
    Primary,
    /// Order-book venue with SHA-256 order hashes and block-height expiry.
    Secondary,
}

impl fmt::Display for VenueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "PRIMARY"),
            Self::Secondary => write!(f, "SECONDARY"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempt_id_uniqueness() {
        let a = AttemptId::new();
        let b = AttemptId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn attempt_id_ordering() {
        let a = AttemptId::new();
        let b = AttemptId::new();
        assert!(a < b);
    }

    #[test]
    fn engine_id_display_is_hex_prefix() {
        let id = EngineId([0xab; 32]);
        assert_eq!(format!("{id}"), "engine:abababababababab");
    }

    #[test]
    fn venue_display() {
        assert_eq!(format!("{}", VenueId::Primary), "PRIMARY");
        assert_eq!(format!("{}", VenueId::Secondary), "SECONDARY");
    }

    #[test]
    fn serde_roundtrips() {
        let id = AttemptId::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: AttemptId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);

        let venue = VenueId::Secondary;
        let json = serde_json::to_string(&venue).unwrap();
        let back: VenueId = serde_json::from_str(&json).unwrap();
        assert_eq!(venue, back);
    }
}
