//! Core types used throughout Tradepost

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Listing (game account for sale) identifier, owned by the catalog
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListingId(pub u64);

impl fmt::Display for ListingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listing#{}", self.0)
    }
}

/// Marketplace user identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user#{}", self.0)
    }
}

/// Negotiation identifier (assigned by the store, monotonic)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NegotiationId(pub u64);

impl fmt::Display for NegotiationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "negotiation#{}", self.0)
    }
}

/// Offer message identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "message#{}", self.0)
    }
}

/// Opaque external handle for a negotiation (random, hex encoded)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub String);

impl DocumentId {
    /// Generate a new random 16-byte document id
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which side of a negotiation an actor is on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Buyer,
    Seller,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Buyer => write!(f, "buyer"),
            Role::Seller => write!(f, "seller"),
        }
    }
}

/// Wall-clock time in unix milliseconds
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_id_generation() {
        let id1 = DocumentId::generate();
        let id2 = DocumentId::generate();

        assert_eq!(id1.0.len(), 32);
        assert!(id1.0.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let id = NegotiationId(42);
        assert_eq!(serde_json::to_string(&id).unwrap(), "42");

        let listing: ListingId = serde_json::from_str("7").unwrap();
        assert_eq!(listing, ListingId(7));
    }

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::Seller).unwrap(), "\"seller\"");
        let role: Role = serde_json::from_str("\"buyer\"").unwrap();
        assert_eq!(role, Role::Buyer);
    }

    #[test]
    fn test_display() {
        assert_eq!(ListingId(42).to_string(), "listing#42");
        assert_eq!(UserId(3).to_string(), "user#3");
    }
}
