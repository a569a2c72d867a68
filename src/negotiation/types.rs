//! Negotiation types and state machine

use crate::types::{DocumentId, ListingId, MessageId, NegotiationId, Role, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Negotiation status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationStatus {
    /// Buyer opened with an offer, or the seller has responded
    Pending,
    /// Buyer countered after a seller response
    WaitingForSeller,
    Accepted,
    Rejected,
    /// Another negotiation on the same listing was accepted
    Unavailable,
    /// Reserved, no flow produces it yet
    Expired,
    /// Reserved, no flow produces it yet
    Cancelled,
}

impl NegotiationStatus {
    /// Check if negotiation is in a terminal state
    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    /// Check if negotiation is active
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            NegotiationStatus::Pending | NegotiationStatus::WaitingForSeller
        )
    }

    /// Whether the state machine allows moving to `next`
    pub fn can_transition_to(&self, next: NegotiationStatus) -> bool {
        use NegotiationStatus::*;
        match (self, next) {
            (Pending, Pending) | (WaitingForSeller, WaitingForSeller) => true,
            (Pending, WaitingForSeller) | (WaitingForSeller, Pending) => true,
            (
                Pending | WaitingForSeller,
                Accepted | Rejected | Unavailable | Expired | Cancelled,
            ) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NegotiationStatus::Pending => "pending",
            NegotiationStatus::WaitingForSeller => "waiting_for_seller",
            NegotiationStatus::Accepted => "accepted",
            NegotiationStatus::Rejected => "rejected",
            NegotiationStatus::Unavailable => "unavailable",
            NegotiationStatus::Expired => "expired",
            NegotiationStatus::Cancelled => "cancelled",
        }
    }

    /// Human readable label for list views
    pub fn label(&self) -> &'static str {
        match self {
            NegotiationStatus::Pending => "Awaiting response",
            NegotiationStatus::WaitingForSeller => "Waiting for seller",
            NegotiationStatus::Accepted => "Accepted",
            NegotiationStatus::Rejected => "Rejected",
            NegotiationStatus::Unavailable => "Listing no longer available",
            NegotiationStatus::Expired => "Expired",
            NegotiationStatus::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for NegotiationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type tag of a thread entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Offer,
    Counter,
    Reject,
    Accept,
    Message,
}

/// Seller's move on a negotiation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SellerAction {
    /// Counter with a price and/or reply with a message
    Offer,
    Reject,
    Accept,
}

/// One entry in a negotiation thread. Never mutated after append.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferMessage {
    pub id: MessageId,
    pub negotiation_id: NegotiationId,
    pub sender_id: UserId,
    pub sender_role: Role,
    pub kind: MessageKind,
    pub content: Option<String>,
    pub price: Option<u64>,
    /// Unix millis, never earlier than the previous entry in the thread
    pub created_at: u64,
    /// Store-wide insertion sequence, breaks timestamp ties
    pub seq: u64,
}

/// A buyer/seller price discussion over a single listing
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Negotiation {
    pub id: NegotiationId,
    pub document_id: DocumentId,
    pub listing_id: ListingId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub status: NegotiationStatus,
    /// Buyer's contact channel, disclosed to the seller once accepted
    pub contact: String,
    /// Price of the most recent price-bearing message
    pub current_offer: Option<u64>,
    pub message_count: usize,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Negotiation {
    /// Role of `user` in this negotiation, if any
    pub fn role_of(&self, user: UserId) -> Option<Role> {
        if user == self.buyer_id {
            Some(Role::Buyer)
        } else if user == self.seller_id {
            Some(Role::Seller)
        } else {
            None
        }
    }
}

/// A negotiation together with its ordered thread
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationDetail {
    pub negotiation: Negotiation,
    pub thread: Vec<OfferMessage>,
}

/// Latest price-bearing message in an ordered thread
pub fn current_offer(thread: &[OfferMessage]) -> Option<&OfferMessage> {
    thread.iter().rev().find(|m| m.price.is_some())
}
