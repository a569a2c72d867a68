//! Negotiation entity store
//!
//! System of record for negotiations and their offer threads. The store is
//! synchronous; callers share it behind an async mutex so that compound
//! operations (resume-or-create, accept-and-cascade) run in one critical
//! section.

use crate::error::{MarketError, Result};
use crate::types::{now_millis, DocumentId, ListingId, MessageId, NegotiationId, Role, UserId};
use std::collections::HashMap;

use super::types::{
    current_offer, MessageKind, Negotiation, NegotiationDetail, NegotiationStatus, OfferMessage,
};

#[derive(Clone, Debug)]
struct Record {
    negotiation: Negotiation,
    thread: Vec<OfferMessage>,
}

/// Input for a new thread entry
#[derive(Clone, Debug)]
pub struct NewMessage {
    pub sender_id: UserId,
    pub sender_role: Role,
    pub kind: MessageKind,
    pub content: Option<String>,
    pub price: Option<u64>,
}

/// In-memory negotiation store
pub struct NegotiationStore {
    records: HashMap<NegotiationId, Record>,
    /// At most one active negotiation per (listing, buyer)
    active_by_pair: HashMap<(ListingId, UserId), NegotiationId>,
    by_document: HashMap<DocumentId, NegotiationId>,
    next_negotiation: u64,
    next_message: u64,
    seq: u64,
    clock: fn() -> u64,
}

impl NegotiationStore {
    /// Create an empty store using the wall clock
    pub fn new() -> Self {
        Self::with_clock(now_millis)
    }

    /// Create an empty store with a custom millisecond clock
    pub fn with_clock(clock: fn() -> u64) -> Self {
        Self {
            records: HashMap::new(),
            active_by_pair: HashMap::new(),
            by_document: HashMap::new(),
            next_negotiation: 1,
            next_message: 1,
            seq: 0,
            clock,
        }
    }

    /// Resume the active negotiation for (listing, buyer) with a new offer,
    /// or open a fresh `pending` one.
    ///
    /// Returns the negotiation id and whether an existing one was resumed.
    pub fn create_or_resume(
        &mut self,
        listing_id: ListingId,
        seller_id: UserId,
        buyer_id: UserId,
        price: u64,
        message: Option<String>,
        contact: String,
    ) -> Result<(NegotiationId, bool)> {
        if price == 0 {
            return Err(MarketError::Validation(
                "offer price must be a positive amount".to_string(),
            ));
        }

        if let Some(id) = self.active_by_pair.get(&(listing_id, buyer_id)).copied() {
            self.append_buyer_offer(id, buyer_id, price, message)?;
            return Ok((id, true));
        }

        let offer = NewMessage {
            sender_id: buyer_id,
            sender_role: Role::Buyer,
            kind: MessageKind::Offer,
            content: message,
            price: Some(price),
        };

        let id = NegotiationId(self.next_negotiation);
        self.next_negotiation += 1;
        let document_id = DocumentId::generate();
        let now = (self.clock)();

        let negotiation = Negotiation {
            id,
            document_id: document_id.clone(),
            listing_id,
            buyer_id,
            seller_id,
            status: NegotiationStatus::Pending,
            contact,
            current_offer: None,
            message_count: 0,
            created_at: now,
            updated_at: now,
        };

        self.records.insert(
            id,
            Record {
                negotiation,
                thread: Vec::new(),
            },
        );
        self.active_by_pair.insert((listing_id, buyer_id), id);
        self.by_document.insert(document_id, id);
        self.append_message(id, offer)?;

        tracing::debug!("Opened {} on {} for {}", id, listing_id, buyer_id);
        Ok((id, false))
    }

    /// Buyer names a price. When the current offer is the seller's this is a
    /// counter and the negotiation waits for the seller; otherwise the
    /// status is left as is.
    pub fn append_buyer_offer(
        &mut self,
        id: NegotiationId,
        buyer_id: UserId,
        price: u64,
        content: Option<String>,
    ) -> Result<MessageId> {
        let countering =
            current_offer(self.thread(id)?).is_some_and(|m| m.sender_role == Role::Seller);
        let kind = if countering {
            MessageKind::Counter
        } else {
            MessageKind::Offer
        };

        let message_id = self.append_message(
            id,
            NewMessage {
                sender_id: buyer_id,
                sender_role: Role::Buyer,
                kind,
                content,
                price: Some(price),
            },
        )?;
        if countering {
            self.set_status(id, NegotiationStatus::WaitingForSeller)?;
        }

        Ok(message_id)
    }

    /// Append a message to a non-terminal negotiation
    pub fn append_message(&mut self, id: NegotiationId, message: NewMessage) -> Result<MessageId> {
        let now = (self.clock)();
        let status = self.record(id)?.negotiation.status;
        if status.is_terminal() {
            return Err(MarketError::InvalidState(format!("{} is {}", id, status)));
        }

        if message.price == Some(0) {
            return Err(MarketError::Validation(
                "price must be a positive amount".to_string(),
            ));
        }
        let carries_body = message.price.is_some()
            || message.content.as_deref().is_some_and(|c| !c.trim().is_empty());
        let decisive = matches!(message.kind, MessageKind::Accept | MessageKind::Reject);
        if !carries_body && !decisive {
            return Err(MarketError::Validation(
                "message needs a price or some content".to_string(),
            ));
        }

        // Keep timestamp order equal to submission order within the thread
        let created_at = self
            .record(id)?
            .thread
            .last()
            .map_or(now, |last| last.created_at.max(now));

        self.seq += 1;
        let message_id = MessageId(self.next_message);
        self.next_message += 1;

        let entry = OfferMessage {
            id: message_id,
            negotiation_id: id,
            sender_id: message.sender_id,
            sender_role: message.sender_role,
            kind: message.kind,
            content: message.content,
            price: message.price,
            created_at,
            seq: self.seq,
        };

        let record = self.record_mut(id)?;
        if let Some(price) = entry.price {
            record.negotiation.current_offer = Some(price);
        }
        record.negotiation.updated_at = created_at;
        record.thread.push(entry);
        record.negotiation.message_count = record.thread.len();

        Ok(message_id)
    }

    /// Move a negotiation to `status` if the state machine allows it
    pub fn set_status(&mut self, id: NegotiationId, status: NegotiationStatus) -> Result<()> {
        let now = (self.clock)();
        let record = self.record_mut(id)?;
        let current = record.negotiation.status;

        if !current.can_transition_to(status) {
            return Err(MarketError::InvalidTransition {
                from: current.to_string(),
                to: status.to_string(),
            });
        }
        if current == status {
            return Ok(());
        }

        record.negotiation.status = status;
        record.negotiation.updated_at = record.negotiation.updated_at.max(now);
        let pair = (record.negotiation.listing_id, record.negotiation.buyer_id);

        if status.is_terminal() {
            self.active_by_pair.remove(&pair);
        }

        tracing::debug!("{}: {} -> {}", id, current, status);
        Ok(())
    }

    /// Mark every active negotiation on `listing_id` other than `keep` as
    /// unavailable. Idempotent; returns the ids that changed.
    pub fn invalidate_siblings(
        &mut self,
        listing_id: ListingId,
        keep: NegotiationId,
    ) -> Result<Vec<NegotiationId>> {
        let siblings: Vec<NegotiationId> = self
            .list_active_for_listing(listing_id)
            .into_iter()
            .map(|n| n.id)
            .filter(|id| *id != keep)
            .collect();

        for id in &siblings {
            self.set_status(*id, NegotiationStatus::Unavailable)?;
        }

        Ok(siblings)
    }

    /// Seller accepts `id`: append the accept message, mark it accepted and
    /// make every other active negotiation on the listing unavailable.
    ///
    /// Returns the accept message id and the invalidated siblings.
    pub fn accept_and_invalidate(
        &mut self,
        id: NegotiationId,
        seller_id: UserId,
        content: Option<String>,
    ) -> Result<(MessageId, Vec<NegotiationId>)> {
        let listing_id = self.record(id)?.negotiation.listing_id;
        let message_id = self.append_message(
            id,
            NewMessage {
                sender_id: seller_id,
                sender_role: Role::Seller,
                kind: MessageKind::Accept,
                content,
                price: None,
            },
        )?;
        self.set_status(id, NegotiationStatus::Accepted)?;
        let invalidated = self.invalidate_siblings(listing_id, id)?;

        Ok((message_id, invalidated))
    }

    /// Get a negotiation by id
    pub fn get(&self, id: NegotiationId) -> Result<&Negotiation> {
        self.records
            .get(&id)
            .map(|r| &r.negotiation)
            .ok_or_else(|| MarketError::NotFound(id.to_string()))
    }

    /// Get a negotiation by its external document id
    pub fn get_by_document(&self, document_id: &DocumentId) -> Result<&Negotiation> {
        let id = self
            .by_document
            .get(document_id)
            .ok_or_else(|| MarketError::NotFound(format!("document {}", document_id)))?;
        self.get(*id)
    }

    /// Ordered thread of a negotiation
    pub fn thread(&self, id: NegotiationId) -> Result<&[OfferMessage]> {
        self.records
            .get(&id)
            .map(|r| r.thread.as_slice())
            .ok_or_else(|| MarketError::NotFound(id.to_string()))
    }

    /// Negotiation plus its thread
    pub fn detail(&self, id: NegotiationId) -> Result<NegotiationDetail> {
        let record = self
            .records
            .get(&id)
            .ok_or_else(|| MarketError::NotFound(id.to_string()))?;
        Ok(NegotiationDetail {
            negotiation: record.negotiation.clone(),
            thread: record.thread.clone(),
        })
    }

    /// Active negotiation for a (listing, buyer) pair, if any
    pub fn active_for_pair(
        &self,
        listing_id: ListingId,
        buyer_id: UserId,
    ) -> Option<NegotiationId> {
        self.active_by_pair.get(&(listing_id, buyer_id)).copied()
    }

    pub fn list_active_for_listing(&self, listing_id: ListingId) -> Vec<Negotiation> {
        self.collect(|n| n.listing_id == listing_id && n.status.is_active())
    }

    /// Every negotiation on a listing, terminal ones included
    pub fn list_for_listing(&self, listing_id: ListingId) -> Vec<Negotiation> {
        self.collect(|n| n.listing_id == listing_id)
    }

    pub fn list_for_buyer(&self, buyer_id: UserId) -> Vec<Negotiation> {
        self.collect(|n| n.buyer_id == buyer_id)
    }

    pub fn list_for_seller(&self, seller_id: UserId) -> Vec<Negotiation> {
        self.collect(|n| n.seller_id == seller_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Most recently updated first
    fn collect(&self, filter: impl Fn(&Negotiation) -> bool) -> Vec<Negotiation> {
        let mut out: Vec<Negotiation> = self
            .records
            .values()
            .map(|r| &r.negotiation)
            .filter(|n| filter(n))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
        out
    }

    fn record(&self, id: NegotiationId) -> Result<&Record> {
        self.records
            .get(&id)
            .ok_or_else(|| MarketError::NotFound(id.to_string()))
    }

    fn record_mut(&mut self, id: NegotiationId) -> Result<&mut Record> {
        self.records
            .get_mut(&id)
            .ok_or_else(|| MarketError::NotFound(id.to_string()))
    }
}

impl Default for NegotiationStore {
    fn default() -> Self {
        Self::new()
    }
}
