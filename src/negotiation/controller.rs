//! Negotiation protocol controller
//!
//! Orchestrates buyer and seller moves on top of the entity store and the
//! listing catalog. Every operation takes the caller's id explicitly.

use crate::catalog::{Listing, ListingCatalog};
use crate::error::{MarketError, Result};
use crate::types::{ListingId, MessageId, NegotiationId, Role, UserId};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::store::{NegotiationStore, NewMessage};
use super::types::{
    MessageKind, Negotiation, NegotiationDetail, NegotiationStatus, OfferMessage, SellerAction,
};

/// Outcome of one [`NegotiationController::resume_cascades`] pass
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CascadeReport {
    pub completed: Vec<ListingId>,
    pub failed: Vec<CascadeFailure>,
}

impl CascadeReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CascadeFailure {
    pub listing_id: ListingId,
    pub error: String,
}

/// Negotiation controller shared by the API server and view sessions
pub struct NegotiationController<C> {
    store: Arc<Mutex<NegotiationStore>>,
    catalog: C,
    /// Accepted negotiations whose listing flip has not completed yet
    pending_cascades: Mutex<BTreeMap<ListingId, NegotiationId>>,
}

impl<C: ListingCatalog> NegotiationController<C> {
    /// Create a controller with an empty store
    pub fn new(catalog: C) -> Self {
        Self::with_store(Arc::new(Mutex::new(NegotiationStore::new())), catalog)
    }

    pub fn with_store(store: Arc<Mutex<NegotiationStore>>, catalog: C) -> Self {
        Self {
            store,
            catalog,
            pending_cascades: Mutex::new(BTreeMap::new()),
        }
    }

    /// Get the underlying store
    pub fn store(&self) -> Arc<Mutex<NegotiationStore>> {
        self.store.clone()
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    /// Open a negotiation on a listing, or resume the caller's active one
    pub async fn open_negotiation(
        &self,
        caller: UserId,
        listing_id: ListingId,
        price: u64,
        message: Option<String>,
        contact: String,
    ) -> Result<NegotiationId> {
        let listing = self.catalog.get_listing(listing_id).await?;
        if !listing.available {
            return Err(MarketError::InvalidState(format!(
                "{} is no longer available",
                listing_id
            )));
        }
        if listing.is_owner(caller) {
            return Err(MarketError::Validation(
                "sellers cannot negotiate on their own listing".to_string(),
            ));
        }

        let mut store = self.store.lock().await;

        // An accept may have landed between the catalog read and the lock
        if store
            .list_for_listing(listing_id)
            .iter()
            .any(|n| n.status == NegotiationStatus::Accepted)
        {
            return Err(MarketError::InvalidState(format!(
                "{} is no longer available",
                listing_id
            )));
        }

        if store.active_for_pair(listing_id, caller).is_none() && contact.trim().is_empty() {
            return Err(MarketError::Validation(
                "a contact channel is required".to_string(),
            ));
        }

        let (id, resumed) = store.create_or_resume(
            listing_id,
            listing.seller_id,
            caller,
            price,
            message,
            contact.trim().to_string(),
        )?;

        if resumed {
            tracing::info!("{} resumed {} with offer {}", caller, id, price);
        } else {
            tracing::info!("{} opened {} on {} at {}", caller, id, listing_id, price);
        }
        Ok(id)
    }

    /// Buyer posts a new offer on their negotiation
    pub async fn post_buyer_message(
        &self,
        caller: UserId,
        id: NegotiationId,
        price: u64,
        content: Option<String>,
    ) -> Result<MessageId> {
        let mut store = self.store.lock().await;
        let negotiation = store.get(id)?;
        if negotiation.buyer_id != caller {
            return Err(MarketError::Authorization(format!(
                "{} is not the buyer of {}",
                caller, id
            )));
        }

        let message_id = store.append_buyer_offer(id, caller, price, content)?;

        tracing::info!("Buyer {} offered {} on {}", caller, price, id);
        Ok(message_id)
    }

    /// Seller counters, rejects or accepts
    pub async fn post_seller_message(
        &self,
        caller: UserId,
        id: NegotiationId,
        action: SellerAction,
        content: Option<String>,
        price: Option<u64>,
    ) -> Result<MessageId> {
        let listing_id = self.store.lock().await.get(id)?.listing_id;
        let listing = self.catalog.get_listing(listing_id).await?;
        ensure_owner(&listing, caller)?;

        match action {
            SellerAction::Offer => self.seller_counter(caller, id, content, price).await,
            SellerAction::Reject => self.seller_reject(caller, id, content).await,
            SellerAction::Accept => self.seller_accept(caller, id, listing_id, content).await,
        }
    }

    async fn seller_counter(
        &self,
        caller: UserId,
        id: NegotiationId,
        content: Option<String>,
        price: Option<u64>,
    ) -> Result<MessageId> {
        let mut store = self.store.lock().await;
        let kind = if price.is_some() {
            MessageKind::Offer
        } else {
            MessageKind::Message
        };
        let message_id = store.append_message(
            id,
            NewMessage {
                sender_id: caller,
                sender_role: Role::Seller,
                kind,
                content,
                price,
            },
        )?;
        store.set_status(id, NegotiationStatus::Pending)?;

        match price {
            Some(price) => tracing::info!("Seller {} countered {} on {}", caller, price, id),
            None => tracing::debug!("Seller {} replied on {}", caller, id),
        }
        Ok(message_id)
    }

    async fn seller_reject(
        &self,
        caller: UserId,
        id: NegotiationId,
        content: Option<String>,
    ) -> Result<MessageId> {
        let mut store = self.store.lock().await;
        let message_id = store.append_message(
            id,
            NewMessage {
                sender_id: caller,
                sender_role: Role::Seller,
                kind: MessageKind::Reject,
                content,
                price: None,
            },
        )?;
        store.set_status(id, NegotiationStatus::Rejected)?;

        tracing::info!("Seller {} rejected {}", caller, id);
        Ok(message_id)
    }

    /// Accept `id`, lock out competing negotiations on the listing, then
    /// take the listing off sale. The accepted status is never rolled back;
    /// if the catalog flip fails the cascade stays queued for
    /// [`resume_cascades`](Self::resume_cascades).
    async fn seller_accept(
        &self,
        caller: UserId,
        id: NegotiationId,
        listing_id: ListingId,
        content: Option<String>,
    ) -> Result<MessageId> {
        let message_id = {
            let mut store = self.store.lock().await;
            let (message_id, invalidated) = store.accept_and_invalidate(id, caller, content)?;

            // Queue while still holding the store lock so no other accept
            // on this listing can interleave
            self.pending_cascades.lock().await.insert(listing_id, id);

            tracing::info!(
                "Seller {} accepted {}; {} competing negotiation(s) now unavailable",
                caller,
                id,
                invalidated.len()
            );
            message_id
        };

        self.complete_cascade(listing_id).await?;
        Ok(message_id)
    }

    async fn complete_cascade(&self, listing_id: ListingId) -> Result<()> {
        match self.catalog.set_unavailable(listing_id).await {
            Ok(()) => {
                self.pending_cascades.lock().await.remove(&listing_id);
                tracing::info!("{} marked unavailable", listing_id);
                Ok(())
            }
            Err(MarketError::NotFound(_)) => {
                // Nothing left to take off sale
                self.pending_cascades.lock().await.remove(&listing_id);
                tracing::warn!("{} is gone from the catalog, dropping its cascade", listing_id);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Cascade for {} incomplete, queued for retry: {}", listing_id, e);
                Err(match e {
                    MarketError::Transient(_) => e,
                    other => MarketError::Transient(other.to_string()),
                })
            }
        }
    }

    /// Retry every queued accept cascade. A listing that still fails stays
    /// queued and does not hold back the others.
    pub async fn resume_cascades(&self) -> CascadeReport {
        let queued: Vec<(ListingId, NegotiationId)> = self
            .pending_cascades
            .lock()
            .await
            .iter()
            .map(|(l, n)| (*l, *n))
            .collect();

        let mut report = CascadeReport::default();
        for (listing_id, accepted) in queued {
            match self.retry_cascade(listing_id, accepted).await {
                Ok(()) => report.completed.push(listing_id),
                Err(e) => report.failed.push(CascadeFailure {
                    listing_id,
                    error: e.to_string(),
                }),
            }
        }
        report
    }

    async fn retry_cascade(&self, listing_id: ListingId, accepted: NegotiationId) -> Result<()> {
        self.store
            .lock()
            .await
            .invalidate_siblings(listing_id, accepted)?;
        self.complete_cascade(listing_id).await
    }

    /// Listings whose accept cascade still needs to finish
    pub async fn pending_cascades(&self) -> Vec<ListingId> {
        self.pending_cascades.lock().await.keys().copied().collect()
    }

    /// Ordered thread, visible to the buyer and the seller only
    pub async fn get_negotiation_thread(
        &self,
        caller: UserId,
        id: NegotiationId,
    ) -> Result<Vec<OfferMessage>> {
        let store = self.store.lock().await;
        ensure_party(store.get(id)?, caller)?;
        Ok(store.thread(id)?.to_vec())
    }

    /// Negotiation and thread in one read
    pub async fn get_negotiation(
        &self,
        caller: UserId,
        id: NegotiationId,
    ) -> Result<NegotiationDetail> {
        let store = self.store.lock().await;
        ensure_party(store.get(id)?, caller)?;
        store.detail(id)
    }

    pub async fn list_my_negotiations(&self, caller: UserId, role: Role) -> Vec<Negotiation> {
        let store = self.store.lock().await;
        match role {
            Role::Buyer => store.list_for_buyer(caller),
            Role::Seller => store.list_for_seller(caller),
        }
    }

    /// All offers on one listing, for its seller
    pub async fn list_for_listing(
        &self,
        caller: UserId,
        listing_id: ListingId,
    ) -> Result<Vec<Negotiation>> {
        let listing = self.catalog.get_listing(listing_id).await?;
        ensure_owner(&listing, caller)?;
        Ok(self.store.lock().await.list_for_listing(listing_id))
    }
}

fn ensure_owner(listing: &Listing, caller: UserId) -> Result<()> {
    if listing.is_owner(caller) {
        Ok(())
    } else {
        Err(MarketError::Authorization(format!(
            "{} does not own {}",
            caller, listing.id
        )))
    }
}

fn ensure_party(negotiation: &Negotiation, caller: UserId) -> Result<()> {
    negotiation.role_of(caller).map(|_| ()).ok_or_else(|| {
        MarketError::Authorization(format!("{} is not part of {}", caller, negotiation.id))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use std::collections::HashMap;
    use tokio_test::{assert_err, assert_ok};

    const LISTING: ListingId = ListingId(42);
    const SELLER: UserId = UserId(1);
    const BUYER_A: UserId = UserId(2);
    const BUYER_B: UserId = UserId(3);

    fn listing(id: u64) -> Listing {
        Listing {
            id: ListingId(id),
            seller_id: SELLER,
            price: 100_000_000,
            available: true,
            title: "VIP 19 cavalry".to_string(),
        }
    }

    fn catalog() -> InMemoryCatalog {
        InMemoryCatalog::with_listings([listing(42)])
    }

    async fn open(
        controller: &NegotiationController<impl ListingCatalog>,
        buyer: UserId,
        price: u64,
    ) -> NegotiationId {
        open_on(controller, LISTING, buyer, price).await
    }

    async fn open_on(
        controller: &NegotiationController<impl ListingCatalog>,
        listing_id: ListingId,
        buyer: UserId,
        price: u64,
    ) -> NegotiationId {
        controller
            .open_negotiation(buyer, listing_id, price, Some("deal?".into()), "0900111222".into())
            .await
            .unwrap()
    }

    async fn status(
        controller: &NegotiationController<impl ListingCatalog>,
        id: NegotiationId,
    ) -> NegotiationStatus {
        controller.store().lock().await.get(id).unwrap().status
    }

    /// Catalog whose availability flip fails on demand
    struct FlakyCatalog {
        inner: InMemoryCatalog,
        /// Transient failures left per listing
        failures: std::sync::Mutex<HashMap<ListingId, usize>>,
        /// Listings whose flip reports them missing
        vanished: Vec<ListingId>,
    }

    impl FlakyCatalog {
        fn new(listings: &[u64], failures: &[(u64, usize)], vanished: &[u64]) -> Self {
            Self {
                inner: InMemoryCatalog::with_listings(listings.iter().map(|id| listing(*id))),
                failures: std::sync::Mutex::new(
                    failures.iter().map(|(id, n)| (ListingId(*id), *n)).collect(),
                ),
                vanished: vanished.iter().map(|id| ListingId(*id)).collect(),
            }
        }
    }

    impl ListingCatalog for FlakyCatalog {
        async fn get_listing(&self, id: ListingId) -> Result<Listing> {
            self.inner.get_listing(id).await
        }

        async fn set_unavailable(&self, id: ListingId) -> Result<()> {
            if self.vanished.contains(&id) {
                return Err(MarketError::NotFound(id.to_string()));
            }
            let fail = {
                let mut failures = self.failures.lock().unwrap();
                match failures.get_mut(&id) {
                    Some(left) if *left > 0 => {
                        *left -= 1;
                        true
                    }
                    _ => false,
                }
            };
            if fail {
                return Err(MarketError::Transient("catalog timeout".into()));
            }
            self.inner.set_unavailable(id).await
        }
    }

    #[tokio::test]
    async fn test_open_counter_accept_scenario() {
        let controller = NegotiationController::new(catalog());

        let id = open(&controller, BUYER_A, 90_000_000).await;
        assert_eq!(status(&controller, id).await, NegotiationStatus::Pending);
        assert_eq!(controller.get_negotiation_thread(BUYER_A, id).await.unwrap().len(), 1);

        controller
            .post_seller_message(SELLER, id, SellerAction::Offer, None, Some(95_000_000))
            .await
            .unwrap();
        let thread = controller.get_negotiation_thread(SELLER, id).await.unwrap();
        assert_eq!(thread.len(), 2);
        assert_eq!(thread[1].kind, MessageKind::Offer);
        assert_eq!(status(&controller, id).await, NegotiationStatus::Pending);

        controller
            .post_seller_message(SELLER, id, SellerAction::Accept, None, None)
            .await
            .unwrap();
        assert_eq!(status(&controller, id).await, NegotiationStatus::Accepted);
        assert!(!controller.catalog().get_listing(LISTING).await.unwrap().available);
        assert!(controller.pending_cascades().await.is_empty());

        let thread = controller.get_negotiation_thread(BUYER_A, id).await.unwrap();
        assert_eq!(thread.last().unwrap().kind, MessageKind::Accept);
    }

    #[tokio::test]
    async fn test_open_twice_resumes() {
        let controller = NegotiationController::new(catalog());
        let first = open(&controller, BUYER_A, 90_000_000).await;
        let second = open(&controller, BUYER_A, 91_000_000).await;

        assert_eq!(first, second);
        assert_eq!(controller.list_my_negotiations(BUYER_A, Role::Buyer).await.len(), 1);
        assert_eq!(controller.get_negotiation_thread(BUYER_A, first).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_opens_yield_one_negotiation() {
        let controller = Arc::new(NegotiationController::new(catalog()));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let controller = controller.clone();
                tokio::spawn(async move {
                    controller
                        .open_negotiation(BUYER_A, LISTING, 90_000_000 + i, None, "0900".into())
                        .await
                })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(controller.get_negotiation_thread(BUYER_A, ids[0]).await.unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_accept_invalidates_competitors() {
        let controller = NegotiationController::new(catalog());
        let a = open(&controller, BUYER_A, 90_000_000).await;
        let b = open(&controller, BUYER_B, 92_000_000).await;

        controller
            .post_seller_message(SELLER, a, SellerAction::Accept, Some("deal".into()), None)
            .await
            .unwrap();

        assert_eq!(status(&controller, a).await, NegotiationStatus::Accepted);
        assert_eq!(status(&controller, b).await, NegotiationStatus::Unavailable);

        let before = controller.get_negotiation_thread(BUYER_B, b).await.unwrap().len();
        let result = controller.post_buyer_message(BUYER_B, b, 95_000_000, None).await;
        assert!(matches!(result, Err(MarketError::InvalidState(_))));
        let after = controller.get_negotiation_thread(BUYER_B, b).await.unwrap().len();
        assert_eq!(before, after);

        // nobody can open a fresh negotiation on a sold listing
        let reopen = controller
            .open_negotiation(BUYER_B, LISTING, 99_000_000, None, "0900".into())
            .await;
        assert!(matches!(reopen, Err(MarketError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_terminal_negotiation_rejects_everything() {
        let controller = NegotiationController::new(catalog());
        let id = open(&controller, BUYER_A, 90_000_000).await;
        controller
            .post_seller_message(SELLER, id, SellerAction::Reject, None, None)
            .await
            .unwrap();
        assert_eq!(status(&controller, id).await, NegotiationStatus::Rejected);

        let len = controller.get_negotiation_thread(BUYER_A, id).await.unwrap().len();
        assert_err!(controller.post_buyer_message(BUYER_A, id, 1_000, None).await);
        assert_err!(
            controller
                .post_seller_message(SELLER, id, SellerAction::Offer, None, Some(1_000))
                .await
        );
        let accept = controller
            .post_seller_message(SELLER, id, SellerAction::Accept, None, None)
            .await;
        assert!(matches!(accept, Err(MarketError::InvalidState(_))));
        assert_eq!(controller.get_negotiation_thread(BUYER_A, id).await.unwrap().len(), len);
        // listing stays on sale after a rejection
        assert!(controller.catalog().get_listing(LISTING).await.unwrap().available);
    }

    #[tokio::test]
    async fn test_buyer_counter_waits_for_seller() {
        let controller = NegotiationController::new(catalog());
        let id = open(&controller, BUYER_A, 90_000_000).await;

        controller.post_buyer_message(BUYER_A, id, 91_000_000, None).await.unwrap();
        assert_eq!(status(&controller, id).await, NegotiationStatus::Pending);

        controller
            .post_seller_message(SELLER, id, SellerAction::Offer, None, Some(97_000_000))
            .await
            .unwrap();
        controller
            .post_buyer_message(BUYER_A, id, 93_000_000, Some("meet me halfway".into()))
            .await
            .unwrap();
        assert_eq!(status(&controller, id).await, NegotiationStatus::WaitingForSeller);

        let thread = controller.get_negotiation_thread(BUYER_A, id).await.unwrap();
        assert_eq!(thread.last().unwrap().kind, MessageKind::Counter);

        controller
            .post_seller_message(SELLER, id, SellerAction::Offer, Some("final".into()), None)
            .await
            .unwrap();
        assert_eq!(status(&controller, id).await, NegotiationStatus::Pending);
        let detail = controller.get_negotiation(SELLER, id).await.unwrap();
        assert_eq!(detail.negotiation.current_offer, Some(93_000_000));
    }

    #[tokio::test]
    async fn test_authorization() {
        let controller = NegotiationController::new(catalog());
        let id = open(&controller, BUYER_A, 90_000_000).await;

        let accept = controller
            .post_seller_message(BUYER_B, id, SellerAction::Accept, None, None)
            .await;
        assert!(matches!(accept, Err(MarketError::Authorization(_))));

        let post = controller.post_buyer_message(BUYER_B, id, 1_000, None).await;
        assert!(matches!(post, Err(MarketError::Authorization(_))));

        let read = controller.get_negotiation_thread(UserId(99), id).await;
        assert!(matches!(read, Err(MarketError::Authorization(_))));

        let per_listing = controller.list_for_listing(BUYER_A, LISTING).await;
        assert!(matches!(per_listing, Err(MarketError::Authorization(_))));
        assert_eq!(assert_ok!(controller.list_for_listing(SELLER, LISTING).await).len(), 1);

        assert_eq!(status(&controller, id).await, NegotiationStatus::Pending);
    }

    #[tokio::test]
    async fn test_open_validation() {
        let controller = NegotiationController::new(catalog());

        let zero = controller
            .open_negotiation(BUYER_A, LISTING, 0, None, "0900".into())
            .await;
        assert!(matches!(zero, Err(MarketError::Validation(_))));

        let own = controller
            .open_negotiation(SELLER, LISTING, 90_000_000, None, "0900".into())
            .await;
        assert!(matches!(own, Err(MarketError::Validation(_))));

        let no_contact = controller
            .open_negotiation(BUYER_A, LISTING, 90_000_000, None, "  ".into())
            .await;
        assert!(matches!(no_contact, Err(MarketError::Validation(_))));

        let missing = controller
            .open_negotiation(BUYER_A, ListingId(7), 90_000_000, None, "0900".into())
            .await;
        assert!(matches!(missing, Err(MarketError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_failed_flip_keeps_accept_and_retries() {
        let controller = NegotiationController::new(FlakyCatalog::new(&[42], &[(42, 1)], &[]));
        let a = open(&controller, BUYER_A, 90_000_000).await;
        let b = open(&controller, BUYER_B, 90_000_000).await;

        let result = controller
            .post_seller_message(SELLER, a, SellerAction::Accept, None, None)
            .await;
        let err = result.unwrap_err();
        assert!(err.is_retryable());

        assert_eq!(status(&controller, a).await, NegotiationStatus::Accepted);
        assert_eq!(status(&controller, b).await, NegotiationStatus::Unavailable);
        assert_eq!(controller.pending_cascades().await, vec![LISTING]);
        assert!(controller.catalog().inner.get_listing(LISTING).await.unwrap().available);

        let report = controller.resume_cascades().await;
        assert_eq!(report.completed, vec![LISTING]);
        assert!(report.is_clean());
        assert!(controller.pending_cascades().await.is_empty());
        assert!(!controller.catalog().inner.get_listing(LISTING).await.unwrap().available);
        assert_eq!(status(&controller, a).await, NegotiationStatus::Accepted);
    }

    #[tokio::test]
    async fn test_stuck_cascade_does_not_block_others() {
        let catalog = FlakyCatalog::new(&[42, 43], &[(42, usize::MAX), (43, 1)], &[]);
        let controller = NegotiationController::new(catalog);
        let on_42 = open_on(&controller, ListingId(42), BUYER_A, 90_000_000).await;
        let on_43 = open_on(&controller, ListingId(43), BUYER_A, 30_000_000).await;

        for id in [on_42, on_43] {
            let result = controller
                .post_seller_message(SELLER, id, SellerAction::Accept, None, None)
                .await;
            assert!(matches!(result, Err(MarketError::Transient(_))));
        }
        assert_eq!(controller.pending_cascades().await, vec![ListingId(42), ListingId(43)]);

        let report = controller.resume_cascades().await;
        assert_eq!(report.completed, vec![ListingId(43)]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].listing_id, ListingId(42));
        assert_eq!(controller.pending_cascades().await, vec![ListingId(42)]);

        let inner = &controller.catalog().inner;
        assert!(!inner.get_listing(ListingId(43)).await.unwrap().available);
        assert!(inner.get_listing(ListingId(42)).await.unwrap().available);
    }

    #[tokio::test]
    async fn test_vanished_listing_drops_cascade() {
        let controller = NegotiationController::new(FlakyCatalog::new(&[42], &[], &[42]));
        let a = open(&controller, BUYER_A, 90_000_000).await;
        let b = open(&controller, BUYER_B, 91_000_000).await;

        assert_ok!(
            controller
                .post_seller_message(SELLER, a, SellerAction::Accept, None, None)
                .await
        );
        assert!(controller.pending_cascades().await.is_empty());
        assert_eq!(status(&controller, a).await, NegotiationStatus::Accepted);
        assert_eq!(status(&controller, b).await, NegotiationStatus::Unavailable);
    }

    #[tokio::test]
    async fn test_closed_negotiation_reports_state_before_payload() {
        let controller = NegotiationController::new(catalog());
        let id = open(&controller, BUYER_A, 90_000_000).await;
        controller
            .post_seller_message(SELLER, id, SellerAction::Reject, None, None)
            .await
            .unwrap();

        let zero = controller.post_buyer_message(BUYER_A, id, 0, None).await;
        assert!(matches!(zero, Err(MarketError::InvalidState(_))));

        let empty = controller
            .post_seller_message(SELLER, id, SellerAction::Offer, None, None)
            .await;
        assert!(matches!(empty, Err(MarketError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_buyer_offer_after_plain_seller_message_stays_pending() {
        let controller = NegotiationController::new(catalog());
        let id = open(&controller, BUYER_A, 90_000_000).await;

        controller
            .post_seller_message(SELLER, id, SellerAction::Offer, Some("let me think".into()), None)
            .await
            .unwrap();
        controller.post_buyer_message(BUYER_A, id, 91_000_000, None).await.unwrap();

        assert_eq!(status(&controller, id).await, NegotiationStatus::Pending);
        let thread = controller.get_negotiation_thread(BUYER_A, id).await.unwrap();
        assert_eq!(thread.last().unwrap().kind, MessageKind::Offer);
    }

    #[tokio::test]
    async fn test_reopen_after_seller_counter_matches_buyer_post() {
        let controller = NegotiationController::new(catalog());
        let id = open(&controller, BUYER_A, 90_000_000).await;
        controller
            .post_seller_message(SELLER, id, SellerAction::Offer, None, Some(97_000_000))
            .await
            .unwrap();

        assert_eq!(open(&controller, BUYER_A, 93_000_000).await, id);
        assert_eq!(status(&controller, id).await, NegotiationStatus::WaitingForSeller);
        let thread = controller.get_negotiation_thread(BUYER_A, id).await.unwrap();
        assert_eq!(thread.last().unwrap().kind, MessageKind::Counter);
    }
}
