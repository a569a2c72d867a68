//! Per-user negotiation view
//!
//! Mirrors what a signed-in user sees on the negotiations page: the
//! negotiations they started as buyer, the ones on their own listings, the
//! selected thread, and which controls are legal right now. The selected
//! thread is kept fresh by polling, which stops once the negotiation is
//! terminal.

use crate::catalog::ListingCatalog;
use crate::error::{MarketError, Result};
use crate::negotiation::{
    current_offer, Negotiation, NegotiationController, NegotiationDetail, NegotiationStatus,
    SellerAction,
};
use crate::types::{MessageId, NegotiationId, Role, UserId};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

/// Default poll interval for the selected thread
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Controls the UI should offer for the selected negotiation
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Affordance {
    /// Buyer may send a new price
    OfferForm,
    /// Seller may accept, reject or counter
    SellerControls,
    /// Deal done. The seller sees the buyer's contact; the buyer gets `None`
    /// and waits to be contacted.
    ContactDisclosure { contact: Option<String> },
    /// Read-only closed negotiation
    TerminalBanner { status: NegotiationStatus },
}

/// Affordance as a pure function of status and role
pub fn affordance_for(negotiation: &Negotiation, role: Role) -> Affordance {
    match (negotiation.status, role) {
        (status, Role::Buyer) if status.is_active() => Affordance::OfferForm,
        (status, Role::Seller) if status.is_active() => Affordance::SellerControls,
        (NegotiationStatus::Accepted, Role::Seller) => Affordance::ContactDisclosure {
            contact: Some(negotiation.contact.clone()),
        },
        (NegotiationStatus::Accepted, Role::Buyer) => {
            Affordance::ContactDisclosure { contact: None }
        }
        (status, _) => Affordance::TerminalBanner { status },
    }
}

/// Text the user has typed but not successfully sent
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Draft {
    pub price: String,
    pub message: String,
}

/// Identifies which selection a poll was started for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollTicket {
    pub negotiation_id: NegotiationId,
    generation: u64,
}

/// Result of one poll round
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing selected, or the selected negotiation is terminal
    Suspended,
    Applied,
    /// Selection changed while the poll was in flight
    Discarded,
}

/// View state for one signed-in user
pub struct ViewSession<C> {
    controller: Arc<NegotiationController<C>>,
    user: UserId,
    as_buyer: Vec<Negotiation>,
    as_seller: Vec<Negotiation>,
    selected_id: Option<NegotiationId>,
    selected: Option<NegotiationDetail>,
    generation: u64,
    draft: Draft,
}

impl<C: ListingCatalog> ViewSession<C> {
    pub fn new(controller: Arc<NegotiationController<C>>, user: UserId) -> Self {
        Self {
            controller,
            user,
            as_buyer: Vec::new(),
            as_seller: Vec::new(),
            selected_id: None,
            selected: None,
            generation: 0,
            draft: Draft::default(),
        }
    }

    pub fn user(&self) -> UserId {
        self.user
    }

    pub fn as_buyer(&self) -> &[Negotiation] {
        &self.as_buyer
    }

    pub fn as_seller(&self) -> &[Negotiation] {
        &self.as_seller
    }

    pub fn selected(&self) -> Option<&NegotiationDetail> {
        self.selected.as_ref()
    }

    pub fn draft(&self) -> &Draft {
        &self.draft
    }

    /// Reload both lists. With nothing selected, picks the first buyer
    /// negotiation, else the first seller one.
    pub async fn refresh(&mut self) -> Result<()> {
        self.as_buyer = self
            .controller
            .list_my_negotiations(self.user, Role::Buyer)
            .await;
        self.as_seller = self
            .controller
            .list_my_negotiations(self.user, Role::Seller)
            .await;

        let target = self.selected_id.or_else(|| {
            self.as_buyer
                .first()
                .or_else(|| self.as_seller.first())
                .map(|n| n.id)
        });

        match target {
            Some(id) if Some(id) == self.selected_id => self.reload_selected().await,
            Some(id) => self.select(id).await,
            None => Ok(()),
        }
    }

    /// Switch to another negotiation; in-flight polls for the previous one
    /// are discarded.
    pub async fn select(&mut self, id: NegotiationId) -> Result<()> {
        self.generation += 1;
        self.selected_id = Some(id);
        self.selected = None;
        self.draft = Draft::default();
        self.reload_selected().await
    }

    async fn reload_selected(&mut self) -> Result<()> {
        let Some(id) = self.selected_id else {
            return Ok(());
        };
        let detail = self.controller.get_negotiation(self.user, id).await?;
        self.store_detail(detail);
        Ok(())
    }

    fn store_detail(&mut self, detail: NegotiationDetail) {
        let updated = &detail.negotiation;
        for entry in self.as_buyer.iter_mut().chain(self.as_seller.iter_mut()) {
            if entry.id == updated.id {
                *entry = updated.clone();
            }
        }
        self.selected = Some(detail);
    }

    /// The user's side of the selected negotiation. Taken from the loaded
    /// negotiation when there is one, so it holds before any `refresh`.
    pub fn role(&self) -> Option<Role> {
        let id = self.selected_id?;
        if let Some(detail) = self.selected.as_ref().filter(|d| d.negotiation.id == id) {
            return detail.negotiation.role_of(self.user);
        }
        if self.as_buyer.iter().any(|n| n.id == id) {
            Some(Role::Buyer)
        } else {
            Some(Role::Seller)
        }
    }

    /// Price shown to both parties for the selected negotiation
    pub fn current_offer(&self) -> Option<u64> {
        self.selected
            .as_ref()
            .and_then(|d| current_offer(&d.thread))
            .and_then(|m| m.price)
    }

    pub fn affordance(&self) -> Option<Affordance> {
        let detail = self.selected.as_ref()?;
        Some(affordance_for(&detail.negotiation, self.role()?))
    }

    /// Start a poll for the selection, unless there is nothing to poll
    pub fn begin_poll(&self) -> Option<PollTicket> {
        let negotiation_id = self.selected_id?;
        if let Some(detail) = &self.selected {
            if detail.negotiation.status.is_terminal() {
                return None;
            }
        }
        Some(PollTicket {
            negotiation_id,
            generation: self.generation,
        })
    }

    /// Apply a poll result if the selection has not changed since
    /// [`begin_poll`](Self::begin_poll)
    pub fn apply_poll(&mut self, ticket: PollTicket, detail: NegotiationDetail) -> bool {
        if ticket.generation != self.generation
            || self.selected_id != Some(ticket.negotiation_id)
            || detail.negotiation.id != ticket.negotiation_id
        {
            return false;
        }
        self.store_detail(detail);
        true
    }

    /// Buyer sends a new offer for the selected negotiation
    pub async fn submit_offer(&mut self, price_text: &str, message: &str) -> Result<MessageId> {
        self.draft = Draft {
            price: price_text.to_string(),
            message: message.to_string(),
        };
        let id = self.require_role(Role::Buyer)?;
        let price = parse_price(price_text)?;

        let result = self
            .controller
            .post_buyer_message(self.user, id, price, non_empty(message))
            .await;
        self.after_action(result).await
    }

    /// Seller counters, rejects or accepts the selected negotiation
    pub async fn respond(
        &mut self,
        action: SellerAction,
        price_text: Option<&str>,
        message: &str,
    ) -> Result<MessageId> {
        self.draft = Draft {
            price: price_text.unwrap_or_default().to_string(),
            message: message.to_string(),
        };
        let id = self.require_role(Role::Seller)?;
        let price = match price_text.filter(|t| !t.trim().is_empty()) {
            Some(text) => Some(parse_price(text)?),
            None => None,
        };

        let result = self
            .controller
            .post_seller_message(self.user, id, action, non_empty(message), price)
            .await;
        self.after_action(result).await
    }

    fn require_role(&self, role: Role) -> Result<NegotiationId> {
        let id = self
            .selected_id
            .ok_or_else(|| MarketError::Validation("no negotiation selected".to_string()))?;
        if self.role() != Some(role) {
            return Err(MarketError::Authorization(format!(
                "only the {} can do this on {}",
                role, id
            )));
        }
        Ok(id)
    }

    /// Clear the draft on success, keep it on failure, and reload the
    /// thread when the negotiation turned out to be closed
    async fn after_action(&mut self, result: Result<MessageId>) -> Result<MessageId> {
        match result {
            Ok(message_id) => {
                self.draft = Draft::default();
                if let Err(e) = self.reload_selected().await {
                    tracing::warn!("Refresh after {} failed: {}", message_id, e);
                }
                Ok(message_id)
            }
            Err(e) => {
                if matches!(e, MarketError::InvalidState(_)) {
                    if let Err(reload) = self.reload_selected().await {
                        tracing::warn!("Refresh after closed negotiation failed: {}", reload);
                    }
                }
                Err(e)
            }
        }
    }
}

/// One poll round against the shared session. The session lock is not held
/// while the store is queried.
pub async fn poll_selected<C: ListingCatalog>(
    session: &Mutex<ViewSession<C>>,
) -> Result<PollOutcome> {
    let (ticket, controller, user) = {
        let guard = session.lock().await;
        match guard.begin_poll() {
            Some(ticket) => (ticket, guard.controller.clone(), guard.user),
            None => return Ok(PollOutcome::Suspended),
        }
    };

    let detail = controller
        .get_negotiation(user, ticket.negotiation_id)
        .await?;

    if session.lock().await.apply_poll(ticket, detail) {
        Ok(PollOutcome::Applied)
    } else {
        Ok(PollOutcome::Discarded)
    }
}

/// Poll the selected thread every `interval` until `shutdown` flips
pub fn spawn_poller<C: ListingCatalog>(
    session: Arc<Mutex<ViewSession<C>>>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match poll_selected(&session).await {
                        Ok(PollOutcome::Applied) => {}
                        Ok(PollOutcome::Suspended) => tracing::trace!("Polling suspended"),
                        Ok(PollOutcome::Discarded) => tracing::debug!("Dropped stale poll result"),
                        Err(e) => tracing::warn!("Poll failed: {}", e),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("Poller stopped");
    })
}

/// Parse a typed price, ignoring digit grouping (`95.000.000`, `95,000,000`)
pub fn parse_price(text: &str) -> Result<u64> {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return Err(MarketError::Validation("enter a price".to_string()));
    }
    match digits.parse::<u64>() {
        Ok(0) => Err(MarketError::Validation(
            "price must be a positive amount".to_string(),
        )),
        Ok(price) => Ok(price),
        Err(_) => Err(MarketError::Validation("price is too large".to_string())),
    }
}

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
