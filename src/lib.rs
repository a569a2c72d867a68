//! Tradepost
//!
//! Negotiation core for a game-account storefront: buyers make offers on
//! listings, sellers counter, reject or accept, and accepting one offer
//! locks out every competing negotiation on the same listing.
//!
//! - [`negotiation`]: entity store, status machine and protocol controller
//! - [`session`]: per-user read model with polling
//! - [`pricing`]: suggested asking price from account attributes
//! - [`api`]: JSON-lines TCP surface

pub mod api;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod negotiation;
pub mod pricing;
pub mod session;
pub mod types;

// Re-export commonly used types
pub use catalog::{InMemoryCatalog, Listing, ListingCatalog};
pub use error::{MarketError, Result};
pub use negotiation::{
    MessageKind, Negotiation, NegotiationController, NegotiationStatus, NegotiationStore,
    OfferMessage, SellerAction,
};
pub use pricing::{suggest_price, AccountAttributes};
pub use session::{Affordance, ViewSession};
pub use types::{ListingId, MessageId, NegotiationId, Role, UserId};
