//! Negotiation module: offer threads, status machine and the buyer/seller protocol

pub mod controller;
pub mod store;
pub mod types;

pub use controller::{CascadeFailure, CascadeReport, NegotiationController};
pub use store::{NegotiationStore, NewMessage};
pub use types::{
    current_offer, MessageKind, Negotiation, NegotiationDetail, NegotiationStatus, OfferMessage,
    SellerAction,
};
