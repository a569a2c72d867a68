//! Listing catalog interface
//!
//! The catalog owns listings. Negotiations only read price, seller and
//! availability, and flip availability off when a deal is accepted.

use crate::error::{MarketError, Result};
use crate::types::{ListingId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Game account listing as seen by the negotiation core
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    pub seller_id: UserId,
    /// Original asking price
    pub price: u64,
    pub available: bool,
    #[serde(default)]
    pub title: String,
}

impl Listing {
    pub fn is_owner(&self, user: UserId) -> bool {
        self.seller_id == user
    }
}

/// Remote listing catalog
pub trait ListingCatalog: Send + Sync + 'static {
    fn get_listing(&self, id: ListingId) -> impl Future<Output = Result<Listing>> + Send;

    /// Mark a listing as no longer for sale. Must be idempotent.
    fn set_unavailable(&self, id: ListingId) -> impl Future<Output = Result<()>> + Send;
}

/// Catalog held in process memory
#[derive(Clone, Default)]
pub struct InMemoryCatalog {
    listings: Arc<Mutex<HashMap<ListingId, Listing>>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from a list of listings
    pub fn with_listings(listings: impl IntoIterator<Item = Listing>) -> Self {
        let map = listings.into_iter().map(|l| (l.id, l)).collect();
        Self {
            listings: Arc::new(Mutex::new(map)),
        }
    }

    /// Load listings from a JSON array file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let listings: Vec<Listing> = serde_json::from_str(&raw)?;
        tracing::info!("Loaded {} listings from {}", listings.len(), path.display());
        Ok(Self::with_listings(listings))
    }

    pub async fn insert(&self, listing: Listing) {
        self.listings.lock().await.insert(listing.id, listing);
    }

    pub async fn all(&self) -> Vec<Listing> {
        let mut out: Vec<Listing> = self.listings.lock().await.values().cloned().collect();
        out.sort_by_key(|l| l.id);
        out
    }
}

impl ListingCatalog for InMemoryCatalog {
    async fn get_listing(&self, id: ListingId) -> Result<Listing> {
        self.listings
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| MarketError::NotFound(id.to_string()))
    }

    async fn set_unavailable(&self, id: ListingId) -> Result<()> {
        let mut listings = self.listings.lock().await;
        let listing = listings
            .get_mut(&id)
            .ok_or_else(|| MarketError::NotFound(id.to_string()))?;
        listing.available = false;
        Ok(())
    }
}
