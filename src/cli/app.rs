//! Tradepost application wiring catalog, controller and API server

use crate::api::ApiServer;
use crate::catalog::{InMemoryCatalog, Listing};
use crate::config::Config;
use crate::error::Result;
use crate::negotiation::{NegotiationController, SellerAction};
use crate::pricing::format_short;
use crate::session::{poll_selected, ViewSession};
use crate::types::{ListingId, UserId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Main Tradepost application
#[derive(Clone)]
pub struct TradepostApp {
    config: Config,
    controller: Arc<NegotiationController<InMemoryCatalog>>,
}

impl TradepostApp {
    /// Create the application, seeding the catalog from the configured file
    pub fn new(config: Config) -> Result<Self> {
        let catalog = match &config.listings_file {
            Some(path) => InMemoryCatalog::from_json_file(path)?,
            None => InMemoryCatalog::new(),
        };

        Ok(Self::with_catalog(config, catalog))
    }

    pub fn with_catalog(config: Config, catalog: InMemoryCatalog) -> Self {
        Self {
            config,
            controller: Arc::new(NegotiationController::new(catalog)),
        }
    }

    /// Get negotiation controller
    pub fn controller(&self) -> Arc<NegotiationController<InMemoryCatalog>> {
        self.controller.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Serve the API and retry unfinished accept cascades in the background
    pub async fn serve(&self) -> Result<()> {
        let server = ApiServer::bind(&self.config.listen_addr, self.controller.clone()).await?;

        let controller = self.controller.clone();
        let interval = self.config.poll_interval;
        tokio::spawn(async move { retry_cascades(controller, interval).await });

        server.run().await
    }

    /// Scripted negotiation between two buyers and one seller
    pub async fn run_demo(&self) -> Result<()> {
        let seller = UserId(1);
        let (buyer_a, buyer_b) = (UserId(2), UserId(3));
        let listing_id = ListingId(42);

        self.controller
            .catalog()
            .insert(Listing {
                id: listing_id,
                seller_id: seller,
                price: 100_000_000,
                available: true,
                title: "VIP 19 cavalry account".to_string(),
            })
            .await;

        let a = self
            .controller
            .open_negotiation(
                buyer_a,
                listing_id,
                90_000_000,
                Some("Would you take 90tr?".to_string()),
                "zalo 0900 111 222".to_string(),
            )
            .await?;
        let b = self
            .controller
            .open_negotiation(
                buyer_b,
                listing_id,
                85_000_000,
                None,
                "zalo 0900 333 444".to_string(),
            )
            .await?;

        let seller_view = Arc::new(Mutex::new(ViewSession::new(self.controller.clone(), seller)));
        let loser_view = Arc::new(Mutex::new(ViewSession::new(self.controller.clone(), buyer_b)));
        seller_view.lock().await.select(a).await?;
        loser_view.lock().await.refresh().await?;

        seller_view
            .lock()
            .await
            .respond(SellerAction::Offer, Some("95.000.000"), "95tr and it's yours")
            .await?;
        self.controller
            .post_buyer_message(buyer_a, a, 93_000_000, Some("93tr?".to_string()))
            .await?;
        poll_selected(&seller_view).await?;
        {
            let view = seller_view.lock().await;
            tracing::info!(
                "Seller sees {} at {}",
                a,
                view.current_offer().map(format_short).unwrap_or_default()
            );
        }

        seller_view
            .lock()
            .await
            .respond(SellerAction::Accept, None, "Deal")
            .await?;
        poll_selected(&loser_view).await?;

        let seller_state = seller_view.lock().await.affordance();
        let loser_state = loser_view.lock().await.affordance();
        let listings = self.controller.catalog().all().await;

        tracing::info!("Seller view after accept: {:?}", seller_state);
        tracing::info!("Buyer {} on {} now sees: {:?}", buyer_b, b, loser_state);
        for listing in listings {
            tracing::info!("{} available={}", listing.id, listing.available);
        }

        Ok(())
    }
}

async fn retry_cascades(
    controller: Arc<NegotiationController<InMemoryCatalog>>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        if controller.pending_cascades().await.is_empty() {
            continue;
        }
        let report = controller.resume_cascades().await;
        if !report.completed.is_empty() {
            tracing::info!("Completed {} pending accept cascade(s)", report.completed.len());
        }
        for failure in &report.failed {
            tracing::warn!("Cascade for {} still pending: {}", failure.listing_id, failure.error);
        }
    }
}
