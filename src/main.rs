//! Tradepost CLI binary

use clap::Parser;
use std::time::Duration;
use tradepost::cli::{Cli, Commands, TradepostApp};
use tradepost::config::Config;
use tradepost::pricing::{format_short, suggest_price, AccountAttributes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            listen,
            listings,
            poll_interval,
        } => {
            let mut config = Config::load()?;
            if let Some(addr) = listen {
                config.listen_addr = addr;
            }
            if let Some(path) = listings {
                config.listings_file = Some(path);
            }
            if let Some(secs) = poll_interval {
                anyhow::ensure!(secs > 0, "poll interval must be at least 1 second");
                config.poll_interval = Duration::from_secs(secs);
            }

            tracing::info!("Starting Tradepost on {}", config.listen_addr);
            let app = TradepostApp::new(config)?;

            tokio::select! {
                result = app.serve() => result?,
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Shutting down");
                }
            }
        }

        Commands::SuggestPrice(args) => {
            let attributes = AccountAttributes::from(args);
            let price = suggest_price(&attributes);
            tracing::info!("Suggested price: {} ({})", price, format_short(price));
        }

        Commands::Demo => {
            let app = TradepostApp::new(Config::load()?)?;
            app.run_demo().await?;
        }
    }

    Ok(())
}
