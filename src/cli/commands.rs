//! CLI command definitions

use crate::pricing::AccountAttributes;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "tradepost")]
#[command(about = "Tradepost - price negotiation for game account listings", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the negotiation API server
    Serve {
        /// Address to listen on (overrides TRADEPOST_LISTEN_ADDR)
        #[arg(short, long)]
        listen: Option<String>,

        /// JSON file with listings to seed the catalog
        #[arg(short = 'f', long)]
        listings: Option<PathBuf>,

        /// Poll interval in seconds (overrides TRADEPOST_POLL_INTERVAL_SECS)
        #[arg(short, long)]
        poll_interval: Option<u64>,
    },

    /// Suggest an asking price for an account
    SuggestPrice(PriceArgs),

    /// Run a two-buyer negotiation in process and print the outcome
    Demo,
}

#[derive(Args, Debug)]
pub struct PriceArgs {
    /// VIP level
    #[arg(short, long)]
    pub vip: u32,

    /// Banked speed-up days
    #[arg(short, long, default_value = "0")]
    pub speed: u64,

    /// Talent points
    #[arg(short, long, default_value = "0")]
    pub talent: u32,

    /// Equipment pieces
    #[arg(short, long, default_value = "0")]
    pub equipment: u32,

    /// Migration tickets
    #[arg(long, default_value = "0")]
    pub tickets: u32,

    /// Account has the key rally
    #[arg(short, long)]
    pub key_rally: bool,
}

impl From<PriceArgs> for AccountAttributes {
    fn from(args: PriceArgs) -> Self {
        AccountAttributes {
            vip_level: args.vip,
            speed: args.speed,
            talent: args.talent,
            equipment: args.equipment,
            tickets: args.tickets,
            key_rally: args.key_rally,
        }
    }
}
