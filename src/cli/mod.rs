//! CLI module for Tradepost

pub mod app;
pub mod commands;

pub use app::TradepostApp;
pub use commands::{Cli, Commands, PriceArgs};
