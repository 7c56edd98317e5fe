/// ClearMarket rewards and trust service
///
/// Credit ledger, peer-review trust scoring, connection requests, vendor
/// referrals and audited admin overrides for the ClearMarket field
/// inspection marketplace.

pub mod admin;
pub mod api;
pub mod auth;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod jobs;
pub mod ledger;
pub mod metrics;
pub mod network;
pub mod rate_limit;
pub mod server;
pub mod trust;
pub mod users;

pub use config::MarketConfig;
pub use context::AppContext;
pub use error::{MarketError, MarketResult};
