//! OddsBot Library
//!
//! Multi-sportsbook odds aggregation: concurrent provider fan-out,
//! normalization, best-line resolution and arbitrage detection.

pub mod aggregator;
pub mod arbitrage;
pub mod changes;
pub mod config;
pub mod error;
pub mod normalizer;
pub mod notify;
pub mod providers;
pub mod resolver;
pub mod runner;
pub mod service;
pub mod telemetry;
pub mod tracker;
pub mod types;

pub use aggregator::{AggregationOutcome, AggregatorSettings, OddsAggregator};
pub use arbitrage::{ArbitrageDetector, ArbitrageSettings};
pub use error::ProviderError;
pub use providers::{PropsQuery, ProviderClient, RawRecord};
pub use runner::{run_until, PollSettings};
pub use service::{ServiceSettings, UnifiedSportsbookService};
pub use types::{ArbitrageOpportunity, BestOdds, UnifiedOdds};
