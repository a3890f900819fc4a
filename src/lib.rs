//! # Viewgate
//!
//! **Visitor metering and IP abuse gating for content paywalls.**
//!
//! Viewgate gives a publisher three pieces:
//!
//! - a **fingerprint service** deriving one stable visitor id per process
//! - an **IP security evaluator** that blocks an IP once it shows too many
//!   distinct fingerprints in 24 hours or too many requests in a minute
//! - a **view-metering gate** that counts distinct articles per visitor over
//!   a 30-day window and flags the upsell after five
//!
//! Every pre-flight check fails open: when the evaluator or its store is
//! unavailable, the visitor is let through.
//!
//! ## Quickstart
//!
//! ```no_run
//! use std::sync::Arc;
//! use viewgate::fingerprint::{DeviceSignals, FingerprintService, StaticSignals};
//! use viewgate::{ClientConfig, GateClient, GateSession};
//!
//! # async fn run() -> Result<(), viewgate::ViewgateError> {
//! let client = GateClient::new(&ClientConfig::new("https://news.example.com"))?;
//! let signals = DeviceSignals {
//!     user_agent: "Mozilla/5.0".to_string(),
//!     ..DeviceSignals::default()
//! };
//! let fingerprints = Arc::new(FingerprintService::new(Arc::new(StaticSignals(signals))));
//!
//! let session = GateSession::start(Arc::new(client), fingerprints).await;
//! let state = session.add_article_view("2025/03/budget-vote").await;
//!
//! if state.is_blocked {
//!     println!("blocked: {:?}", state.block_reason);
//! } else if state.has_reached_limit {
//!     println!("show subscription prompt");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! - [`SecurityPolicy`] - fan-out and rate thresholds (10 per 24h, 30 per 60s)
//! - [`MeterPolicy`] - free allowance and window (5 articles, 30 days)
//! - [`ServerConfig`] - listen address, data file, admin key; `VIEWGATE_*` env
//!
//! Blocks are terminal until lifted through the admin API.

#![warn(missing_docs)]

// Core modules
pub mod clock;
pub mod config;
pub mod errors;
pub mod logging;

// Identity
pub mod fingerprint;

// Protocol layer
pub mod protocol;

// Policy layer
pub mod policy;

// Persistence
pub mod store;

// Abuse detection
pub mod security;

// Metering layer
pub mod meter;

// Client layer
pub mod client;

// Visitor-side gate
pub mod gate;

// HTTP surface
pub mod server;

// Re-exports for public API
pub use client::GateClient;
pub use clock::{Clock, SystemClock};
pub use config::{ClientConfig, MeterPolicy, SecurityPolicy, ServerConfig, MAX_FREE_ARTICLES};
pub use errors::ViewgateError;
pub use fingerprint::{Fingerprint, FingerprintService};
pub use gate::{ClientGateState, GateSession};
pub use meter::ViewMeter;
pub use policy::access::AccessDecision;
pub use security::{IpSecurityEvaluator, IpVerdict};
pub use store::{FileStore, MemoryStore};

#[cfg(any(test, feature = "test-seams"))]
pub use clock::MockClock;
