//! # myip-service
//!
//! Tells a client what a server can learn about it: the address it connects
//! from, the reverse DNS names and whois record of that address, what its
//! user agent says, and the location headers added by the edge.
//!
//! ## Features
//!
//! - All lookups run concurrently under a single request deadline
//! - Two step whois resolution through the IANA root registry
//! - Duplicate whois banners are stripped from the response body
//! - Every outside dependency sits behind the [`Capabilities`] trait, with a
//!   deterministic [`StubBackend`] for tests
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use myip_service::{Aggregator, Config, LookupRequest};
//! use std::{sync::Arc, time::Duration};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Arc::new(Config::load()?);
//!     let aggregator = Aggregator::from_config(config)?;
//!
//!     let deadline = tokio::time::Instant::now() + Duration::from_secs(12);
//!     let result = aggregator.aggregate(LookupRequest::new("8.8.8.8", deadline)).await?;
//!
//!     println!("{}", myip_service::render::to_text(&result));
//!     Ok(())
//! }
//! ```

pub mod address;
pub mod aggregate;
pub mod backend;
pub mod cleaner;
pub mod config;
pub mod dns;
pub mod errors;
pub mod headers;
pub mod insights;
pub mod location;
#[cfg(feature = "server")]
pub mod metrics;
pub mod render;
pub mod stub;
pub mod ua;
pub mod whois;

// Re-export main types for easy access
pub use aggregate::{AggregateResult, Aggregator, LookupFlags, LookupRequest};
pub use backend::{Capabilities, NetworkBackend};
pub use config::Config;
pub use errors::LookupError;
pub use headers::HeaderSnapshot;
pub use stub::{StubBackend, StubLookup};
pub use whois::{WhoisResolver, WhoisResult};
