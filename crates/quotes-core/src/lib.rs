#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Core traits and types for rate-limited quote acquisition.
//!
//! This crate provides the foundational abstractions shared by the adapters
//! and the orchestrator:
//!
//! - [`QuoteProvider`](provider::QuoteProvider) - Base trait for all providers
//! - [`SeriesProvider`](provider::SeriesProvider) - Daily price history
//! - [`SpotPriceProvider`](provider::SpotPriceProvider) - Latest price
//! - [`SlidingWindowLimiter`](limiter::SlidingWindowLimiter) - Per-provider call budget
//! - [`FetchOutcome`](outcome::FetchOutcome) - Typed result of a resilient fetch

/// Error types for quote operations.
pub mod error;
/// Columnar export of price series.
pub mod frame;
/// Sliding-window rate limiter.
pub mod limiter;
/// Typed fetch outcome.
pub mod outcome;
/// Provider traits for fetching quotes.
pub mod provider;
/// Core data types (Symbol, PriceBar, TimeSeries).
pub mod types;

// Re-export commonly used items at crate root
pub use error::{QuoteError, Result};
pub use limiter::SlidingWindowLimiter;
pub use outcome::FetchOutcome;
pub use provider::{QuoteProvider, SeriesProvider, SpotPriceProvider};
pub use types::{PriceBar, ReturnStats, Symbol, TimeSeries};
