//! Provider traits for fetching quotes.
//!
//! This module defines the core provider traits:
//!
//! - [`QuoteProvider`] - Base trait for all providers (identity, routing, budget)
//! - [`SeriesProvider`] - Daily price history
//! - [`SpotPriceProvider`] - Latest traded price

use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

use crate::{
    error::Result,
    limiter::SlidingWindowLimiter,
    types::{Symbol, TimeSeries},
};

/// Base trait for all quote providers.
pub trait QuoteProvider: Send + Sync + Debug {
    /// Returns the name of this provider (e.g., "brapi").
    fn name(&self) -> &str;

    /// Returns a description of this provider.
    fn description(&self) -> &str;

    /// Returns true if this provider serves the given symbol.
    fn supports_symbol(&self, symbol: &Symbol) -> bool;

    /// Returns the limiter guarding this provider's call budget.
    ///
    /// `None` means the provider is not rate limited and callers never wait
    /// for admission.
    fn rate_limiter(&self) -> Option<Arc<SlidingWindowLimiter>> {
        None
    }
}

/// Provider for daily price history.
#[async_trait]
pub trait SeriesProvider: QuoteProvider {
    /// Fetches the provider's fixed history window for a symbol.
    ///
    /// A rate-limited provider records its call immediately before dispatch and
    /// returns [`QuoteError::RateLimited`](crate::QuoteError::RateLimited)
    /// without dispatching when the budget is exhausted.
    async fn fetch_series(&self, symbol: &Symbol) -> Result<TimeSeries>;
}

/// Provider for the latest traded price.
#[async_trait]
pub trait SpotPriceProvider: QuoteProvider {
    /// Fetches the latest price for a symbol.
    async fn latest_price(&self, symbol: &Symbol) -> Result<f64>;
}
