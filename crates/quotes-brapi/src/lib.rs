#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! brapi.dev equities provider.
//!
//! This crate provides [`BrapiProvider`], which implements the
//! [`QuoteProvider`], [`SeriesProvider`] and [`SpotPriceProvider`] traits from
//! `quotes-core`.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use quotes_brapi::BrapiProvider;
//! use quotes_core::{SeriesProvider, SlidingWindowLimiter, Symbol};
//!
//! # async fn example() -> quotes_core::Result<()> {
//! let limiter = Arc::new(SlidingWindowLimiter::new(5, Duration::from_secs(60)));
//! let provider = BrapiProvider::new()
//!     .with_limiter(limiter)
//!     .with_api_key("my-token");
//!
//! let series = provider.fetch_series(&Symbol::new("PETR4.SA")).await?;
//! println!("Fetched {} bars", series.len());
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use quotes_core::{
    PriceBar, QuoteError, QuoteProvider, Result, SeriesProvider, SlidingWindowLimiter,
    SpotPriceProvider, Symbol, TimeSeries,
};
use serde::Deserialize;
use tracing::{debug, warn};

/// brapi.dev API base URL.
const BRAPI_BASE_URL: &str = "https://brapi.dev/api";

/// Provider name used in errors and logs.
const PROVIDER_NAME: &str = "brapi";

/// History window requested from the quote endpoint.
const HISTORY_RANGE: &str = "1y";

/// Bar interval requested from the quote endpoint.
const HISTORY_INTERVAL: &str = "1d";

/// Exchange suffix stripped from symbols before calling the API.
const EXCHANGE_SUFFIX: &str = ".SA";

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// brapi.dev equities provider.
///
/// Implements [`QuoteProvider`], [`SeriesProvider`] and [`SpotPriceProvider`].
#[derive(Clone)]
pub struct BrapiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    limiter: Arc<SlidingWindowLimiter>,
}

impl fmt::Debug for BrapiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrapiProvider")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("limiter", &self.limiter)
            .finish()
    }
}

impl BrapiProvider {
    /// Create a provider with the default budget (5 calls per 60 seconds) and
    /// a 10 second request timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Create a provider whose HTTP client times out after `timeout`.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to build HTTP client, using defaults");
                reqwest::Client::new()
            });
        Self::with_client(client)
    }

    /// Create a provider with a custom HTTP client.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: BRAPI_BASE_URL.to_string(),
            api_key: None,
            limiter: Arc::new(SlidingWindowLimiter::default()),
        }
    }

    /// Share `limiter` as this provider's call budget.
    #[must_use]
    pub fn with_limiter(mut self, limiter: Arc<SlidingWindowLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    /// Send `api_key` as a bearer credential. Empty keys are ignored.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        let api_key = api_key.into();
        self.api_key = (!api_key.trim().is_empty()).then_some(api_key);
        self
    }

    /// Point the provider at another base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Build the quote URL for a symbol, with or without the history window.
    fn quote_url(&self, symbol: &Symbol, with_history: bool) -> String {
        let ticker = symbol.without_suffix(EXCHANGE_SUFFIX);
        if with_history {
            format!(
                "{}/quote/{}?range={}&interval={}",
                self.base_url, ticker, HISTORY_RANGE, HISTORY_INTERVAL
            )
        } else {
            format!("{}/quote/{}", self.base_url, ticker)
        }
    }

    /// Admit, record, then dispatch a GET and decode the JSON body.
    async fn get(&self, url: &str) -> Result<QuoteResponse> {
        if !self.limiter.try_acquire() {
            let retry_after = self.limiter.time_until_next_call();
            debug!(?retry_after, "Call budget exhausted, not dispatching");
            return Err(QuoteError::RateLimited {
                provider: PROVIDER_NAME.to_string(),
                retry_after,
            });
        }

        debug!("brapi request: {}", url);

        let mut request = self.client.get(url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| QuoteError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(QuoteError::Status {
                provider: PROVIDER_NAME.to_string(),
                status: status.as_u16(),
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| QuoteError::Network(e.to_string()))?;

        serde_json::from_str(&text).map_err(|e| QuoteError::Parse(e.to_string()))
    }
}

impl Default for BrapiProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl QuoteProvider for BrapiProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn description(&self) -> &str {
        "brapi.dev quotes for Brazilian equities"
    }

    fn supports_symbol(&self, symbol: &Symbol) -> bool {
        !symbol.as_str().is_empty()
    }

    fn rate_limiter(&self) -> Option<Arc<SlidingWindowLimiter>> {
        Some(Arc::clone(&self.limiter))
    }
}

#[async_trait]
impl SeriesProvider for BrapiProvider {
    async fn fetch_series(&self, symbol: &Symbol) -> Result<TimeSeries> {
        let response = self.get(&self.quote_url(symbol, true)).await?;
        parse_history(symbol, response)
    }
}

#[async_trait]
impl SpotPriceProvider for BrapiProvider {
    async fn latest_price(&self, symbol: &Symbol) -> Result<f64> {
        let response = self.get(&self.quote_url(symbol, false)).await?;
        parse_price(symbol, response)
    }
}

fn no_data(symbol: &Symbol) -> QuoteError {
    QuoteError::EmptyPayload {
        provider: PROVIDER_NAME.to_string(),
        symbol: symbol.to_string(),
    }
}

/// Map the first result's historical prices into a series.
///
/// Entries without a close are skipped; missing open/high/low repeat the
/// close and a missing volume is zero.
fn parse_history(symbol: &Symbol, response: QuoteResponse) -> Result<TimeSeries> {
    let result = response
        .results
        .into_iter()
        .next()
        .ok_or_else(|| no_data(symbol))?;

    let bars: Vec<PriceBar> = result
        .historical_data_price
        .into_iter()
        .filter_map(|p| {
            let close = p.close?;
            let timestamp = Utc.timestamp_opt(p.date, 0).single()?;
            Some(PriceBar::new(
                timestamp,
                p.open.unwrap_or(close),
                p.high.unwrap_or(close),
                p.low.unwrap_or(close),
                close,
                p.volume.unwrap_or(0.0),
            ))
        })
        .collect();

    TimeSeries::new(symbol.clone(), bars).ok_or_else(|| no_data(symbol))
}

/// Read `regularMarketPrice` from the first result.
fn parse_price(symbol: &Symbol, response: QuoteResponse) -> Result<f64> {
    response
        .results
        .into_iter()
        .next()
        .and_then(|r| r.regular_market_price)
        .filter(|p| p.is_finite())
        .ok_or_else(|| no_data(symbol))
}

// ============================================================================
// brapi.dev API Response Types
// ============================================================================

/// Quote endpoint response.
#[derive(Debug, Deserialize)]
struct QuoteResponse {
    #[serde(default)]
    results: Vec<QuoteResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteResult {
    regular_market_price: Option<f64>,
    #[serde(default)]
    historical_data_price: Vec<HistoricalPrice>,
}

#[derive(Debug, Deserialize)]
struct HistoricalPrice {
    /// Unix seconds.
    date: i64,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    volume: Option<f64>,
}
