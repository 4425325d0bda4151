#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! # Layout
//!
//! - [`SeriesFetcher`] - cache, admission, retry and backoff around providers
//! - [`QuoteConfig`] - environment configuration and fetcher wiring
//! - Core types, the rate limiter and provider traits are re-exported from
//!   `quotes-core`; the cache from `quotes-cache`.

// Core types and traits
pub use quotes_core::*;

// Cache
pub use quotes_cache::{DEFAULT_TTL, ExpiringCache};

// Providers
#[cfg(feature = "brapi")]
pub use quotes_brapi::BrapiProvider;
#[cfg(feature = "coingecko")]
pub use quotes_coingecko::CoinGeckoProvider;

// Forecasting
#[cfg(feature = "forecast")]
pub use quotes_forecast::{
    ForecastMethod, ForecastOptions, ForecastResult, Order, SeasonalOrder, forecast,
};

mod config;
mod fetcher;

pub use config::QuoteConfig;
pub use fetcher::{ADMISSION_JITTER, SERIES_TTL, SeriesFetcher, SeriesKey};
