#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! CoinGecko crypto provider.
//!
//! [`CoinGeckoProvider`] serves a small set of sentinel symbols (by default
//! `BTC-USD`), each mapped to a CoinGecko coin id.
//!
//! ```rust,ignore
//! use quotes_coingecko::CoinGeckoProvider;
//! use quotes_core::{SeriesProvider, Symbol};
//!
//! let provider = CoinGeckoProvider::new();
//! let series = provider.fetch_series(&Symbol::new("BTC-USD")).await?;
//! ```

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use quotes_core::{
    PriceBar, QuoteError, QuoteProvider, Result, SeriesProvider, SpotPriceProvider, Symbol,
    TimeSeries,
};
use serde::Deserialize;
use tracing::{debug, warn};

/// CoinGecko API base URL.
const COINGECKO_BASE_URL: &str = "https://api.coingecko.com/api/v3";

/// Provider name used in errors and logs.
const PROVIDER_NAME: &str = "coingecko";

/// Quote currency for every request.
const VS_CURRENCY: &str = "usd";

/// Days of history requested from the market chart.
const HISTORY_DAYS: u32 = 365;

/// Default sentinel symbol and its coin id.
const DEFAULT_SYMBOL: &str = "BTC-USD";
const DEFAULT_COIN_ID: &str = "bitcoin";

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// CoinGecko crypto provider.
#[derive(Debug, Clone)]
pub struct CoinGeckoProvider {
    client: reqwest::Client,
    base_url: String,
    coins: HashMap<Symbol, String>,
}

impl CoinGeckoProvider {
    /// Create a provider serving `BTC-USD` with a 10 second request timeout.
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
            base_url: COINGECKO_BASE_URL.to_string(),
            coins: HashMap::from([(Symbol::new(DEFAULT_SYMBOL), DEFAULT_COIN_ID.to_string())]),
        }
    }

    /// Route `symbol` to the CoinGecko coin `coin_id`.
    #[must_use]
    pub fn with_coin(mut self, symbol: impl Into<Symbol>, coin_id: impl Into<String>) -> Self {
        self.coins.insert(symbol.into(), coin_id.into());
        self
    }

    /// Serve only `symbol`, mapped to `coin_id`.
    #[must_use]
    pub fn with_only_coin(mut self, symbol: impl Into<Symbol>, coin_id: impl Into<String>) -> Self {
        self.coins.clear();
        self.with_coin(symbol, coin_id)
    }

    /// Point the provider at another base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn coin_id(&self, symbol: &Symbol) -> Result<&str> {
        self.coins
            .get(symbol)
            .map(String::as_str)
            .ok_or_else(|| QuoteError::ProviderNotConfigured(format!("No coin for {symbol}")))
    }

    fn market_chart_url(&self, coin_id: &str) -> String {
        format!(
            "{}/coins/{}/market_chart?vs_currency={}&days={}&interval=daily",
            self.base_url, coin_id, VS_CURRENCY, HISTORY_DAYS
        )
    }

    fn simple_price_url(&self, coin_id: &str) -> String {
        format!(
            "{}/simple/price?ids={}&vs_currencies={}",
            self.base_url, coin_id, VS_CURRENCY
        )
    }

    /// Make a GET request and parse the JSON response.
    async fn get<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!("CoinGecko request: {}", url);

        let response = self
            .client
            .get(url)
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

impl Default for CoinGeckoProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl QuoteProvider for CoinGeckoProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn description(&self) -> &str {
        "CoinGecko daily closes for crypto assets"
    }

    fn supports_symbol(&self, symbol: &Symbol) -> bool {
        self.coins.contains_key(symbol)
    }
}

#[async_trait]
impl SeriesProvider for CoinGeckoProvider {
    async fn fetch_series(&self, symbol: &Symbol) -> Result<TimeSeries> {
        let coin_id = self.coin_id(symbol)?;
        let chart: MarketChart = self.get(&self.market_chart_url(coin_id)).await?;
        parse_market_chart(symbol, chart)
    }
}

#[async_trait]
impl SpotPriceProvider for CoinGeckoProvider {
    async fn latest_price(&self, symbol: &Symbol) -> Result<f64> {
        let coin_id = self.coin_id(symbol)?;
        let prices: SimplePrice = self.get(&self.simple_price_url(coin_id)).await?;

        prices
            .get(coin_id)
            .and_then(|quotes| quotes.get(VS_CURRENCY))
            .copied()
            .filter(|p| p.is_finite())
            .ok_or_else(|| QuoteError::EmptyPayload {
                provider: PROVIDER_NAME.to_string(),
                symbol: symbol.to_string(),
            })
    }
}

/// Turn `[millis, close]` pairs into close-only bars.
fn parse_market_chart(symbol: &Symbol, chart: MarketChart) -> Result<TimeSeries> {
    let bars: Vec<PriceBar> = chart
        .prices
        .into_iter()
        .filter_map(|[millis, close]| {
            let timestamp = Utc.timestamp_millis_opt(millis as i64).single()?;
            Some(PriceBar::from_close(timestamp, close))
        })
        .collect();

    TimeSeries::new(symbol.clone(), bars).ok_or_else(|| QuoteError::EmptyPayload {
        provider: PROVIDER_NAME.to_string(),
        symbol: symbol.to_string(),
    })
}

// ============================================================================
// CoinGecko API Response Types
// ============================================================================

/// Market chart response. Only closing prices are used.
#[derive(Debug, Deserialize)]
struct MarketChart {
    #[serde(default)]
    prices: Vec<[f64; 2]>,
}

/// `{coin_id: {currency: price}}`.
type SimplePrice = HashMap<String, HashMap<String, f64>>;

#[cfg(test)]
mod tests {
    use super::*;

    const CHART_FIXTURE: &str = r#"{
        "prices": [
            [1704153600000, 45000.5],
            [1704067200000, 42200.0],
            [1704240000000, 44100.25]
        ],
        "market_caps": [[1704067200000, 827000000000.0]],
        "total_volumes": [[1704067200000, 14000000000.0]]
    }"#;

    #[test]
    fn test_urls() {
        let provider = CoinGeckoProvider::new().with_base_url("https://example.test/v3/");
        assert_eq!(
            provider.market_chart_url("bitcoin"),
            "https://example.test/v3/coins/bitcoin/market_chart?vs_currency=usd&days=365&interval=daily"
        );
        assert_eq!(
            provider.simple_price_url("bitcoin"),
            "https://example.test/v3/simple/price?ids=bitcoin&vs_currencies=usd"
        );
    }

    #[test]
    fn test_parse_market_chart_synthesizes_ohlc() {
        let symbol = Symbol::new("BTC-USD");
        let chart: MarketChart = serde_json::from_str(CHART_FIXTURE).unwrap();
        let series = parse_market_chart(&symbol, chart).unwrap();

        assert_eq!(series.closes(), vec![42200.0, 45000.5, 44100.25]);
        for bar in series.bars() {
            assert_eq!(bar.open, bar.close);
            assert_eq!(bar.high, bar.close);
            assert_eq!(bar.low, bar.close);
            assert_eq!(bar.volume, 0.0);
        }
    }

    #[test]
    fn test_parse_empty_chart() {
        let symbol = Symbol::new("BTC-USD");
        let chart: MarketChart = serde_json::from_str(r#"{"prices": []}"#).unwrap();
        assert!(parse_market_chart(&symbol, chart).unwrap_err().is_no_data());

        let chart: MarketChart = serde_json::from_str("{}").unwrap();
        assert!(parse_market_chart(&symbol, chart).unwrap_err().is_no_data());
    }

    #[test]
    fn test_malformed_chart() {
        let result: std::result::Result<MarketChart, _> =
            serde_json::from_str(r#"{"prices": [["x", 1.0]]}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_symbol_routing() {
        let provider = CoinGeckoProvider::default();
        assert!(provider.supports_symbol(&Symbol::new("btc-usd")));
        assert!(!provider.supports_symbol(&Symbol::new("PETR4.SA")));
        assert!(provider.rate_limiter().is_none());

        let provider = provider.with_only_coin("ETH-USD", "ethereum");
        assert!(provider.supports_symbol(&Symbol::new("ETH-USD")));
        assert!(!provider.supports_symbol(&Symbol::new("BTC-USD")));
    }

    #[tokio::test]
    async fn test_unknown_symbol_is_not_dispatched() {
        let provider = CoinGeckoProvider::new().with_base_url("http://127.0.0.1:1");
        let err = provider
            .fetch_series(&Symbol::new("DOGE-USD"))
            .await
            .unwrap_err();
        assert!(matches!(err, QuoteError::ProviderNotConfigured(_)));
    }
}
