//! Environment configuration.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use quotes_cache::ExpiringCache;
use quotes_core::{SlidingWindowLimiter, Symbol};
use tracing::{debug, warn};

use crate::fetcher::SeriesFetcher;

/// Settings for the acquisition layer.
///
/// Read from the environment by [`from_env`](Self::from_env); every setting
/// has a default.
#[derive(Clone, PartialEq, Eq)]
pub struct QuoteConfig {
    /// Equities calls admitted per window (`BRAPI_RATE_LIMIT_CALLS`).
    pub rate_limit_calls: usize,
    /// Equities window length (`BRAPI_RATE_LIMIT_PERIOD`, seconds).
    pub rate_limit_period: Duration,
    /// Default cache TTL (`CACHE_TTL_SECONDS`).
    pub cache_ttl: Duration,
    /// Optional bearer token for brapi.dev (`BRAPI_API_KEY`).
    pub brapi_api_key: Option<String>,
    /// Per-request HTTP timeout (`QUOTES_REQUEST_TIMEOUT_SECS`).
    pub request_timeout: Duration,
    /// Default attempts per fetch (`QUOTES_MAX_RETRIES`).
    pub max_retries: u32,
    /// Coalesce concurrent misses per key (`QUOTES_SINGLE_FLIGHT`).
    pub single_flight: bool,
    /// Symbol routed to the crypto provider (`QUOTES_CRYPTO_SYMBOL`).
    pub crypto_symbol: Symbol,
    /// CoinGecko coin id fetched for [`crypto_symbol`](Self::crypto_symbol)
    /// (`QUOTES_CRYPTO_COIN_ID`).
    pub crypto_coin_id: String,
}

impl fmt::Debug for QuoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuoteConfig")
            .field("rate_limit_calls", &self.rate_limit_calls)
            .field("rate_limit_period", &self.rate_limit_period)
            .field("cache_ttl", &self.cache_ttl)
            .field(
                "brapi_api_key",
                &self.brapi_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("request_timeout", &self.request_timeout)
            .field("max_retries", &self.max_retries)
            .field("single_flight", &self.single_flight)
            .field("crypto_symbol", &self.crypto_symbol)
            .field("crypto_coin_id", &self.crypto_coin_id)
            .finish()
    }
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl QuoteConfig {
    /// Load a `.env` file if present, then read the environment.
    #[must_use]
    pub fn load() -> Self {
        match dotenvy::dotenv() {
            Ok(path) => debug!(path = %path.display(), "Loaded .env file"),
            Err(e) => debug!(error = %e, "No .env file loaded"),
        }
        Self::from_env()
    }

    /// Read settings from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through `lookup`, which maps a variable name to its value.
    ///
    /// Blank values count as unset; unparsable values fall back to the default
    /// with a warning.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            rate_limit_calls: env_parse(&lookup, "BRAPI_RATE_LIMIT_CALLS", 5),
            rate_limit_period: Duration::from_secs(env_parse(
                &lookup,
                "BRAPI_RATE_LIMIT_PERIOD",
                60,
            )),
            cache_ttl: Duration::from_secs(env_parse(&lookup, "CACHE_TTL_SECONDS", 3600)),
            brapi_api_key: env_str(&lookup, "BRAPI_API_KEY"),
            request_timeout: Duration::from_secs(env_parse(
                &lookup,
                "QUOTES_REQUEST_TIMEOUT_SECS",
                10,
            )),
            max_retries: env_parse(&lookup, "QUOTES_MAX_RETRIES", 3),
            single_flight: env_bool(&lookup, "QUOTES_SINGLE_FLIGHT", false),
            crypto_symbol: env_str(&lookup, "QUOTES_CRYPTO_SYMBOL")
                .map_or_else(|| Symbol::new("BTC-USD"), Symbol::new),
            crypto_coin_id: env_str(&lookup, "QUOTES_CRYPTO_COIN_ID")
                .map_or_else(|| "bitcoin".to_string(), |id| id.to_lowercase()),
        }
    }

    /// Wire the limiter, cache, providers and orchestrator.
    ///
    /// The crypto provider is registered first and serves only
    /// [`crypto_symbol`](Self::crypto_symbol), fetched as
    /// [`crypto_coin_id`](Self::crypto_coin_id); every other symbol goes to
    /// the rate-limited equities provider.
    #[must_use]
    pub fn build_fetcher(&self) -> SeriesFetcher {
        let cache = Arc::new(ExpiringCache::new(self.cache_ttl));
        let mut fetcher = SeriesFetcher::new()
            .with_cache(cache)
            .with_max_retries(self.max_retries)
            .with_single_flight(self.single_flight);

        #[cfg(feature = "coingecko")]
        {
            let crypto = Arc::new(
                quotes_coingecko::CoinGeckoProvider::with_timeout(self.request_timeout)
                    .with_only_coin(self.crypto_symbol.clone(), self.crypto_coin_id.clone()),
            );
            fetcher.register_series(Arc::clone(&crypto) as _);
            fetcher.register_spot(crypto);
        }

        #[cfg(feature = "brapi")]
        {
            let limiter = Arc::new(SlidingWindowLimiter::new(
                self.rate_limit_calls,
                self.rate_limit_period,
            ));
            let mut equities =
                quotes_brapi::BrapiProvider::with_timeout(self.request_timeout).with_limiter(limiter);
            if let Some(key) = &self.brapi_api_key {
                equities = equities.with_api_key(key.clone());
            }
            let equities = Arc::new(equities);
            fetcher.register_series(Arc::clone(&equities) as _);
            fetcher.register_spot(equities);
        }

        debug!(?fetcher, "Built series fetcher");
        fetcher
    }

    /// A limiter sized by this configuration.
    #[must_use]
    pub fn rate_limiter(&self) -> SlidingWindowLimiter {
        SlidingWindowLimiter::new(self.rate_limit_calls, self.rate_limit_period)
    }
}

fn env_str<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_parse<F, T>(lookup: &F, name: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match env_str(lookup, name) {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(name, value = %raw, "Ignoring unparsable setting");
            default
        }),
    }
}

fn env_bool<F>(lookup: &F, name: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    env_str(lookup, name)
        .map(|s| matches!(s.to_lowercase().as_str(), "1" | "true" | "yes" | "y" | "on"))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> QuoteConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        QuoteConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = QuoteConfig::default();
        assert_eq!(config.rate_limit_calls, 5);
        assert_eq!(config.rate_limit_period, Duration::from_secs(60));
        assert_eq!(config.cache_ttl, Duration::from_secs(3600));
        assert_eq!(config.brapi_api_key, None);
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.max_retries, 3);
        assert!(!config.single_flight);
        assert_eq!(config.crypto_symbol, Symbol::new("BTC-USD"));
        assert_eq!(config.crypto_coin_id, "bitcoin");
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("BRAPI_RATE_LIMIT_CALLS", "10"),
            ("BRAPI_RATE_LIMIT_PERIOD", " 30 "),
            ("CACHE_TTL_SECONDS", "600"),
            ("BRAPI_API_KEY", "secret-token"),
            ("QUOTES_MAX_RETRIES", "5"),
            ("QUOTES_SINGLE_FLIGHT", "yes"),
            ("QUOTES_CRYPTO_SYMBOL", "eth-usd"),
            ("QUOTES_CRYPTO_COIN_ID", "Ethereum"),
        ]);
        assert_eq!(config.rate_limit_calls, 10);
        assert_eq!(config.rate_limit_period, Duration::from_secs(30));
        assert_eq!(config.cache_ttl, Duration::from_secs(600));
        assert_eq!(config.brapi_api_key.as_deref(), Some("secret-token"));
        assert_eq!(config.max_retries, 5);
        assert!(config.single_flight);
        assert_eq!(config.crypto_symbol, Symbol::new("ETH-USD"));
        assert_eq!(config.crypto_coin_id, "ethereum");

        let limiter = config.rate_limiter();
        assert_eq!(limiter.max_calls(), 10);
        assert_eq!(limiter.period(), Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_and_blank_values_use_defaults() {
        let config = config(&[
            ("BRAPI_RATE_LIMIT_CALLS", "many"),
            ("CACHE_TTL_SECONDS", "-1"),
            ("BRAPI_API_KEY", "   "),
            ("QUOTES_SINGLE_FLIGHT", "nope"),
        ]);
        assert_eq!(config.rate_limit_calls, 5);
        assert_eq!(config.cache_ttl, Duration::from_secs(3600));
        assert_eq!(config.brapi_api_key, None);
        assert!(!config.single_flight);
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = config(&[("BRAPI_API_KEY", "secret-token")]);
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[cfg(all(feature = "brapi", feature = "coingecko"))]
    #[test]
    fn test_build_fetcher_routes_crypto_first() {
        let config = config(&[
            ("CACHE_TTL_SECONDS", "1800"),
            ("QUOTES_MAX_RETRIES", "4"),
        ]);
        let fetcher = config.build_fetcher();

        assert_eq!(fetcher.provider_names(), vec!["coingecko", "brapi"]);
        assert_eq!(fetcher.max_retries(), 4);
        assert_eq!(fetcher.cache().default_ttl(), Duration::from_secs(1800));

        let route = |s: &str| {
            fetcher
                .series_provider_for(&Symbol::new(s))
                .map(|p| p.name().to_string())
        };
        assert_eq!(route("BTC-USD").as_deref(), Some("coingecko"));
        assert_eq!(route("PETR4.SA").as_deref(), Some("brapi"));

        let brapi = fetcher.series_provider_for(&Symbol::new("PETR4")).unwrap();
        let limiter = brapi.rate_limiter().unwrap();
        assert_eq!(limiter.max_calls(), 5);
        assert!(
            fetcher
                .series_provider_for(&Symbol::new("BTC-USD"))
                .unwrap()
                .rate_limiter()
                .is_none()
        );
    }

    #[cfg(feature = "coingecko")]
    #[test]
    fn test_build_fetcher_maps_crypto_symbol_to_coin() {
        let config = config(&[
            ("QUOTES_CRYPTO_SYMBOL", "ETH-USD"),
            ("QUOTES_CRYPTO_COIN_ID", "ethereum"),
        ]);
        let fetcher = config.build_fetcher();

        let crypto = fetcher
            .series_provider_for(&Symbol::new("ETH-USD"))
            .unwrap();
        assert_eq!(crypto.name(), "coingecko");
        let debug = format!("{crypto:?}");
        assert!(debug.contains("\"ethereum\""), "{debug}");
        assert!(!debug.contains("bitcoin"), "{debug}");
        assert!(!crypto.supports_symbol(&Symbol::new("BTC-USD")));
    }
}
