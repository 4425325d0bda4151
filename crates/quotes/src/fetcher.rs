//! Resilient series fetching over rate-limited providers.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use quotes_cache::ExpiringCache;
use quotes_core::{
    FetchOutcome, QuoteError, QuoteProvider, SeriesProvider, SlidingWindowLimiter,
    SpotPriceProvider, Symbol, TimeSeries,
};
use tracing::{debug, instrument, warn};

/// Lifetime of a fetched series in the cache.
pub const SERIES_TTL: Duration = Duration::from_secs(3600);

/// Margin added to every rate-limit wait.
pub const ADMISSION_JITTER: Duration = Duration::from_millis(100);

/// Attempts per fetch unless configured otherwise.
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Cache key: symbol and requested lookback.
pub type SeriesKey = (Symbol, usize);

type InflightLock = Arc<tokio::sync::Mutex<()>>;

/// Fetches series through an expiring cache, per-provider rate limiters and
/// retry with exponential backoff.
///
/// Providers are tried in registration order; the first whose
/// `supports_symbol` accepts the symbol serves it. Register narrow providers
/// (the crypto sentinel) before catch-all ones.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use quotes::{BrapiProvider, SeriesFetcher, Symbol};
///
/// let mut fetcher = SeriesFetcher::new();
/// fetcher.register_series(Arc::new(BrapiProvider::new()));
///
/// let outcome = fetcher.fetch(&Symbol::new("PETR4.SA"), 30, 3).await;
/// ```
pub struct SeriesFetcher {
    series_providers: Vec<Arc<dyn SeriesProvider>>,
    spot_providers: Vec<Arc<dyn SpotPriceProvider>>,
    cache: Arc<ExpiringCache<SeriesKey, TimeSeries>>,
    series_ttl: Duration,
    jitter: Duration,
    max_retries: u32,
    single_flight: bool,
    inflight: Mutex<HashMap<SeriesKey, InflightLock>>,
}

impl fmt::Debug for SeriesFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeriesFetcher")
            .field(
                "series_providers",
                &self
                    .series_providers
                    .iter()
                    .map(|p| p.name())
                    .collect::<Vec<_>>(),
            )
            .field(
                "spot_providers",
                &self
                    .spot_providers
                    .iter()
                    .map(|p| p.name())
                    .collect::<Vec<_>>(),
            )
            .field("series_ttl", &self.series_ttl)
            .field("max_retries", &self.max_retries)
            .field("single_flight", &self.single_flight)
            .finish_non_exhaustive()
    }
}

impl Default for SeriesFetcher {
    fn default() -> Self {
        Self {
            series_providers: Vec::new(),
            spot_providers: Vec::new(),
            cache: Arc::new(ExpiringCache::default()),
            series_ttl: SERIES_TTL,
            jitter: ADMISSION_JITTER,
            max_retries: DEFAULT_MAX_RETRIES,
            single_flight: false,
            inflight: Mutex::new(HashMap::new()),
        }
    }
}

impl SeriesFetcher {
    /// Create a fetcher with no providers and a private cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a shared cache.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<ExpiringCache<SeriesKey, TimeSeries>>) -> Self {
        self.cache = cache;
        self
    }

    /// Set how long fetched series stay cached.
    #[must_use]
    pub const fn with_series_ttl(mut self, ttl: Duration) -> Self {
        self.series_ttl = ttl;
        self
    }

    /// Set the margin added to rate-limit waits.
    #[must_use]
    pub const fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Set the default attempt count reported by [`max_retries`](Self::max_retries).
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Coalesce concurrent cache misses for the same key into one fetch.
    #[must_use]
    pub const fn with_single_flight(mut self, enabled: bool) -> Self {
        self.single_flight = enabled;
        self
    }

    /// Register a series provider.
    pub fn register_series(&mut self, provider: Arc<dyn SeriesProvider>) {
        debug!(provider = provider.name(), "Registering series provider");
        self.series_providers.push(provider);
    }

    /// Register a latest-price provider.
    pub fn register_spot(&mut self, provider: Arc<dyn SpotPriceProvider>) {
        debug!(provider = provider.name(), "Registering spot provider");
        self.spot_providers.push(provider);
    }

    /// The series cache.
    #[must_use]
    pub const fn cache(&self) -> &Arc<ExpiringCache<SeriesKey, TimeSeries>> {
        &self.cache
    }

    /// Configured default attempt count.
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Names of the series providers in routing order.
    #[must_use]
    pub fn provider_names(&self) -> Vec<&str> {
        self.series_providers.iter().map(|p| p.name()).collect()
    }

    /// The series provider that serves `symbol`, if any.
    #[must_use]
    pub fn series_provider_for(&self, symbol: &Symbol) -> Option<&Arc<dyn SeriesProvider>> {
        self.series_providers
            .iter()
            .find(|p| p.supports_symbol(symbol))
    }

    /// Drop the cached series for `(symbol, lookback_days)`.
    pub async fn invalidate(&self, symbol: &Symbol, lookback_days: usize) {
        self.cache.delete(&(symbol.clone(), lookback_days)).await;
    }

    /// Evict expired series; returns how many were removed.
    pub async fn cleanup_cache(&self) -> usize {
        self.cache.cleanup_expired().await
    }

    /// Fetch the last `lookback_days` observations of `symbol`.
    ///
    /// `lookback_days == 0` keeps the provider's full window. Convenience over
    /// [`fetch`](Self::fetch) that drops the failure kind.
    pub async fn get_series(
        &self,
        symbol: &Symbol,
        lookback_days: usize,
        max_retries: u32,
    ) -> Option<TimeSeries> {
        self.fetch(symbol, lookback_days, max_retries)
            .await
            .into_series()
    }

    /// Fetch the last `lookback_days` observations of `symbol`.
    ///
    /// A cache hit touches neither the rate limiter nor the network. On a miss
    /// the call waits for admission, then makes up to `max_retries` attempts
    /// (at least one) with `2^n` second backoff between them. A local
    /// rate-limit denial is waited out and does not use up an attempt.
    #[instrument(skip_all, fields(symbol = %symbol, lookback_days = lookback_days))]
    pub async fn fetch(
        &self,
        symbol: &Symbol,
        lookback_days: usize,
        max_retries: u32,
    ) -> FetchOutcome {
        let key: SeriesKey = (symbol.clone(), lookback_days);
        if let Some(series) = self.cache.get(&key).await {
            debug!("Cache hit");
            return FetchOutcome::Success(series);
        }

        let Some(provider) = self.series_provider_for(symbol) else {
            let err = QuoteError::ProviderNotConfigured(format!("No series provider for {symbol}"));
            warn!(error = %err, "Cannot fetch series");
            return FetchOutcome::ProviderError(err.to_string());
        };

        if !self.single_flight {
            return self.fetch_uncached(provider.as_ref(), &key, max_retries).await;
        }

        let lock = self.inflight_lock(&key);
        let outcome = {
            let _guard = lock.lock().await;
            match self.cache.get(&key).await {
                Some(series) => {
                    debug!("Filled by a concurrent fetch");
                    FetchOutcome::Success(series)
                }
                None => self.fetch_uncached(provider.as_ref(), &key, max_retries).await,
            }
        };
        self.release_inflight(&key, &lock);
        outcome
    }

    /// Fetch the latest price of `symbol`.
    ///
    /// Waits for admission like [`fetch`](Self::fetch) but is neither cached
    /// nor retried.
    #[instrument(skip_all, fields(symbol = %symbol))]
    pub async fn latest_price(&self, symbol: &Symbol) -> Option<f64> {
        let Some(provider) = self
            .spot_providers
            .iter()
            .find(|p| p.supports_symbol(symbol))
        else {
            warn!("No spot provider for symbol");
            return None;
        };

        let limiter = provider.rate_limiter();
        loop {
            if let Some(limiter) = &limiter {
                if !self.wait_for_admission(limiter, provider.name()).await {
                    return None;
                }
            }

            match provider.latest_price(symbol).await {
                Ok(price) => return Some(price),
                Err(e) if e.is_rate_limited() && limiter.is_some() => {
                    debug!(
                        provider = provider.name(),
                        "Slot taken by a concurrent caller, waiting again"
                    );
                }
                Err(e) => {
                    warn!(provider = provider.name(), error = %e, "Latest price failed");
                    return None;
                }
            }
        }
    }

    /// Fetch `options.history` observations and forecast them.
    ///
    /// Fitting runs on the blocking pool.
    #[cfg(feature = "forecast")]
    pub async fn forecast(
        &self,
        symbol: &Symbol,
        options: &quotes_forecast::ForecastOptions,
    ) -> Option<quotes_forecast::ForecastResult> {
        let series = self
            .get_series(symbol, options.history, self.max_retries)
            .await?;
        let options = *options;

        match tokio::task::spawn_blocking(move || quotes_forecast::forecast(&series, &options))
            .await
        {
            Ok(result) => Some(result),
            Err(e) => {
                warn!(error = %e, "Forecast task failed");
                None
            }
        }
    }

    async fn fetch_uncached(
        &self,
        provider: &dyn SeriesProvider,
        key: &SeriesKey,
        max_retries: u32,
    ) -> FetchOutcome {
        let (symbol, lookback_days) = key;
        let attempts = max_retries.max(1);
        let limiter = provider.rate_limiter();

        let mut failures = 0;
        let mut last_error = None;
        let mut all_no_data = true;

        while failures < attempts {
            if let Some(limiter) = &limiter {
                if !self.wait_for_admission(limiter, provider.name()).await {
                    warn!(provider = provider.name(), "Call budget admits no requests");
                    return FetchOutcome::RateLimited(None);
                }
            }

            match provider.fetch_series(symbol).await {
                Ok(series) => {
                    let series = series.tail(*lookback_days);
                    self.cache
                        .set_with_ttl(key.clone(), series.clone(), self.series_ttl)
                        .await;
                    debug!(provider = provider.name(), bars = series.len(), "Fetched series");
                    return FetchOutcome::Success(series);
                }
                Err(e) if e.is_rate_limited() && limiter.is_some() => {
                    debug!(
                        provider = provider.name(),
                        "Slot taken by a concurrent caller, waiting again"
                    );
                }
                Err(e) => {
                    failures += 1;
                    all_no_data &= e.is_no_data();
                    warn!(
                        provider = provider.name(),
                        attempt = failures,
                        attempts,
                        error = %e,
                        "Fetch attempt failed"
                    );
                    last_error = Some(e);

                    if failures < attempts {
                        let backoff = backoff_delay(failures - 1);
                        debug!(?backoff, "Backing off");
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }

        warn!(provider = provider.name(), attempts, "Retries exhausted");
        FetchOutcome::from_exhausted(last_error.as_ref(), all_no_data)
    }

    /// Sleep until `limiter` admits a call. Returns false if it never will.
    ///
    /// Nothing is recorded here, so dropping the future mid-wait leaves the
    /// call log untouched.
    async fn wait_for_admission(&self, limiter: &SlidingWindowLimiter, provider: &str) -> bool {
        while let Some(wait) = limiter.time_until_next_call() {
            if wait == Duration::MAX {
                return false;
            }
            debug!(provider, ?wait, "Rate limited, waiting for a free slot");
            tokio::time::sleep(wait + self.jitter).await;
        }
        true
    }

    fn inflight(&self) -> MutexGuard<'_, HashMap<SeriesKey, InflightLock>> {
        self.inflight.lock().unwrap_or_else(|poisoned| {
            warn!("In-flight registry mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn inflight_lock(&self, key: &SeriesKey) -> InflightLock {
        Arc::clone(self.inflight().entry(key.clone()).or_default())
    }

    fn release_inflight(&self, key: &SeriesKey, lock: &InflightLock) {
        let mut inflight = self.inflight();
        // Registry plus this caller: nobody else is waiting on the key.
        if inflight.get(key).is_some_and(|l| Arc::ptr_eq(l, lock)) && Arc::strong_count(lock) == 2
        {
            inflight.remove(key);
        }
    }
}

/// `2^attempt` seconds.
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(attempt))
}
