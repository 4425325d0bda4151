//! Core data types for quote series.
//!
//! This module defines the fundamental data structures:
//!
//! - [`Symbol`] - Trading symbol/ticker
//! - [`PriceBar`] - One OHLCV observation
//! - [`TimeSeries`] - Ordered, de-duplicated, non-empty run of bars
//! - [`ReturnStats`] - Annualized return and volatility of a series

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Trading days per year used to annualize daily statistics.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// A trading symbol/ticker.
///
/// Symbols are trimmed and uppercased on creation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    /// Creates a new symbol from a string, converting to uppercase.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().trim().to_uppercase())
    }

    /// Returns the symbol as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the symbol with an exchange suffix (e.g. `.SA`) removed.
    #[must_use]
    pub fn without_suffix(&self, suffix: &str) -> &str {
        let suffix = suffix.to_uppercase();
        self.0.strip_suffix(suffix.as_str()).unwrap_or(&self.0)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Symbol {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// One OHLCV observation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    /// Timestamp of the bar.
    pub timestamp: DateTime<Utc>,
    /// Opening price.
    pub open: f64,
    /// Highest price during the period.
    pub high: f64,
    /// Lowest price during the period.
    pub low: f64,
    /// Closing price.
    pub close: f64,
    /// Trading volume.
    pub volume: f64,
}

impl PriceBar {
    /// Creates a new bar.
    #[must_use]
    pub const fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Creates a bar from a closing price alone.
    ///
    /// Open, high and low repeat the close and volume is zero. Used for
    /// providers that only publish closing prices.
    #[must_use]
    pub const fn from_close(timestamp: DateTime<Utc>, close: f64) -> Self {
        Self::new(timestamp, close, close, close, close, 0.0)
    }

    /// Returns the calendar date of the bar (UTC).
    #[must_use]
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

/// Ordered run of price bars for one symbol.
///
/// Timestamps are strictly increasing and the series is never empty; both are
/// enforced by [`TimeSeries::new`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TimeSeries {
    symbol: Symbol,
    bars: Vec<PriceBar>,
}

impl TimeSeries {
    /// Builds a series from unordered bars.
    ///
    /// Bars with a non-finite close are dropped, the rest are sorted by
    /// timestamp and duplicate timestamps keep the last bar seen. Returns
    /// `None` when nothing is left.
    #[must_use]
    pub fn new(symbol: Symbol, mut bars: Vec<PriceBar>) -> Option<Self> {
        bars.retain(|bar| bar.close.is_finite());
        bars.sort_by_key(|bar| bar.timestamp);

        let mut deduped: Vec<PriceBar> = Vec::with_capacity(bars.len());
        for bar in bars {
            match deduped.last_mut() {
                Some(prev) if prev.timestamp == bar.timestamp => *prev = bar,
                _ => deduped.push(bar),
            }
        }

        if deduped.is_empty() {
            return None;
        }
        Some(Self {
            symbol,
            bars: deduped,
        })
    }

    /// Returns the symbol of this series.
    #[must_use]
    pub const fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Returns the bars in timestamp order.
    #[must_use]
    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    /// Returns the number of bars.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    /// Always false; kept for API symmetry with collections.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Returns the most recent bar.
    #[must_use]
    pub fn last(&self) -> &PriceBar {
        &self.bars[self.bars.len() - 1]
    }

    /// Returns the date of the most recent bar.
    #[must_use]
    pub fn last_date(&self) -> NaiveDate {
        self.last().date()
    }

    /// Returns the closing prices in timestamp order.
    #[must_use]
    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|bar| bar.close).collect()
    }

    /// Keeps only the most recent `n` bars.
    ///
    /// `n == 0` keeps everything.
    #[must_use]
    pub fn tail(mut self, n: usize) -> Self {
        if n > 0 && self.bars.len() > n {
            self.bars.drain(..self.bars.len() - n);
        }
        self
    }

    /// Annualized mean daily return and volatility of the closing prices.
    #[must_use]
    pub fn return_stats(&self) -> ReturnStats {
        let returns: Vec<f64> = self
            .bars
            .windows(2)
            .filter(|w| w[0].close != 0.0)
            .map(|w| w[1].close / w[0].close - 1.0)
            .collect();

        if returns.is_empty() {
            return ReturnStats::default();
        }

        let n = returns.len() as f64;
        let mean = returns.iter().sum::<f64>() / n;
        // Sample deviation is undefined for a single return.
        let annual_volatility = if returns.len() < 2 {
            0.0
        } else {
            let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
            variance.sqrt() * TRADING_DAYS_PER_YEAR.sqrt()
        };

        ReturnStats {
            annual_return: mean * TRADING_DAYS_PER_YEAR,
            annual_volatility,
        }
    }
}

/// Annualized return statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReturnStats {
    /// Mean daily simple return times 252.
    pub annual_return: f64,
    /// Sample standard deviation of daily returns times sqrt(252).
    pub annual_volatility: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_symbol_normalization() {
        let symbol = Symbol::new(" petr4.sa ");
        assert_eq!(symbol.as_str(), "PETR4.SA");
        assert_eq!(symbol.without_suffix(".SA"), "PETR4");
        assert_eq!(Symbol::new("VALE3").without_suffix(".sa"), "VALE3");
    }

    #[test]
    fn test_series_sorted_and_deduplicated() {
        let bars = vec![
            PriceBar::from_close(day(3), 12.0),
            PriceBar::from_close(day(1), 10.0),
            PriceBar::from_close(day(2), 11.0),
            PriceBar::from_close(day(2), 11.5),
        ];
        let series = TimeSeries::new(Symbol::new("X"), bars).unwrap();

        assert_eq!(series.len(), 3);
        assert_eq!(series.closes(), vec![10.0, 11.5, 12.0]);
        assert!(
            series
                .bars()
                .windows(2)
                .all(|w| w[0].timestamp < w[1].timestamp)
        );
    }

    #[test]
    fn test_series_rejects_empty() {
        assert!(TimeSeries::new(Symbol::new("X"), vec![]).is_none());
        let nan = vec![PriceBar::from_close(day(1), f64::NAN)];
        assert!(TimeSeries::new(Symbol::new("X"), nan).is_none());
    }

    #[test]
    fn test_tail() {
        let bars = (1..=10)
            .map(|d| PriceBar::from_close(day(d), d as f64))
            .collect();
        let series = TimeSeries::new(Symbol::new("X"), bars).unwrap();

        let trimmed = series.clone().tail(3);
        assert_eq!(trimmed.closes(), vec![8.0, 9.0, 10.0]);
        assert_eq!(trimmed.last_date(), NaiveDate::from_ymd_opt(2024, 1, 10).unwrap());

        assert_eq!(series.clone().tail(0).len(), 10);
        assert_eq!(series.tail(50).len(), 10);
    }

    #[test]
    fn test_from_close_synthesizes_ohlc() {
        let bar = PriceBar::from_close(day(1), 42.0);
        assert_eq!(bar.open, 42.0);
        assert_eq!(bar.high, 42.0);
        assert_eq!(bar.low, 42.0);
        assert_eq!(bar.volume, 0.0);
    }

    #[test]
    fn test_return_stats() {
        // Alternating +10% / -10% moves.
        let closes = [100.0, 110.0, 99.0, 108.9];
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| PriceBar::from_close(day(i as u32 + 1), c))
            .collect();
        let stats = TimeSeries::new(Symbol::new("X"), bars)
            .unwrap()
            .return_stats();

        let mean = (0.1 - 0.1 + 0.1) / 3.0;
        assert!((stats.annual_return - mean * 252.0).abs() < 1e-9);
        assert!(stats.annual_volatility > 0.0);

        let flat = TimeSeries::new(Symbol::new("X"), vec![PriceBar::from_close(day(1), 5.0)])
            .unwrap()
            .return_stats();
        assert_eq!(flat, ReturnStats::default());
    }

    #[test]
    fn test_return_stats_single_return() {
        let bars = vec![
            PriceBar::from_close(day(1), 100.0),
            PriceBar::from_close(day(2), 102.0),
        ];
        let stats = TimeSeries::new(Symbol::new("X"), bars)
            .unwrap()
            .return_stats();

        assert!((stats.annual_return - 0.02 * 252.0).abs() < 1e-9);
        assert_eq!(stats.annual_volatility, 0.0);
    }
}
