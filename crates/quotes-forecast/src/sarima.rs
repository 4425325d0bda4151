//! Seasonal ARIMA fitted by two-stage least squares.
//!
//! The series is differenced `d` times at lag 1 and `D` times at lag `s`. The
//! differenced series is regressed on a constant, its own lags and lagged
//! innovations. Seasonal lags enter additively (`1..=p` plus `s, 2s, ..Ps`),
//! without the multiplicative cross terms of a full SARIMA. Innovations come
//! from a long autoregression fitted first (Hannan-Rissanen).

use std::collections::BTreeSet;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::{ForecastError, Result},
    forecast::{ModelForecast, SeriesModel},
};

/// Lower bound on the long autoregression used to estimate innovations.
const MIN_LONG_AR_ORDER: usize = 10;

/// Residual degrees of freedom required on top of the parameter count.
const MIN_DEGREES_OF_FREEDOM: usize = 10;

/// Non-seasonal `(p, d, q)` order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Autoregressive order.
    pub p: usize,
    /// Differencing order.
    pub d: usize,
    /// Moving-average order.
    pub q: usize,
}

impl Order {
    /// Creates an order.
    #[must_use]
    pub const fn new(p: usize, d: usize, q: usize) -> Self {
        Self { p, d, q }
    }
}

impl Default for Order {
    fn default() -> Self {
        Self::new(2, 1, 2)
    }
}

/// Seasonal `(P, D, Q, s)` order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonalOrder {
    /// Seasonal autoregressive order.
    pub p: usize,
    /// Seasonal differencing order.
    pub d: usize,
    /// Seasonal moving-average order.
    pub q: usize,
    /// Observations per season.
    pub period: usize,
}

impl SeasonalOrder {
    /// Creates a seasonal order.
    #[must_use]
    pub const fn new(p: usize, d: usize, q: usize, period: usize) -> Self {
        Self { p, d, q, period }
    }

    /// No seasonal component.
    #[must_use]
    pub const fn none() -> Self {
        Self::new(0, 0, 0, 0)
    }

    const fn is_active(&self) -> bool {
        self.p > 0 || self.d > 0 || self.q > 0
    }
}

impl Default for SeasonalOrder {
    fn default() -> Self {
        Self::new(1, 1, 1, 5)
    }
}

/// Seasonal ARIMA model.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Sarima {
    order: Order,
    seasonal: SeasonalOrder,
}

impl Sarima {
    /// Creates a model with the given orders.
    #[must_use]
    pub const fn new(order: Order, seasonal: SeasonalOrder) -> Self {
        Self { order, seasonal }
    }

    /// Returns the non-seasonal order.
    #[must_use]
    pub const fn order(&self) -> Order {
        self.order
    }

    /// Returns the seasonal order.
    #[must_use]
    pub const fn seasonal_order(&self) -> SeasonalOrder {
        self.seasonal
    }

    /// Rejects orders that cannot be fitted to `len` observations.
    fn validate(&self, len: usize) -> Result<()> {
        if self.seasonal.is_active() && self.seasonal.period < 2 {
            return Err(ForecastError::InvalidOrder(format!(
                "seasonal period {} must be at least 2",
                self.seasonal.period
            )));
        }
        let has_terms = self.order.p > 0 || self.order.q > 0 || self.order.d > 0;
        if !has_terms && !self.seasonal.is_active() {
            return Err(ForecastError::InvalidOrder(
                "model has no terms".to_string(),
            ));
        }

        let period = self.seasonal.period;
        let span = |short: usize, seasonal: usize| {
            seasonal.checked_mul(period).map(|lag| lag.max(short))
        };
        let differencing = self
            .seasonal
            .d
            .checked_mul(period)
            .and_then(|lag| lag.checked_add(self.order.d));
        let largest = [
            span(self.order.p, self.seasonal.p),
            span(self.order.q, self.seasonal.q),
            differencing,
        ]
        .into_iter()
        .try_fold(0, |acc: usize, lag| lag.map(|lag| acc.max(lag)));

        match largest {
            None => Err(ForecastError::InvalidOrder(format!(
                "lags of {:?} x {:?} overflow",
                self.order, self.seasonal
            ))),
            Some(lag) if lag > len => Err(ForecastError::InvalidOrder(format!(
                "largest lag {lag} exceeds {len} observations"
            ))),
            Some(_) => Ok(()),
        }
    }

    /// Differencing lags in application order: regular first, then seasonal.
    fn differencing_lags(&self) -> Vec<usize> {
        std::iter::repeat_n(1, self.order.d)
            .chain(std::iter::repeat_n(self.seasonal.period, self.seasonal.d))
            .collect()
    }

    fn ar_lags(&self) -> Vec<usize> {
        lag_set(self.order.p, self.seasonal.p, self.seasonal.period)
    }

    fn ma_lags(&self) -> Vec<usize> {
        lag_set(self.order.q, self.seasonal.q, self.seasonal.period)
    }

    /// Fits the model to `data`.
    pub fn fit(&self, data: &[f64]) -> Result<SarimaFit> {
        self.validate(data.len())?;

        let diff_lags = self.differencing_lags();
        let mut levels = vec![data.to_vec()];
        for &lag in &diff_lags {
            let next = levels.last().map(|level| difference(level, lag)).unwrap_or_default();
            levels.push(next);
        }
        let w = levels.last().map(Vec::as_slice).unwrap_or_default();

        let ar_lags = self.ar_lags();
        let ma_lags = self.ma_lags();
        let max_ar = ar_lags.last().copied().unwrap_or(0);
        let max_ma = ma_lags.last().copied().unwrap_or(0);

        let long_order = if ma_lags.is_empty() {
            0
        } else {
            (max_ar + max_ma).max(MIN_LONG_AR_ORDER)
        };
        let start = (long_order + max_ma).max(max_ar);
        let n_params = 1 + ar_lags.len() + ma_lags.len();

        let required = (start + n_params).max(2 * long_order + 1) + MIN_DEGREES_OF_FREEDOM;
        if w.len() < required {
            return Err(ForecastError::InsufficientHistory {
                needed: required + diff_lags.iter().sum::<usize>(),
                available: data.len(),
            });
        }

        let innovations = if ma_lags.is_empty() {
            vec![0.0; w.len()]
        } else {
            long_ar_residuals(w, long_order)?
        };

        let rows = w.len() - start;
        let mut x = Vec::with_capacity(rows * n_params);
        for t in start..w.len() {
            x.push(1.0);
            x.extend(ar_lags.iter().map(|&lag| w[t - lag]));
            x.extend(ma_lags.iter().map(|&lag| innovations[t - lag]));
        }
        let (beta, fitted_residuals) = ols(rows, n_params, &x, &w[start..])?;

        let mut residuals = vec![0.0; start];
        residuals.extend(fitted_residuals.iter());

        let n = rows as f64;
        let k = n_params as f64;
        let sigma2 = fitted_residuals.iter().map(|r| r * r).sum::<f64>() / n;
        let log_likelihood = -0.5 * n * (1.0 + (2.0 * std::f64::consts::PI * sigma2).ln());
        let aic = -2.0 * log_likelihood + 2.0 * k;
        let bic = -2.0 * log_likelihood + k * n.ln();
        if !aic.is_finite() || !bic.is_finite() {
            return Err(ForecastError::NonFinite("fit statistics"));
        }

        let ar = ar_lags
            .iter()
            .zip(beta.iter().skip(1))
            .map(|(&lag, &phi)| (lag, phi))
            .collect();
        let ma = ma_lags
            .iter()
            .zip(beta.iter().skip(1 + ar_lags.len()))
            .map(|(&lag, &theta)| (lag, theta))
            .collect();

        debug!(aic, bic, sigma2, rows, "Fitted seasonal ARIMA");

        Ok(SarimaFit {
            levels,
            diff_lags,
            constant: beta[0],
            ar,
            ma,
            residuals,
            sigma2,
            aic,
            bic,
        })
    }
}

impl SeriesModel for Sarima {
    fn fit_forecast(&self, closes: &[f64], n_steps: usize) -> Result<ModelForecast> {
        let fit = self.fit(closes)?;
        Ok(ModelForecast {
            values: fit.forecast(n_steps)?,
            aic: fit.aic,
            bic: fit.bic,
        })
    }
}

/// A fitted model, ready to forecast.
#[derive(Clone, Debug)]
pub struct SarimaFit {
    /// Series at each differencing stage; the last one is what was regressed.
    levels: Vec<Vec<f64>>,
    diff_lags: Vec<usize>,
    constant: f64,
    ar: Vec<(usize, f64)>,
    ma: Vec<(usize, f64)>,
    residuals: Vec<f64>,
    sigma2: f64,
    aic: f64,
    bic: f64,
}

impl SarimaFit {
    /// Intercept of the differenced regression.
    #[must_use]
    pub const fn constant(&self) -> f64 {
        self.constant
    }

    /// `(lag, coefficient)` pairs of the autoregressive part.
    #[must_use]
    pub fn ar_coefficients(&self) -> &[(usize, f64)] {
        &self.ar
    }

    /// `(lag, coefficient)` pairs of the moving-average part.
    #[must_use]
    pub fn ma_coefficients(&self) -> &[(usize, f64)] {
        &self.ma
    }

    /// Residual variance.
    #[must_use]
    pub const fn sigma2(&self) -> f64 {
        self.sigma2
    }

    /// Akaike information criterion.
    #[must_use]
    pub const fn aic(&self) -> f64 {
        self.aic
    }

    /// Bayesian information criterion.
    #[must_use]
    pub const fn bic(&self) -> f64 {
        self.bic
    }

    /// Forecasts `n_steps` values past the end of the fitted series.
    ///
    /// Future innovations are set to their expectation, zero.
    pub fn forecast(&self, n_steps: usize) -> Result<Vec<f64>> {
        let w = self.levels.last().map(Vec::as_slice).unwrap_or_default();
        let mut extended = w.to_vec();
        let mut innovations = self.residuals.clone();

        for _ in 0..n_steps {
            let t = extended.len();
            let mut next = self.constant;
            for &(lag, phi) in &self.ar {
                next += phi * extended[t - lag];
            }
            for &(lag, theta) in &self.ma {
                next += theta * innovations[t - lag];
            }
            extended.push(next);
            innovations.push(0.0);
        }

        let mut path = extended.split_off(w.len());
        for (level, &lag) in self.levels.iter().rev().skip(1).zip(self.diff_lags.iter().rev()) {
            path = integrate(level, &path, lag);
        }

        if path.iter().any(|v| !v.is_finite()) {
            return Err(ForecastError::NonFinite("forecast"));
        }
        Ok(path)
    }
}

/// `1..=short` plus the first `seasonal` multiples of `period`.
fn lag_set(short: usize, seasonal: usize, period: usize) -> Vec<usize> {
    let mut lags: BTreeSet<usize> = (1..=short).collect();
    lags.extend((1..=seasonal).map(|j| j * period));
    lags.into_iter().collect()
}

/// Lag-`lag` difference. Empty if the series is not longer than `lag`.
pub(crate) fn difference(data: &[f64], lag: usize) -> Vec<f64> {
    if data.len() <= lag {
        return Vec::new();
    }
    (lag..data.len()).map(|t| data[t] - data[t - lag]).collect()
}

/// Continues `base` with lag-`lag` differences and returns the new values.
pub(crate) fn integrate(base: &[f64], diffs: &[f64], lag: usize) -> Vec<f64> {
    let mut extended = base.to_vec();
    for &d in diffs {
        let prev = extended.len().checked_sub(lag).map_or(0.0, |i| extended[i]);
        extended.push(prev + d);
    }
    extended.split_off(base.len())
}

/// Residuals of an AR(`order`) with intercept; zero before `order`.
fn long_ar_residuals(w: &[f64], order: usize) -> Result<Vec<f64>> {
    let rows = w.len() - order;
    let mut x = Vec::with_capacity(rows * (order + 1));
    for t in order..w.len() {
        x.push(1.0);
        x.extend((1..=order).map(|i| w[t - i]));
    }
    let (_, fitted) = ols(rows, order + 1, &x, &w[order..])?;

    let mut residuals = vec![0.0; order];
    residuals.extend(fitted.iter());
    Ok(residuals)
}

/// Ordinary least squares `(X'X)^-1 X'y`. Returns coefficients and residuals.
fn ols(rows: usize, cols: usize, x: &[f64], y: &[f64]) -> Result<(DVector<f64>, DVector<f64>)> {
    let x = DMatrix::from_row_slice(rows, cols, x);
    let y = DVector::from_column_slice(y);

    let xtx = x.transpose() * &x;
    let xty = x.transpose() * &y;
    let xtx_inv = xtx.try_inverse().ok_or(ForecastError::Singular)?;
    let beta = xtx_inv * xty;

    if beta.iter().any(|b| !b.is_finite()) {
        return Err(ForecastError::NonFinite("coefficients"));
    }

    let residuals = &y - &x * &beta;
    Ok((beta, residuals))
}
