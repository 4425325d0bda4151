//! Forecast entry points.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use quotes_core::TimeSeries;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::{
    error::Result,
    fallback,
    sarima::{Order, Sarima, SeasonalOrder},
    stats::{mean, population_std},
};

/// Default forecast horizon in days.
pub const DEFAULT_STEPS: usize = 7;

/// Default training history in observations.
pub const DEFAULT_HISTORY: usize = 365;

/// A model that fits a closing-price history and forecasts ahead.
///
/// [`Sarima`] is the stock implementation; any other model can be supplied to
/// [`forecast_with`].
pub trait SeriesModel: fmt::Debug {
    /// Fits `closes` and returns `n_steps` point forecasts.
    fn fit_forecast(&self, closes: &[f64], n_steps: usize) -> Result<ModelForecast>;
}

/// Output of a successful primary fit.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelForecast {
    /// Point forecasts, one per step.
    pub values: Vec<f64>,
    /// Akaike information criterion of the fit.
    pub aic: f64,
    /// Bayesian information criterion of the fit.
    pub bic: f64,
}

/// Which method produced a forecast.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastMethod {
    /// The seasonal ARIMA primary model.
    Sarima,
    /// Trailing mean with Gaussian noise.
    MovingAverageFallback,
}

impl ForecastMethod {
    /// Returns the method name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sarima => "sarima",
            Self::MovingAverageFallback => "moving_average_fallback",
        }
    }
}

impl fmt::Display for ForecastMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Forecast request parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastOptions {
    /// Steps (calendar days) to forecast.
    pub n_steps: usize,
    /// Most recent observations used for fitting; 0 uses all.
    pub history: usize,
    /// Non-seasonal order of the primary model.
    pub order: Order,
    /// Seasonal order of the primary model.
    pub seasonal_order: SeasonalOrder,
    /// Seed for the fallback noise; `None` draws from entropy.
    pub seed: Option<u64>,
}

impl Default for ForecastOptions {
    fn default() -> Self {
        Self {
            n_steps: DEFAULT_STEPS,
            history: DEFAULT_HISTORY,
            order: Order::default(),
            seasonal_order: SeasonalOrder::default(),
            seed: None,
        }
    }
}

impl ForecastOptions {
    /// Sets the horizon.
    #[must_use]
    pub const fn with_n_steps(mut self, n_steps: usize) -> Self {
        self.n_steps = n_steps;
        self
    }

    /// Sets the training history length.
    #[must_use]
    pub const fn with_history(mut self, history: usize) -> Self {
        self.history = history;
        self
    }

    /// Sets the non-seasonal order.
    #[must_use]
    pub const fn with_order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    /// Sets the seasonal order.
    #[must_use]
    pub const fn with_seasonal_order(mut self, seasonal_order: SeasonalOrder) -> Self {
        self.seasonal_order = seasonal_order;
        self
    }

    /// Seeds the fallback noise.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Point forecasts with the method that produced them.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ForecastResult {
    /// Method that produced `values`.
    pub method: ForecastMethod,
    /// Calendar days following the last observation, one per step.
    pub dates: Vec<NaiveDate>,
    /// Point forecasts.
    pub values: Vec<f64>,
    /// `aic`, `bic`, `last_price`, `mean_forecast` and `std_forecast` for the
    /// primary model; `last_price` and `mean_forecast` for the fallback.
    pub diagnostics: BTreeMap<String, f64>,
}

/// Forecasts `series` with a seasonal ARIMA, falling back to a moving average.
pub fn forecast(series: &TimeSeries, options: &ForecastOptions) -> ForecastResult {
    let model = Sarima::new(options.order, options.seasonal_order);
    forecast_with(&model, series, options)
}

/// Forecasts `series` with `model`, falling back to a moving average on any
/// model failure.
#[instrument(skip_all, fields(symbol = %series.symbol(), n_steps = options.n_steps))]
pub fn forecast_with<M>(model: &M, series: &TimeSeries, options: &ForecastOptions) -> ForecastResult
where
    M: SeriesModel + ?Sized,
{
    let history = series.clone().tail(options.history);
    let closes = history.closes();
    let last_price = history.last().close;
    let dates = future_dates(history.last_date(), options.n_steps);

    match model.fit_forecast(&closes, options.n_steps) {
        Ok(fit) if fit.values.len() == options.n_steps => {
            debug!(aic = fit.aic, bic = fit.bic, "Primary model forecast");
            let diagnostics = BTreeMap::from([
                ("aic".to_string(), fit.aic),
                ("bic".to_string(), fit.bic),
                ("last_price".to_string(), last_price),
                ("mean_forecast".to_string(), mean(&fit.values)),
                ("std_forecast".to_string(), population_std(&fit.values)),
            ]);
            ForecastResult {
                method: ForecastMethod::Sarima,
                dates,
                values: fit.values,
                diagnostics,
            }
        }
        outcome => {
            match outcome {
                Err(e) => warn!(error = %e, "Primary model failed, using moving-average fallback"),
                Ok(fit) => warn!(
                    got = fit.values.len(),
                    "Primary model returned the wrong horizon, using moving-average fallback"
                ),
            }
            let values = fallback::moving_average(&closes, options.n_steps, options.seed);
            let diagnostics = BTreeMap::from([
                ("last_price".to_string(), last_price),
                ("mean_forecast".to_string(), mean(&values)),
            ]);
            ForecastResult {
                method: ForecastMethod::MovingAverageFallback,
                dates,
                values,
                diagnostics,
            }
        }
    }
}

/// The `n` calendar days after `last`.
fn future_dates(last: NaiveDate, n: usize) -> Vec<NaiveDate> {
    std::iter::successors(last.succ_opt(), NaiveDate::succ_opt)
        .take(n)
        .collect()
}
