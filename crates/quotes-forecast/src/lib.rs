#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! # Example
//!
//! ```rust,ignore
//! use quotes_forecast::{ForecastOptions, forecast};
//!
//! let result = forecast(&series, &ForecastOptions::default().with_n_steps(10));
//! println!("{} -> {:?}", result.method, result.values);
//! ```

/// Primary-model error type.
pub mod error;
/// Moving-average fallback.
pub mod fallback;
/// Forecast entry points and result types.
pub mod forecast;
/// Seasonal ARIMA model.
pub mod sarima;

mod stats;

pub use error::ForecastError;
pub use forecast::{
    ForecastMethod, ForecastOptions, ForecastResult, ModelForecast, SeriesModel, forecast,
    forecast_with,
};
pub use sarima::{Order, Sarima, SarimaFit, SeasonalOrder};
