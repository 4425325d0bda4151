//! Primary-model failures.

use thiserror::Error;

/// Reasons the primary model could not produce a forecast.
///
/// These never reach callers of [`forecast`](crate::forecast); they select the
/// fallback and are logged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ForecastError {
    /// Too few observations for the requested orders.
    #[error("Insufficient history: need {needed} observations, have {available}")]
    InsufficientHistory {
        /// Observations required by the model.
        needed: usize,
        /// Observations supplied.
        available: usize,
    },

    /// The least-squares normal equations could not be inverted.
    #[error("Singular regression matrix")]
    Singular,

    /// A coefficient, fit statistic or forecast was NaN or infinite.
    #[error("Non-finite {0}")]
    NonFinite(&'static str),

    /// The model orders are unusable.
    #[error("Invalid order: {0}")]
    InvalidOrder(String),
}

/// Result type alias using [`ForecastError`].
pub type Result<T> = std::result::Result<T, ForecastError>;
