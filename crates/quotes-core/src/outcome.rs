//! Typed result of a resilient series fetch.

use std::time::Duration;

use crate::{error::QuoteError, types::TimeSeries};

/// Outcome of fetching a series through the orchestrator.
///
/// Every adapter failure is folded into one of these variants; nothing is
/// raised past the orchestrator.
#[derive(Clone, Debug, PartialEq)]
pub enum FetchOutcome {
    /// A non-empty, normalized series.
    Success(TimeSeries),
    /// The provider had no data for the symbol after all attempts.
    NotFound,
    /// The provider failed; carries the last failure reason.
    ProviderError(String),
    /// The call budget can not admit the request.
    RateLimited(Option<Duration>),
}

impl FetchOutcome {
    /// Classifies the final error of an exhausted retry loop.
    ///
    /// `all_no_data` is true when every attempt failed for lack of data.
    #[must_use]
    pub fn from_exhausted(last: Option<&QuoteError>, all_no_data: bool) -> Self {
        match last {
            None => Self::NotFound,
            Some(_) if all_no_data => Self::NotFound,
            Some(QuoteError::RateLimited { retry_after, .. }) => Self::RateLimited(*retry_after),
            Some(err) => Self::ProviderError(err.to_string()),
        }
    }

    /// Returns true for [`FetchOutcome::Success`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns the series, discarding the failure kind.
    #[must_use]
    pub fn into_series(self) -> Option<TimeSeries> {
        match self {
            Self::Success(series) => Some(series),
            _ => None,
        }
    }
}
