//! Error types for quote acquisition.
//!
//! This module defines [`QuoteError`] which covers every way an adapter call can
//! fail: transport errors, unexpected HTTP statuses, malformed or empty payloads
//! and local rate-limit denials.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while fetching quotes from a provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QuoteError {
    /// Network-related errors (connection failures, timeouts, etc.).
    #[error("Network error: {0}")]
    Network(String),

    /// The provider answered with a non-success HTTP status.
    #[error("{provider} returned HTTP {status}")]
    Status {
        /// The provider that answered.
        provider: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The provider payload could not be decoded.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The provider answered successfully but carried no usable data.
    #[error("{provider} returned no data for {symbol}")]
    EmptyPayload {
        /// The provider that answered.
        provider: String,
        /// The symbol that was requested.
        symbol: String,
    },

    /// The local call budget for a provider is exhausted.
    ///
    /// Raised before any request is dispatched, so nothing was recorded.
    #[error("Rate limited by {provider}: retry after {retry_after:?}")]
    RateLimited {
        /// The provider whose budget is exhausted.
        provider: String,
        /// Time until a slot frees up, if one ever will.
        retry_after: Option<Duration>,
    },

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// No provider is registered for the requested symbol.
    #[error("Provider not configured: {0}")]
    ProviderNotConfigured(String),

    /// Any other error.
    #[error("{0}")]
    Other(String),
}

impl QuoteError {
    /// Returns true if the failure means "the provider has no data", as opposed
    /// to "the provider misbehaved".
    #[must_use]
    pub const fn is_no_data(&self) -> bool {
        matches!(self, Self::EmptyPayload { .. })
    }

    /// Returns true for a local admission denial.
    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

/// Result type alias using [`QuoteError`].
pub type Result<T> = std::result::Result<T, QuoteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let empty = QuoteError::EmptyPayload {
            provider: "brapi".to_string(),
            symbol: "PETR4".to_string(),
        };
        assert!(empty.is_no_data());
        assert!(!empty.is_rate_limited());

        let status = QuoteError::Status {
            provider: "brapi".to_string(),
            status: 404,
        };
        assert!(!status.is_no_data());
        assert_eq!(status.to_string(), "brapi returned HTTP 404");

        let limited = QuoteError::RateLimited {
            provider: "brapi".to_string(),
            retry_after: Some(Duration::from_secs(3)),
        };
        assert!(limited.is_rate_limited());
    }
}
