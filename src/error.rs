//! Error types shared across the exchange service.

use thiserror::Error;

/// Errors surfaced by providers, the failover orchestrator and the rate
/// limiting layer.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Upstream answered with a non-success status.
    #[error("{provider} api is unavailable")]
    UpstreamUnavailable { provider: String, status: u16 },

    /// The target currency is missing from the provider snapshot.
    #[error("exchange rate for {0} not found")]
    RateNotFound(String),

    /// The historical response carried no rate series.
    #[error("no historical rates found for {0}")]
    HistoricalDataUnavailable(String),

    /// `amount * rate` left the representable decimal range.
    #[error("conversion to {0} overflowed")]
    ConversionOverflow(String),

    /// The limiter queue is full or the window is exhausted.
    #[error("rate limit exceeded")]
    RateLimitExceeded,

    /// Shutdown fired while the request was waiting for a permit.
    #[error("request cancelled")]
    Cancelled,

    /// Connection-level failure talking to a provider.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Provider response did not match the expected shape.
    #[error("failed to parse {provider} response: {source}")]
    Decode {
        provider: String,
        source: serde_json::Error,
    },
}

pub type ExchangeResult<T> = Result<T, ExchangeError>;
