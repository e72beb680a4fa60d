//! Error types for the rug scanner

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the rug scanner
#[derive(Error, Debug)]
pub enum Error {
    // Input and configuration errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    // Provider errors (transient, retried by the provider layer)
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Provider timeout after {0}ms")]
    ProviderTimeout(u64),

    #[error("Provider rate limited: {0}")]
    RateLimited(String),

    // Provider errors (permanent)
    #[error("Provider API error {status}: {body}")]
    Api { status: u16, body: String },

    /// Provider could not return data for an address after all retries
    #[error("Data unavailable for {address}: {reason}")]
    DataUnavailable { address: String, reason: String },

    // Scan lifecycle
    #[error("Scan cancelled")]
    Cancelled,

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Provider(_) | Error::ProviderTimeout(_) | Error::RateLimited(_)
        )
    }

    /// Check if this error means the scan result cannot be trusted
    ///
    /// Such scans are reported as inconclusive, never as a numeric score.
    pub fn is_inconclusive(&self) -> bool {
        matches!(self, Error::DataUnavailable { .. })
    }

    /// Wrap any provider failure for `address` as `DataUnavailable`
    pub fn data_unavailable(address: impl Into<String>, cause: &Error) -> Self {
        match cause {
            Error::DataUnavailable { address, reason } => Error::DataUnavailable {
                address: address.clone(),
                reason: reason.clone(),
            },
            other => Error::DataUnavailable {
                address: address.into(),
                reason: other.to_string(),
            },
        }
    }

    /// Treat a provider failure for `address` as missing data
    ///
    /// Lifecycle and input errors (`Cancelled`, `InvalidInput`, `Config`) are
    /// returned unchanged.
    pub fn into_unavailable(self, address: &str) -> Self {
        match self {
            Error::Cancelled | Error::InvalidInput(_) | Error::Config(_) => self,
            other => Error::data_unavailable(address, &other),
        }
    }
}

// Conversion from reqwest errors
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::ProviderTimeout(0)
        } else if e.is_decode() {
            Error::Deserialization(e.to_string())
        } else {
            Error::Provider(e.to_string())
        }
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
