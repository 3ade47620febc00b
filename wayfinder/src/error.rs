//! Discovery client error types

use thiserror::Error;

/// Errors that can occur while resolving endpoints or executing requests
#[derive(Error, Debug, Clone)]
pub enum DiscoveryError {
    /// Resolver I/O or parse failure. Recovered inside the resolver stack,
    /// never returned from the request path.
    #[error("Resolution error: {0}")]
    Resolution(String),

    #[error("No available endpoints to send the request to")]
    NoAvailableEndpoints,

    /// The status evaluator judged the response to be a final answer
    #[error("Non-retryable response with status {status} from {endpoint}")]
    NonRetryableClientError { status: u16, endpoint: String },

    /// A candidate answered with a status the evaluator marks retryable
    #[error("Retryable response with status {status} from {endpoint}")]
    RetryableServerError { status: u16, endpoint: String },

    #[error("All {attempts} endpoints exhausted, last error: {last}")]
    AllEndpointsExhausted {
        attempts: usize,
        last: Box<DiscoveryError>,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Client has been shut down")]
    Shutdown,
}

impl DiscoveryError {
    /// Get the error type as a string for metrics labeling
    pub fn error_type(&self) -> &'static str {
        match self {
            DiscoveryError::Resolution(_) => "resolution",
            DiscoveryError::NoAvailableEndpoints => "no_available_endpoints",
            DiscoveryError::NonRetryableClientError { .. } => "non_retryable",
            DiscoveryError::RetryableServerError { .. } => "retryable",
            DiscoveryError::AllEndpointsExhausted { .. } => "exhausted",
            DiscoveryError::Transport(_) => "transport",
            DiscoveryError::Timeout(_) => "timeout",
            DiscoveryError::Serialization(_) => "serialization",
            DiscoveryError::Config(_) => "config",
            DiscoveryError::Shutdown => "shutdown",
        }
    }

    /// Whether the error came from the network layer rather than a server answer
    pub fn is_transport(&self) -> bool {
        matches!(self, DiscoveryError::Transport(_) | DiscoveryError::Timeout(_))
    }
}

impl From<reqwest::Error> for DiscoveryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DiscoveryError::Timeout(err.to_string())
        } else if err.is_decode() {
            DiscoveryError::Serialization(err.to_string())
        } else {
            DiscoveryError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for DiscoveryError {
    fn from(err: serde_json::Error) -> Self {
        DiscoveryError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for DiscoveryError {
    fn from(err: toml::de::Error) -> Self {
        DiscoveryError::Config(err.to_string())
    }
}

impl From<std::io::Error> for DiscoveryError {
    fn from(err: std::io::Error) -> Self {
        DiscoveryError::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DiscoveryError>;
