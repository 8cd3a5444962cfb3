//! Error types for the semantic search backend.

use thiserror::Error;

/// Errors raised by the outbound clients, the pipeline and the API layer.
#[derive(Debug, Error)]
pub enum Error {
    /// A managed service endpoint was not configured.
    #[error("{0} endpoint not configured")]
    NotConfigured(&'static str),

    /// No AWS credentials could be resolved for signing.
    #[error("Unable to get AWS credentials")]
    CredentialsUnavailable,

    /// The upstream service answered with a non-success status.
    #[error("{service} request failed: {status} {body}")]
    Upstream {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// The push destination no longer exists.
    #[error("connection {0} is gone")]
    ConnectionGone(String),

    /// The embedding model returned no vector.
    #[error("no embedding returned by model {0}")]
    MissingEmbedding(String),

    /// The text model returned no completion text.
    #[error("no completion returned by model {0}")]
    EmptyCompletion(String),

    /// Request could not be signed.
    #[error("signing error: {0}")]
    Signing(String),

    /// Configuration could not be loaded or is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// API server error.
    #[error("API error: {0}")]
    Api(String),

    /// Transport-level HTTP failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON encoding or decoding failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::Config(err.to_string())
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
