//! Transport error types.

use reqwest::StatusCode;
use thiserror::Error;

use super::envelope::EnvelopeError;

/// Errors from the tenant transport client.
///
/// Each variant carries the method and URL it failed on so callers can
/// diagnose without the client ever logging credentials or decrypted
/// payload contents.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid transport configuration: {0}")]
    Config(String),

    #[error("failed to build http client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("failed to serialize request body: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("{method} {url}: {source}")]
    Network {
        method: &'static str,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} {url}: unexpected status {status}")]
    UnexpectedStatus {
        method: &'static str,
        url: String,
        status: StatusCode,
    },

    #[error("{method} {url}: invalid JSON response: {source}")]
    Decode {
        method: &'static str,
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{method} {url}: {source}")]
    Envelope {
        method: &'static str,
        url: String,
        #[source]
        source: EnvelopeError,
    },

    #[error("connectivity test returned status {0:?}")]
    Unhealthy(String),
}
