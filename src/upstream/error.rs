//! Upstream authentication and request error types.

use reqwest::StatusCode;
use thiserror::Error;

/// Errors from the upstream dual-mode client.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid upstream configuration: {0}")]
    Config(String),

    #[error("failed to build upstream http client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("direct login: {0}")]
    DirectNetwork(#[source] reqwest::Error),

    #[error("direct login: server returned {0}")]
    DirectDenied(StatusCode),

    #[error("session login: {0}")]
    SessionNetwork(#[source] reqwest::Error),

    #[error("session login blocked: {0}")]
    Blocked(String),

    #[error("session login: unexpected landing page, expected marker not found")]
    UnexpectedLanding,

    #[error("session login failed: {0}")]
    Rejected(String),

    #[error("session login failed: unspecified failure")]
    Unspecified,

    #[error("not authenticated: call login() first")]
    NotAuthenticated,

    #[error("{method} {path}: {source}")]
    Network {
        method: &'static str,
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} {path} returned {status}: {body}")]
    Status {
        method: &'static str,
        path: String,
        status: StatusCode,
        body: String,
    },

    #[error("{path}: invalid JSON response: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("both auth modes failed: direct: {direct}; session: {session}")]
    BothFailed {
        direct: Box<AuthError>,
        session: Box<AuthError>,
    },
}

impl AuthError {
    /// Combines the two login failures from auto mode into one error,
    /// preferring the clearer cause: a structured rejection or an explicit
    /// network-path block from the session handshake wins outright.
    pub(crate) fn both_failed(direct: AuthError, session: AuthError) -> AuthError {
        match session {
            AuthError::Rejected(_) | AuthError::Blocked(_) => session,
            session => AuthError::BothFailed {
                direct: Box::new(direct),
                session: Box::new(session),
            },
        }
    }
}
