//! Authenticated HTTP client for the tenant control-plane API.
//!
//! Every request carries the agent's bearer credential and identity
//! headers and passes through a shared token-bucket rate limiter. The
//! client performs no automatic retries; jobs skip the failed tick and
//! rely on the next scheduled run.

use std::sync::RwLock;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::TenantConfig;
use crate::ratelimit::RateLimiter;
use crate::secure::SecureSecret;

use super::envelope::{self, EnvelopeKey};
use super::error::TransportError;

/// Agent version reported to the tenant on every request.
pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Fixed per-request timeout. Job bodies inherit this bound, which keeps
/// a scheduler stop from waiting on a hung request forever.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Rate limiter defaults: burst of 100, one token back every 100 ms.
const LIMITER_CAPACITY: u32 = 100;
const LIMITER_REFILL: Duration = Duration::from_millis(100);

/// Authenticated, rate-limited HTTP client for the tenant API.
///
/// Immutable after construction except for explicit credential rotation.
/// Cheap to share behind an `Arc`; the underlying reqwest client and the
/// rate limiter are both safe for concurrent use.
#[derive(Debug)]
pub struct TenantClient {
    http: reqwest::Client,
    base_url: String,
    api_key: RwLock<SecureSecret>,
    agent_id: String,
    limiter: RateLimiter,
}

impl TenantClient {
    /// Builds a client from an explicit tenant configuration snapshot.
    ///
    /// Disabling TLS verification is honored but never silent.
    pub fn new(cfg: &TenantConfig) -> Result<Self, TransportError> {
        if cfg.url.is_empty() {
            return Err(TransportError::Config("tenant url is not set".into()));
        }

        if !cfg.verify_tls {
            warn!(
                tenant_url = %cfg.url,
                "TLS certificate verification is DISABLED - connections are vulnerable to MITM attacks"
            );
        }

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(!cfg.verify_tls)
            .build()
            .map_err(TransportError::Build)?;

        Ok(Self {
            http,
            base_url: cfg.url.trim_end_matches('/').to_string(),
            api_key: RwLock::new(SecureSecret::new(cfg.api_key.clone())),
            agent_id: cfg.agent_id.clone(),
            limiter: RateLimiter::new(LIMITER_CAPACITY, LIMITER_REFILL),
        })
    }

    /// Full URL for an API path under the configured tenant base URL.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Replaces the bearer credential. The old secret is wiped on drop.
    ///
    /// Takes effect for all subsequent requests, including from other
    /// tasks sharing this client.
    pub fn rotate_credential(&self, api_key: SecureSecret) {
        *self.api_key.write().expect("api key lock poisoned") = api_key;
        info!("tenant: bearer credential rotated");
    }

    /// Standard headers attached to every tenant request.
    fn headers(&self, content_type: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();

        let api_key = self.api_key.read().expect("api key lock poisoned");
        let mut auth = HeaderValue::try_from(format!("Bearer {}", api_key.reveal()))
            .unwrap_or_else(|_| HeaderValue::from_static(""));
        auth.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, auth);

        headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static(content_type),
        );
        headers.insert(
            reqwest::header::USER_AGENT,
            HeaderValue::try_from(format!("OutpostAgent/v{AGENT_VERSION}"))
                .unwrap_or_else(|_| HeaderValue::from_static("OutpostAgent")),
        );
        if let Ok(id) = HeaderValue::try_from(self.agent_id.as_str()) {
            headers.insert("x-outpost-agent", id);
        }
        headers.insert(
            "x-outpost-agent-version",
            HeaderValue::from_static(AGENT_VERSION),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static("application/json"),
        );

        headers
    }

    /// Takes a rate limiter token, logging when the request is throttled.
    async fn throttle(&self, url: &str) {
        if !self.limiter.allow() {
            warn!(%url, "rate limit reached, throttling request");
            self.limiter.wait().await;
        }
    }

    /// Performs an authenticated GET request.
    pub async fn get(&self, url: &str) -> Result<Response, TransportError> {
        self.throttle(url).await;

        self.http
            .get(url)
            .headers(self.headers("application/json"))
            .send()
            .await
            .map_err(|source| TransportError::Network {
                method: "GET",
                url: url.to_string(),
                source,
            })
    }

    /// Performs an authenticated POST with the value serialized as JSON.
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
    ) -> Result<Response, TransportError> {
        self.throttle(url).await;

        let body = serde_json::to_vec(body).map_err(TransportError::Encode)?;
        debug!(%url, body_size = body.len(), "tenant: POST request");

        self.http
            .post(url)
            .headers(self.headers("application/json"))
            .body(body)
            .send()
            .await
            .map_err(|source| TransportError::Network {
                method: "POST",
                url: url.to_string(),
                source,
            })
    }

    /// GET a URL and decode the JSON response body.
    ///
    /// Any status other than 200 is a terminal error for the call.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, TransportError> {
        let body = self.get_ok_bytes(url).await?;
        serde_json::from_slice(&body).map_err(|source| TransportError::Decode {
            method: "GET",
            url: url.to_string(),
            source,
        })
    }

    /// GET a URL whose response body is a sealed envelope, open it with
    /// `key`, and decode the plaintext as JSON.
    pub async fn get_encrypted_json<T: DeserializeOwned>(
        &self,
        url: &str,
        key: &EnvelopeKey,
    ) -> Result<T, TransportError> {
        let body = self.get_ok_bytes(url).await?;

        let plaintext =
            envelope::open(key, &body).map_err(|source| TransportError::Envelope {
                method: "GET",
                url: url.to_string(),
                source,
            })?;

        serde_json::from_slice(&plaintext).map_err(|source| TransportError::Decode {
            method: "GET",
            url: url.to_string(),
            source,
        })
    }

    /// Serializes `body` as JSON, seals it with a fresh nonce under `key`,
    /// and POSTs the envelope as an opaque byte stream.
    pub async fn post_encrypted_json<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
        key: &EnvelopeKey,
    ) -> Result<Response, TransportError> {
        self.throttle(url).await;

        let plaintext = serde_json::to_vec(body).map_err(TransportError::Encode)?;
        let sealed = envelope::seal(key, &plaintext).map_err(|source| TransportError::Envelope {
            method: "POST",
            url: url.to_string(),
            source,
        })?;
        debug!(%url, envelope_size = sealed.len(), "tenant: encrypted POST request");

        self.http
            .post(url)
            .headers(self.headers("application/octet-stream"))
            .body(sealed)
            .send()
            .await
            .map_err(|source| TransportError::Network {
                method: "POST",
                url: url.to_string(),
                source,
            })
    }

    /// Verifies the agent can reach the tenant API and is acknowledged.
    ///
    /// Succeeds only when the health endpoint decodes to exactly
    /// `{"status": "ok"}`.
    pub async fn test_connectivity(&self) -> Result<(), TransportError> {
        #[derive(serde::Deserialize)]
        struct HealthResponse {
            status: String,
        }

        let health: HealthResponse = self.get_json(&self.url("/api/agent/test")).await?;
        if health.status != "ok" {
            return Err(TransportError::Unhealthy(health.status));
        }
        Ok(())
    }

    /// GET a URL, require HTTP 200, and return the raw body bytes.
    async fn get_ok_bytes(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        let resp = self.get(url).await?;

        let status = resp.status();
        if status != StatusCode::OK {
            return Err(TransportError::UnexpectedStatus {
                method: "GET",
                url: url.to_string(),
                status,
            });
        }

        let body = resp
            .bytes()
            .await
            .map_err(|source| TransportError::Network {
                method: "GET",
                url: url.to_string(),
                source,
            })?;
        Ok(body.to_vec())
    }
}
