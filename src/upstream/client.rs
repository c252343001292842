//! Dual-mode authenticated client for the upstream directory service.
//!
//! The service requires different authentication depending on where the
//! agent sits on the network:
//!
//!   - **Direct**: from outside the service subnet (VPN or routed
//!     access), realm-qualified credentials are sent with every request.
//!   - **Session**: from within the subnet, a session cookie is obtained
//!     via a form login handshake and carried on subsequent requests.
//!
//! In auto mode `login` tries direct first and falls back to a session
//! handshake on any failure. The winning scheme is fixed for the lifetime
//! of the client and never re-negotiated per request.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::UpstreamConfig;
use crate::secure::SecureSecret;

use super::error::AuthError;

/// Fixed login handshake path for the session scheme.
const LOGIN_PATH: &str = "/session/login";

/// Header selecting a per-request site context on API calls.
const SITE_HEADER: &str = "x-site-id";

/// Browser-style user agent; the upstream front end rejects unknown clients.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Marker in the landing page body that means this network path is blocked.
const BLOCKED_MARKER: &str = "403 Forbidden";

/// Matches the structured failure message embedded in a failed login
/// response, e.g. `"retry": { ..., "message": "Account locked" }`.
static RETRY_MESSAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""retry"\s*:\s*\{[^}]*?"message"\s*:\s*"([^"]+)""#).expect("valid retry regex")
});

/// One of the two credential-proof mechanisms the upstream accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    Direct,
    Session,
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthScheme::Direct => f.write_str("direct"),
            AuthScheme::Session => f.write_str("session"),
        }
    }
}

/// How `login` selects a scheme: forced at construction, or negotiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    #[default]
    Auto,
    Forced(AuthScheme),
}

impl FromStr for AuthMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(AuthMode::Auto),
            "direct" => Ok(AuthMode::Forced(AuthScheme::Direct)),
            "session" => Ok(AuthMode::Forced(AuthScheme::Session)),
            other => Err(format!(
                "unknown auth mode {other:?} (expected auto, direct, or session)"
            )),
        }
    }
}

/// Authenticated upstream API client.
///
/// Construct, call [`login`](Self::login) once, then issue requests. The
/// resolved scheme is fixed by the first successful login.
pub struct UpstreamClient {
    base_url: String,
    realm: String,
    landing_marker: String,
    success_marker: String,
    mode: AuthMode,
    resolved: Option<AuthScheme>,
    verify_tls: bool,
    direct: reqwest::Client,
    session: reqwest::Client,
    identity: String,
    secret: SecureSecret,
}

impl UpstreamClient {
    /// Creates an unauthenticated client. `login` must be called before
    /// any API request.
    pub fn new(cfg: &UpstreamConfig) -> Result<Self, AuthError> {
        let mode = AuthMode::from_str(&cfg.auth_mode).map_err(AuthError::Config)?;

        if !cfg.verify_tls {
            warn!(
                upstream_url = %cfg.base_url,
                "upstream TLS certificate verification is DISABLED"
            );
        }

        Ok(Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            realm: cfg.realm.clone(),
            landing_marker: cfg.landing_marker.clone(),
            success_marker: cfg.success_marker.clone(),
            mode,
            resolved: None,
            verify_tls: cfg.verify_tls,
            direct: build_client(cfg.verify_tls, false)?,
            session: build_client(cfg.verify_tls, true)?,
            identity: String::new(),
            secret: SecureSecret::empty(),
        })
    }

    /// The scheme fixed by the last successful login, if any.
    pub fn resolved_scheme(&self) -> Option<AuthScheme> {
        self.resolved
    }

    /// Authenticates using the mode chosen at construction.
    ///
    /// Auto mode tries the direct scheme and falls back to the session
    /// handshake on any direct failure. All-or-nothing: a failed attempt
    /// leaves no partial session state behind.
    pub async fn login(&mut self, identity: &str, secret: &SecureSecret) -> Result<(), AuthError> {
        match self.mode {
            AuthMode::Forced(AuthScheme::Direct) => self.direct_login(identity, secret).await,
            AuthMode::Forced(AuthScheme::Session) => self.session_login(identity, secret).await,
            AuthMode::Auto => {
                let direct_err = match self.direct_login(identity, secret).await {
                    Ok(()) => return Ok(()),
                    Err(e) => e,
                };
                debug!(error = %direct_err, "direct login failed, falling back to session");
                match self.session_login(identity, secret).await {
                    Ok(()) => Ok(()),
                    Err(session_err) => Err(AuthError::both_failed(direct_err, session_err)),
                }
            }
        }
    }

    /// One probe request carrying realm-qualified credentials. Any non-2xx
    /// is a hard failure; no fallback is attempted here.
    async fn direct_login(&mut self, identity: &str, secret: &SecureSecret) -> Result<(), AuthError> {
        let resp = self
            .direct
            .get(&self.base_url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .basic_auth(self.qualified_identity(identity), Some(secret.reveal()))
            .send()
            .await
            .map_err(AuthError::DirectNetwork)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AuthError::DirectDenied(status));
        }

        self.remember(identity, secret, AuthScheme::Direct);
        Ok(())
    }

    /// Cookie-session handshake: seed cookies from the landing page, then
    /// POST form credentials to the login endpoint.
    async fn session_login(&mut self, identity: &str, secret: &SecureSecret) -> Result<(), AuthError> {
        // Fresh cookie jar per attempt so a failed handshake never leaves
        // stale session state for the next one.
        let session = build_client(self.verify_tls, true)?;

        let landing = session
            .get(&self.base_url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await
            .map_err(AuthError::SessionNetwork)?;
        let landing_body = landing.text().await.map_err(AuthError::SessionNetwork)?;

        if landing_body.contains(BLOCKED_MARKER) {
            return Err(AuthError::Blocked(
                "access only allowed from inside the service subnet or via VPN".to_string(),
            ));
        }
        if !landing_body.contains(&self.landing_marker) {
            return Err(AuthError::UnexpectedLanding);
        }

        let password = secret.reveal();
        let login_resp = session
            .post(format!("{}{}", self.base_url, LOGIN_PATH))
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::REFERER, &self.base_url)
            .form(&[("username", identity), ("password", password.as_str())])
            .send()
            .await
            .map_err(AuthError::SessionNetwork)?;
        let login_body = login_resp.text().await.map_err(AuthError::SessionNetwork)?;

        if let Some(m) = RETRY_MESSAGE_RE.captures(&login_body) {
            return Err(AuthError::Rejected(m[1].to_string()));
        }
        if !login_body.contains(&self.success_marker) {
            return Err(AuthError::Unspecified);
        }

        self.session = session;
        self.remember(identity, secret, AuthScheme::Session);
        Ok(())
    }

    fn remember(&mut self, identity: &str, secret: &SecureSecret, scheme: AuthScheme) {
        self.identity = identity.to_string();
        self.secret = secret.clone();
        self.resolved = Some(scheme);
        debug!(%scheme, "upstream login succeeded");
    }

    fn qualified_identity(&self, identity: &str) -> String {
        if self.realm.is_empty() {
            identity.to_string()
        } else {
            format!("{}\\{}", self.realm, identity)
        }
    }

    /// Sends an authenticated API request and returns the raw response body.
    ///
    /// The request is signed according to the resolved scheme: recomputed
    /// direct credentials, or the accumulated session cookies. `site`
    /// selects a sub-resource context via a scope header.
    pub async fn request(
        &self,
        method: &'static str,
        path: &str,
        site: Option<&str>,
        body: Option<&serde_json::Value>,
    ) -> Result<Vec<u8>, AuthError> {
        let scheme = self.resolved.ok_or(AuthError::NotAuthenticated)?;
        let url = format!("{}/api{}", self.base_url, path);

        let client = match scheme {
            AuthScheme::Direct => &self.direct,
            AuthScheme::Session => &self.session,
        };

        let http_method = reqwest::Method::from_bytes(method.as_bytes())
            .map_err(|_| AuthError::Config(format!("invalid http method {method:?}")))?;
        let mut req = client
            .request(http_method, &url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::CONTENT_TYPE, "application/json");

        if let Some(site) = site {
            req = req.header(SITE_HEADER, site);
        }
        if scheme == AuthScheme::Direct {
            req = req.basic_auth(
                self.qualified_identity(&self.identity),
                Some(self.secret.reveal()),
            );
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await.map_err(|source| AuthError::Network {
            method,
            path: path.to_string(),
            source,
        })?;

        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|source| AuthError::Network {
                method,
                path: path.to_string(),
                source,
            })?;

        if !status.is_success() {
            return Err(AuthError::Status {
                method,
                path: path.to_string(),
                status,
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        Ok(bytes.to_vec())
    }

    /// GET an API path and decode the JSON response.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        site: Option<&str>,
    ) -> Result<T, AuthError> {
        let body = self.request("GET", path, site, None).await?;
        serde_json::from_slice(&body).map_err(|source| AuthError::Decode {
            path: path.to_string(),
            source,
        })
    }

    /// POST a JSON body to an API path and decode the JSON response.
    pub async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        site: Option<&str>,
        body: &B,
    ) -> Result<T, AuthError> {
        let body = serde_json::to_value(body).map_err(|source| AuthError::Decode {
            path: path.to_string(),
            source,
        })?;
        let resp = self.request("POST", path, site, Some(&body)).await?;
        serde_json::from_slice(&resp).map_err(|source| AuthError::Decode {
            path: path.to_string(),
            source,
        })
    }
}

fn build_client(verify_tls: bool, cookies: bool) -> Result<reqwest::Client, AuthError> {
    let mut builder = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .danger_accept_invalid_certs(!verify_tls);
    if cookies {
        builder = builder.cookie_store(true);
    }
    builder.build().map_err(AuthError::Build)
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn config_for(server: &MockServer, auth_mode: &str) -> UpstreamConfig {
        UpstreamConfig {
            enabled: true,
            base_url: server.uri(),
            identity: "svc-agent".to_string(),
            secret: "s3cret".to_string(),
            auth_mode: auth_mode.to_string(),
            realm: "CORP".to_string(),
            site: "site-100".to_string(),
            verify_tls: true,
            landing_marker: "Directory Portal".to_string(),
            success_marker: "session-established".to_string(),
        }
    }

    fn secret() -> SecureSecret {
        SecureSecret::new("s3cret")
    }

    /// Landing page (no credentials attached), mounted at lower priority than the
    /// direct-login mock so credentialed probes match that one first.
    async fn mount_landing(server: &MockServer, body: &str) {
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(body)
                    .insert_header("set-cookie", "sid=abc123; Path=/"),
            )
            .with_priority(10)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_auto_mode_falls_back_to_session() {
        let server = MockServer::start().await;

        // Direct probe carries basic credentials and is refused.
        Mock::given(method("GET"))
            .and(path("/"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(401))
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;

        mount_landing(&server, "Welcome to the Directory Portal").await;

        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .respond_with(ResponseTemplate::new(200).set_body_string("session-established"))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/whoami"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"user": "svc-agent"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let cfg = config_for(&server, "auto");
        let mut client = UpstreamClient::new(&cfg).unwrap();
        client.login("svc-agent", &secret()).await.expect("login");
        assert_eq!(client.resolved_scheme(), Some(AuthScheme::Session));

        let me: serde_json::Value = client.get_json("/whoami", None).await.expect("whoami");
        assert_eq!(me["user"], "svc-agent");

        // Post-login requests use the cookie path, not direct credentials.
        let requests = server.received_requests().await.unwrap();
        let api_req = requests
            .iter()
            .find(|r| r.url.path() == "/api/whoami")
            .expect("api request recorded");
        assert!(!api_req.headers.contains_key("authorization"));
        assert!(api_req.headers.contains_key("cookie"));
    }

    #[tokio::test]
    async fn test_forced_direct_never_attempts_session() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(401))
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;

        // Session endpoints must never be touched in forced direct mode.
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let cfg = config_for(&server, "direct");
        let mut client = UpstreamClient::new(&cfg).unwrap();
        let err = client.login("svc-agent", &secret()).await.unwrap_err();
        assert!(matches!(err, AuthError::DirectDenied(StatusCode::UNAUTHORIZED)));
        assert_eq!(client.resolved_scheme(), None);
    }

    #[tokio::test]
    async fn test_forced_direct_success_signs_requests() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200))
            .with_priority(1)
            .mount(&server)
            .await;

        let cfg = config_for(&server, "direct");
        let mut client = UpstreamClient::new(&cfg).unwrap();
        client.login("svc-agent", &secret()).await.expect("login");
        assert_eq!(client.resolved_scheme(), Some(AuthScheme::Direct));

        client
            .request("GET", "/roster", Some("site-100"), None)
            .await
            .expect("roster");

        let requests = server.received_requests().await.unwrap();
        let api_req = requests
            .iter()
            .find(|r| r.url.path() == "/api/roster")
            .expect("api request recorded");
        assert!(api_req.headers.contains_key("authorization"));
        assert_eq!(api_req.headers.get(SITE_HEADER).unwrap(), "site-100");
    }

    #[tokio::test]
    async fn test_session_login_blocked_network_path() {
        let server = MockServer::start().await;
        mount_landing(&server, "<html>403 Forbidden</html>").await;

        let cfg = config_for(&server, "session");
        let mut client = UpstreamClient::new(&cfg).unwrap();
        let err = client.login("svc-agent", &secret()).await.unwrap_err();
        assert!(matches!(err, AuthError::Blocked(_)));
    }

    #[tokio::test]
    async fn test_session_login_unexpected_landing() {
        let server = MockServer::start().await;
        mount_landing(&server, "<html>Some other service</html>").await;

        let cfg = config_for(&server, "session");
        let mut client = UpstreamClient::new(&cfg).unwrap();
        let err = client.login("svc-agent", &secret()).await.unwrap_err();
        assert!(matches!(err, AuthError::UnexpectedLanding));
    }

    #[tokio::test]
    async fn test_session_login_surfaces_structured_rejection() {
        let server = MockServer::start().await;
        mount_landing(&server, "Directory Portal").await;

        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"retry": {"code": 7, "message": "Account locked"}}"#,
            ))
            .mount(&server)
            .await;

        let cfg = config_for(&server, "session");
        let mut client = UpstreamClient::new(&cfg).unwrap();
        let err = client.login("svc-agent", &secret()).await.unwrap_err();
        assert!(matches!(err, AuthError::Rejected(msg) if msg == "Account locked"));
    }

    #[tokio::test]
    async fn test_session_login_without_success_marker_is_unspecified() {
        let server = MockServer::start().await;
        mount_landing(&server, "Directory Portal").await;

        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>try again</html>"))
            .mount(&server)
            .await;

        let cfg = config_for(&server, "session");
        let mut client = UpstreamClient::new(&cfg).unwrap();
        let err = client.login("svc-agent", &secret()).await.unwrap_err();
        assert!(matches!(err, AuthError::Unspecified));
    }

    #[tokio::test]
    async fn test_request_before_login_is_rejected() {
        let server = MockServer::start().await;
        let cfg = config_for(&server, "auto");
        let client = UpstreamClient::new(&cfg).unwrap();

        let err = client.request("GET", "/roster", None, None).await.unwrap_err();
        assert!(matches!(err, AuthError::NotAuthenticated));
    }

    #[test]
    fn test_auth_mode_parsing() {
        assert_eq!("auto".parse::<AuthMode>().unwrap(), AuthMode::Auto);
        assert_eq!("".parse::<AuthMode>().unwrap(), AuthMode::Auto);
        assert_eq!(
            "direct".parse::<AuthMode>().unwrap(),
            AuthMode::Forced(AuthScheme::Direct)
        );
        assert_eq!(
            "Session".parse::<AuthMode>().unwrap(),
            AuthMode::Forced(AuthScheme::Session)
        );
        assert!("cookie".parse::<AuthMode>().is_err());
    }
}
