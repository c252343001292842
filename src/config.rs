//! Agent configuration types and loading.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::tenant::EnvelopeKey;
use crate::upstream::AuthMode;

/// Main agent configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Control-plane connection settings
    pub tenant: TenantConfig,

    /// Upstream directory service settings
    pub upstream: UpstreamConfig,

    /// Job intervals
    pub jobs: JobsConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Validate configuration before use.
    ///
    /// Fails fast with clear messages so bad values never surface later as
    /// mid-job errors: missing credentials, malformed encryption keys, and
    /// unknown auth modes are all caught here.
    pub fn validate(&self) -> Result<()> {
        if self.tenant.url.is_empty() {
            return Err(eyre::eyre!("tenant url is not set"));
        }
        if self.tenant.api_key.is_empty() {
            return Err(eyre::eyre!("tenant api-key is not set"));
        }
        if !self.tenant.encryption_key.is_empty() {
            self.tenant
                .encryption_key()
                .wrap_err("invalid tenant encryption-key")?;
        }
        if self.upstream.enabled {
            AuthMode::from_str(&self.upstream.auth_mode)
                .map_err(|e| eyre::eyre!("invalid upstream auth-mode: {e}"))?;
            if self.upstream.base_url.is_empty() {
                return Err(eyre::eyre!("upstream enabled but base-url is not set"));
            }
        }
        Ok(())
    }

    /// Load configuration with fallback chain.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path)
                .context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .outpost-agent.yml
        let local_config = PathBuf::from(".outpost-agent.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/outpost-agent/config.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("outpost-agent").join("config.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Control-plane (tenant) connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct TenantConfig {
    /// Tenant API base URL
    pub url: String,

    /// Bearer credential for agent requests
    pub api_key: String,

    /// Stable identity of this agent install
    pub agent_id: String,

    /// Verify the tenant's TLS certificate (disabling is loudly warned)
    pub verify_tls: bool,

    /// Hex-encoded 32-byte key for encrypted payload exchange, provisioned
    /// by the tenant
    pub encryption_key: String,
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            agent_id: String::new(),
            verify_tls: true,
            encryption_key: String::new(),
        }
    }
}

impl TenantConfig {
    /// Decodes the provisioned encryption key.
    ///
    /// Absent or malformed values are a configuration error, raised before
    /// any network call depends on the key.
    pub fn encryption_key(&self) -> Result<EnvelopeKey> {
        if self.encryption_key.is_empty() {
            return Err(eyre::eyre!("tenant encryption-key is not set"));
        }
        EnvelopeKey::from_hex(&self.encryption_key).map_err(Into::into)
    }
}

/// Upstream directory service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct UpstreamConfig {
    /// Whether the upstream sync job runs at all
    pub enabled: bool,

    /// Upstream service base URL
    pub base_url: String,

    /// Login identity
    pub identity: String,

    /// Login secret (may instead be provisioned encrypted by the tenant)
    pub secret: String,

    /// "auto", "direct", or "session"
    pub auth_mode: String,

    /// Realm prefix for direct credentials (REALM\identity)
    pub realm: String,

    /// Site context sent with scoped requests
    pub site: String,

    /// Verify the upstream's TLS certificate
    pub verify_tls: bool,

    /// Marker expected in the landing page body identifying the real service
    pub landing_marker: String,

    /// Marker confirming an authenticated session after login
    pub success_marker: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: String::new(),
            identity: String::new(),
            secret: String::new(),
            auth_mode: "auto".to_string(),
            realm: String::new(),
            site: String::new(),
            verify_tls: true,
            landing_marker: "Sign in".to_string(),
            success_marker: "authenticated".to_string(),
        }
    }
}

/// Job scheduling intervals.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct JobsConfig {
    /// Heartbeat interval in seconds
    pub heartbeat_secs: u64,

    /// Command-queue poll interval in seconds
    pub command_poll_secs: u64,

    /// Upstream sync interval in seconds
    pub upstream_sync_secs: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            heartbeat_secs: 300,
            command_poll_secs: 60,
            upstream_sync_secs: 3600,
        }
    }
}

impl JobsConfig {
    pub fn heartbeat_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.heartbeat_secs)
    }

    pub fn command_poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.command_poll_secs)
    }

    pub fn upstream_sync_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.upstream_sync_secs)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
