//! Upstream sync job: authenticates against the upstream directory
//! service and reports the account roster back to the tenant.
//!
//! Credentials come from local config when present, otherwise from the
//! tenant as an encrypted provisioning document. The roster report goes
//! back under the same encryption key.

use std::sync::Arc;

use eyre::{Context, Result};
use serde::Deserialize;
use tracing::{debug, error, info};

use crate::config::{Config, UpstreamConfig};
use crate::secure::SecureSecret;
use crate::tenant::TenantClient;
use crate::upstream::UpstreamClient;

/// Encrypted provisioning document served by the tenant when no local
/// upstream credentials are configured.
#[derive(Debug, Deserialize)]
struct UpstreamProvision {
    identity: String,
    secret: String,
    #[serde(default)]
    auth_mode: String,
    #[serde(default)]
    site: String,
}

/// Job body.
pub async fn run(client: Arc<TenantClient>, cfg: Arc<Config>) {
    if let Err(e) = execute(&client, &cfg).await {
        error!(error = %e, "upstream-sync: failed");
    }
}

pub(crate) async fn execute(tenant: &TenantClient, cfg: &Config) -> Result<()> {
    if !cfg.upstream.enabled {
        debug!("upstream-sync: disabled in config, skipping");
        return Ok(());
    }

    let ucfg = resolve_config(tenant, cfg).await?;

    let mut upstream = UpstreamClient::new(&ucfg)?;
    let secret = SecureSecret::new(ucfg.secret.clone());
    upstream
        .login(&ucfg.identity, &secret)
        .await
        .wrap_err("upstream login failed")?;
    if let Some(scheme) = upstream.resolved_scheme() {
        info!(mode = %scheme, "upstream-sync: authenticated");
    }

    let site = (!ucfg.site.is_empty()).then_some(ucfg.site.as_str());
    let roster: Vec<serde_json::Value> = upstream
        .get_json("/accounts", site)
        .await
        .wrap_err("fetch account roster")?;
    info!(accounts = roster.len(), "upstream-sync: roster fetched");

    let key = cfg.tenant.encryption_key()?;
    let resp = tenant
        .post_encrypted_json(&tenant.url("/api/agent/upstream-roster"), &roster, &key)
        .await?;
    if !resp.status().is_success() {
        return Err(eyre::eyre!(
            "tenant rejected roster report with status {}",
            resp.status()
        ));
    }

    Ok(())
}

/// Prefers locally configured credentials; falls back to the encrypted
/// provisioning document from the tenant.
async fn resolve_config(tenant: &TenantClient, cfg: &Config) -> Result<UpstreamConfig> {
    if !cfg.upstream.identity.is_empty() && !cfg.upstream.secret.is_empty() {
        return Ok(cfg.upstream.clone());
    }

    let key = cfg
        .tenant
        .encryption_key()
        .wrap_err("upstream credentials not configured locally and no encryption key set")?;

    let provision: UpstreamProvision = tenant
        .get_encrypted_json(&tenant.url("/api/agent/upstream-config"), &key)
        .await
        .wrap_err("fetch upstream provisioning document")?;

    if provision.identity.is_empty() || provision.secret.is_empty() {
        return Err(eyre::eyre!("upstream provisioning document is incomplete"));
    }

    let mut ucfg = cfg.upstream.clone();
    ucfg.identity = provision.identity;
    ucfg.secret = provision.secret;
    if !provision.auth_mode.is_empty() {
        ucfg.auth_mode = provision.auth_mode;
    }
    if !provision.site.is_empty() {
        ucfg.site = provision.site;
    }
    Ok(ucfg)
}
