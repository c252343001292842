//! Command-queue job: polls the tenant for pending instructions.

use std::sync::Arc;

use eyre::Result;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::secure::SecureSecret;
use crate::tenant::TenantClient;

use super::{heartbeat, upstream_sync};

// No Debug derive: the payload can carry a replacement credential.
#[derive(Deserialize)]
struct CommandItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload_data: CommandPayload,
}

#[derive(Default, Deserialize)]
struct CommandPayload {
    #[serde(default)]
    process: bool,
    #[serde(default)]
    api_key: String,
}

/// Job body. A failed poll skips the tick; commands are re-offered by the
/// tenant until acknowledged by a successful action.
pub async fn run(client: Arc<TenantClient>, cfg: Arc<Config>) {
    if let Err(e) = execute(&client, &cfg).await {
        error!(error = %e, "commandqueue: failed");
    }
}

pub(crate) async fn execute(client: &TenantClient, cfg: &Config) -> Result<()> {
    client.test_connectivity().await?;

    let url = client.url("/api/agent/commands");
    let items: Vec<CommandItem> = client.get_json(&url).await?;
    debug!(count = items.len(), "commandqueue: items received");

    for item in items {
        match item.kind.as_str() {
            "force-heartbeat" => {
                if item.payload_data.process {
                    info!("commandqueue: triggering heartbeat");
                    heartbeat::execute(client).await?;
                }
            }
            "force-upstream-sync" => {
                info!("commandqueue: triggering upstream sync");
                upstream_sync::execute(client, cfg).await?;
            }
            "rotate-credential" => {
                if item.payload_data.api_key.is_empty() {
                    warn!("commandqueue: rotate-credential without a key, ignoring");
                } else {
                    info!("commandqueue: rotating tenant credential");
                    client.rotate_credential(SecureSecret::new(item.payload_data.api_key));
                }
            }
            other => {
                warn!(kind = %other, "commandqueue: unknown command type");
            }
        }
    }

    Ok(())
}
