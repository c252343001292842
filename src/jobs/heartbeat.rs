//! Heartbeat job: confirms bidirectional connectivity with the tenant.

use std::sync::Arc;

use eyre::Result;
use serde::Deserialize;
use tracing::{error, info};

use crate::tenant::TenantClient;

#[derive(Debug, Deserialize)]
struct HeartbeatResponse {
    status: String,
    #[serde(default)]
    message: String,
}

/// Job body. Failures are logged and the tick is skipped; the next
/// scheduled run retries.
pub async fn run(client: Arc<TenantClient>) {
    if let Err(e) = execute(&client).await {
        error!(error = %e, "heartbeat: failed");
    }
}

pub(crate) async fn execute(client: &TenantClient) -> Result<()> {
    let url = client.url("/api/agent/heartbeat");
    let resp: HeartbeatResponse = client.get_json(&url).await?;

    if resp.status == "ok" {
        info!(message = %resp.message, "heartbeat: ok");
        Ok(())
    } else {
        Err(eyre::eyre!(
            "tenant returned failure: {} ({})",
            resp.status,
            resp.message
        ))
    }
}
