//! Integration tests for the agent.
//!
//! These run the real scheduler against a mock tenant and verify
//! end-to-end behavior: periodic dispatch, shared transport, fault
//! isolation between jobs, and graceful stop.

use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use outpost_agent::config::{Config, TenantConfig};
use outpost_agent::jobs;
use outpost_agent::scheduler::{Job, Scheduler};
use outpost_agent::tenant::TenantClient;

fn config_for(server: &MockServer) -> Config {
    let mut config = Config {
        tenant: TenantConfig {
            url: server.uri(),
            api_key: "integration-key".to_string(),
            agent_id: "agent-int".to_string(),
            verify_tls: true,
            encryption_key: "11".repeat(32),
        },
        ..Default::default()
    };
    config.jobs.heartbeat_secs = 1;
    config.jobs.command_poll_secs = 1;
    config
}

async fn mount_tenant(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/agent/test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "ok"})))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/agent/heartbeat"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"status": "ok", "message": "ack"})),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/agent/commands"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_registered_jobs_poll_the_tenant_periodically() {
    let server = MockServer::start().await;
    mount_tenant(&server).await;

    let config = Arc::new(config_for(&server));
    let tenant = Arc::new(TenantClient::new(&config.tenant).unwrap());

    let mut scheduler = Scheduler::new();
    jobs::register(&mut scheduler, tenant, Arc::clone(&config));

    let handle = scheduler.start();
    tokio::time::sleep(Duration::from_millis(2500)).await;
    handle.stop().await;

    let requests = server.received_requests().await.unwrap();
    let heartbeats = requests
        .iter()
        .filter(|r| r.url.path() == "/api/agent/heartbeat")
        .count();
    let polls = requests
        .iter()
        .filter(|r| r.url.path() == "/api/agent/commands")
        .count();

    // Immediate fire plus at least two interval ticks.
    assert!(heartbeats >= 2, "expected repeated heartbeats, got {heartbeats}");
    assert!(polls >= 2, "expected repeated command polls, got {polls}");

    // Every request carried the agent identity headers.
    assert!(requests
        .iter()
        .all(|r| r.headers.get("x-outpost-agent").is_some()));
}

#[tokio::test]
async fn test_failing_tenant_does_not_stop_the_schedule() {
    let server = MockServer::start().await;

    // Everything fails server-side; jobs log and skip each tick.
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let config = Arc::new(config_for(&server));
    let tenant = Arc::new(TenantClient::new(&config.tenant).unwrap());

    let mut scheduler = Scheduler::new();
    jobs::register(&mut scheduler, tenant, Arc::clone(&config));

    let handle = scheduler.start();
    tokio::time::sleep(Duration::from_millis(2500)).await;
    handle.stop().await;

    // The schedule kept retrying on every tick despite consistent failure.
    let heartbeats = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/api/agent/heartbeat")
        .count();
    assert!(heartbeats >= 2, "expected retries on schedule, got {heartbeats}");
}

#[tokio::test]
async fn test_shared_client_serves_concurrent_jobs() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("authorization", "Bearer integration-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "ok"})))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let tenant = Arc::new(TenantClient::new(&config.tenant).unwrap());

    // Many jobs hammering one client concurrently: all succeed, all
    // authenticated, no panics from shared limiter state.
    let mut scheduler = Scheduler::new();
    for i in 0..8 {
        let client = Arc::clone(&tenant);
        scheduler.add(Job::new(
            format!("probe-{i}"),
            Duration::from_millis(200),
            move || {
                let client = Arc::clone(&client);
                async move {
                    let _ = client.test_connectivity().await;
                }
            },
        ));
    }

    let handle = scheduler.start();
    tokio::time::sleep(Duration::from_millis(700)).await;
    handle.stop().await;

    let total = server.received_requests().await.unwrap().len();
    assert!(total >= 8, "expected every job to reach the tenant, got {total}");
}
