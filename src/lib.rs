//! Outpost Agent - persistent maintenance agent for a remote control-plane
//!
//! The agent runs a set of named periodic jobs, each on its own timer with
//! non-overlapping invocations and per-job fault isolation. Job bodies
//! talk to the tenant control-plane through an authenticated, rate-limited
//! HTTP client with optional payload encryption, and to an upstream
//! directory service through a dual-mode (direct/session) login client.
//!
//! # Modules
//!
//! - [`scheduler`] - Named periodic jobs with skip-on-busy dispatch
//! - [`tenant`] - Control-plane transport client and encrypted envelope
//! - [`upstream`] - Dual-mode authenticated upstream client
//! - [`ratelimit`] - Token bucket shared by outbound requests
//! - [`secure`] - Wiped-on-destroy secret holder
//! - [`config`] - Configuration types and loading
//! - [`jobs`] - The scheduled job bodies

pub mod config;
pub mod jobs;
pub mod ratelimit;
pub mod scheduler;
pub mod secure;
pub mod tenant;
pub mod upstream;

// Re-export commonly used types
pub use config::Config;
pub use ratelimit::RateLimiter;
pub use scheduler::{Job, Scheduler, SchedulerHandle};
pub use secure::SecureSecret;
pub use tenant::{EnvelopeError, EnvelopeKey, TenantClient, TransportError, AGENT_VERSION};
pub use upstream::{AuthError, AuthMode, AuthScheme, UpstreamClient};
