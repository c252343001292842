//! Tenant control-plane transport: authenticated HTTP client, encrypted
//! payload envelope, and the transport error taxonomy.

mod client;
pub mod envelope;
mod error;

pub use client::{TenantClient, AGENT_VERSION};
pub use envelope::{EnvelopeError, EnvelopeKey};
pub use error::TransportError;
