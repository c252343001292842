//! Dual-mode authenticated client for the upstream directory service.

mod client;
mod error;

pub use client::{AuthMode, AuthScheme, UpstreamClient};
pub use error::AuthError;
