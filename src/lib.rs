//! Edge Token Authorizer
//!
//! Decides allow/deny for an inbound edge request carrying a signed identity
//! token in a cookie.
//!
//! # Flow
//!
//! - **Cookie**: the token is read from a named cookie ([`cookie`])
//! - **Decode**: header, payload and signature are split and decoded, `alg=none` refused ([`token::decode`])
//! - **Keys**: the issuer key set is served from a `max-age` bounded cache ([`keyset::KeySetCache`])
//! - **Verify**: signature, then `aud`, `iss`, `exp` and optional predicates ([`token::TokenVerifier`])
//! - **Decide**: any failure is a uniform `401` ([`authorizer::Authorizer`])

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod authorizer;
pub mod cli;
pub mod clock;
pub mod config;
pub mod cookie;
pub mod edge;
pub mod error;
pub mod keyset;
pub mod server;
pub mod token;

pub use authorizer::{Authorizer, Decision};
pub use error::{AuthError, Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        _ => subscriber
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    }
    .map_err(|e| Error::Internal(format!("Failed to initialise tracing: {e}")))
}
