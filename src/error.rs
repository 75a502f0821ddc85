//! Error types for the edge authorizer

use std::io;

use thiserror::Error;

/// Result type alias for crate-level operations
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-level errors (configuration, I/O, serving)
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client construction error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Reasons a single authorization check fails.
///
/// Every variant collapses to the same `401` at the authorization boundary;
/// the detail is only ever logged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No cookie header, or no cookie with the configured name
    #[error("cookie '{0}' not present")]
    CookieMissing(String),

    /// Token is not three segments of base64-encoded JSON
    #[error("malformed token: {0}")]
    TokenFormat(String),

    /// Header declares an algorithm that is refused outright
    #[error("token algorithm '{0}' rejected")]
    AlgorithmRejected(String),

    /// Header `kid` does not name a key in the current key set
    #[error("no verification key for kid '{0}'")]
    KeyNotFound(String),

    /// Signature does not verify under the named key
    #[error("signature invalid: {0}")]
    SignatureInvalid(String),

    /// A claim failed policy; carries the claim name
    #[error("claim '{0}' invalid")]
    ClaimInvalid(String),

    /// Key set could not be fetched or parsed
    #[error("key set fetch failed: {0}")]
    KeySetFetch(String),
}

impl AuthError {
    /// Stable label for structured logs
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CookieMissing(_) => "cookie_missing",
            Self::TokenFormat(_) => "token_format",
            Self::AlgorithmRejected(_) => "algorithm_rejected",
            Self::KeyNotFound(_) => "key_not_found",
            Self::SignatureInvalid(_) => "signature_invalid",
            Self::ClaimInvalid(_) => "claim_invalid",
            Self::KeySetFetch(_) => "key_set_fetch",
        }
    }

    /// Whether a retry of the same operation could succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::KeySetFetch(_))
    }
}
