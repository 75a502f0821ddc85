//! Issuer key sets and the time-bounded key-set cache.
//!
//! # Key material
//!
//! The remote endpoint publishes either a flat `kid → PEM` object (X.509
//! certificates or SPKI public keys) or a JWKS document. Both parse into a
//! [`KeySet`]. Entries that cannot be turned into a verification key are kept
//! as [`PublicKey::Unusable`] so that a token naming them fails signature
//! verification instead of looking like an unknown key.
//!
//! # Caching
//!
//! [`KeySetCache::get_keys`] serves the cached set without I/O until the
//! expiry derived from the last `Cache-Control: max-age`. A response without
//! `max-age` leaves the previous expiry untouched, so a cache that has never
//! seen one refetches on every call. Concurrent misses queue behind a single
//! refresh gate and re-check freshness before fetching.

mod source;

pub use source::{FetchedKeySet, HttpKeySetSource, KeySetSource, parse_max_age};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use jsonwebtoken::jwk::{AlgorithmParameters, JwkSet};
use jsonwebtoken::{Algorithm, DecodingKey};
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info, warn};
use x509_parser::pem::parse_x509_pem;
use x509_parser::public_key::PublicKey as X509PublicKey;

use crate::clock::Clock;
use crate::error::AuthError;

// ─────────────────────────────────────────────────────────────────────────────
// Key material
// ─────────────────────────────────────────────────────────────────────────────

/// A verification key published under one key identifier.
#[derive(Clone)]
pub enum PublicKey {
    /// RSA public key (RS*/PS* algorithms)
    Rsa(DecodingKey),
    /// Elliptic-curve public key (ES* algorithms)
    Ec(DecodingKey),
    /// Published but not usable; carries the reason
    Unusable(String),
}

impl PublicKey {
    /// Parse a PEM-encoded X.509 certificate or SPKI public key.
    #[must_use]
    pub fn from_pem(pem: &str) -> Self {
        if pem.contains("BEGIN CERTIFICATE") {
            return Self::from_certificate_pem(pem);
        }
        if let Ok(key) = DecodingKey::from_rsa_pem(pem.as_bytes()) {
            return Self::Rsa(key);
        }
        if let Ok(key) = DecodingKey::from_ec_pem(pem.as_bytes()) {
            return Self::Ec(key);
        }
        Self::Unusable("unrecognised PEM public key".to_string())
    }

    fn from_certificate_pem(pem: &str) -> Self {
        let pem = match parse_x509_pem(pem.as_bytes()) {
            Ok((_, pem)) => pem,
            Err(e) => return Self::Unusable(format!("invalid certificate PEM: {e}")),
        };
        let cert = match pem.parse_x509() {
            Ok(cert) => cert,
            Err(e) => return Self::Unusable(format!("invalid certificate: {e}")),
        };

        match cert.public_key().parsed() {
            Ok(X509PublicKey::RSA(rsa)) => Self::Rsa(DecodingKey::from_rsa_raw_components(
                trim_leading_zeros(rsa.modulus),
                trim_leading_zeros(rsa.exponent),
            )),
            Ok(X509PublicKey::EC(point)) => Self::Ec(DecodingKey::from_ec_der(point.data())),
            Ok(_) => Self::Unusable("unsupported certificate key type".to_string()),
            Err(e) => Self::Unusable(format!("unreadable certificate key: {e}")),
        }
    }

    /// Whether `alg` may be verified with this key
    #[must_use]
    pub fn supports(&self, alg: Algorithm) -> bool {
        match self {
            Self::Rsa(_) => matches!(
                alg,
                Algorithm::RS256
                    | Algorithm::RS384
                    | Algorithm::RS512
                    | Algorithm::PS256
                    | Algorithm::PS384
                    | Algorithm::PS512
            ),
            Self::Ec(_) => matches!(alg, Algorithm::ES256 | Algorithm::ES384),
            Self::Unusable(_) => false,
        }
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rsa(_) => f.write_str("PublicKey::Rsa"),
            Self::Ec(_) => f.write_str("PublicKey::Ec"),
            Self::Unusable(reason) => write!(f, "PublicKey::Unusable({reason})"),
        }
    }
}

/// DER integers may carry a sign byte; raw RSA components must not.
fn trim_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

/// Issuer key set indexed by key identifier
#[derive(Debug, Clone, Default)]
pub struct KeySet {
    keys: HashMap<String, PublicKey>,
}

impl KeySet {
    /// Parse a key-set endpoint body (`kid → PEM` object or JWKS document).
    pub fn from_json(body: &[u8]) -> Result<Self, AuthError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| AuthError::KeySetFetch(format!("key set is not JSON: {e}")))?;

        let Value::Object(map) = value else {
            return Err(AuthError::KeySetFetch(
                "key set is not a JSON object".to_string(),
            ));
        };

        if map.get("keys").is_some_and(Value::is_array) {
            let jwks: JwkSet = serde_json::from_value(Value::Object(map))
                .map_err(|e| AuthError::KeySetFetch(format!("invalid JWKS: {e}")))?;
            return Ok(Self::from_jwks(&jwks));
        }

        let mut keys = HashMap::with_capacity(map.len());
        for (kid, pem) in map {
            let Value::String(pem) = pem else {
                return Err(AuthError::KeySetFetch(format!(
                    "key '{kid}' is not a PEM string"
                )));
            };
            let key = PublicKey::from_pem(&pem);
            if let PublicKey::Unusable(ref reason) = key {
                warn!(kid = %kid, reason = %reason, "Unusable key in key set");
            }
            keys.insert(kid, key);
        }
        Ok(Self { keys })
    }

    /// Build from a parsed JWKS; keys without a `kid` are skipped.
    #[must_use]
    pub fn from_jwks(jwks: &JwkSet) -> Self {
        let mut keys = HashMap::with_capacity(jwks.keys.len());
        for jwk in &jwks.keys {
            let Some(kid) = jwk.common.key_id.clone() else {
                continue;
            };
            let key = match (&jwk.algorithm, DecodingKey::from_jwk(jwk)) {
                (AlgorithmParameters::RSA(_), Ok(key)) => PublicKey::Rsa(key),
                (AlgorithmParameters::EllipticCurve(_), Ok(key)) => PublicKey::Ec(key),
                (_, Err(e)) => PublicKey::Unusable(format!("invalid JWK: {e}")),
                _ => PublicKey::Unusable("unsupported JWK key type".to_string()),
            };
            keys.insert(kid, key);
        }
        Self { keys }
    }

    /// Add or replace a key
    pub fn insert(&mut self, kid: impl Into<String>, key: PublicKey) {
        self.keys.insert(kid.into(), key);
    }

    /// Look up a key by identifier
    #[must_use]
    pub fn get(&self, kid: &str) -> Option<&PublicKey> {
        self.keys.get(kid)
    }

    /// Number of keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the set holds no keys
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Cache
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct CacheEntry {
    keys: Option<Arc<KeySet>>,
    expires_at: u64,
}

/// Process-wide key-set cache shared by concurrent authorizations.
pub struct KeySetCache {
    source: Arc<dyn KeySetSource>,
    clock: Arc<dyn Clock>,
    entry: RwLock<CacheEntry>,
    /// Serialises refetches so concurrent misses share one fetch
    refresh: tokio::sync::Mutex<()>,
    retry_backoff: Option<Duration>,
    fetches: AtomicU64,
}

impl KeySetCache {
    /// Create an empty cache over `source`
    pub fn new(source: Arc<dyn KeySetSource>, clock: Arc<dyn Clock>) -> Self {
        Self {
            source,
            clock,
            entry: RwLock::new(CacheEntry::default()),
            refresh: tokio::sync::Mutex::new(()),
            retry_backoff: None,
            fetches: AtomicU64::new(0),
        }
    }

    /// Retry a failed fetch once after `backoff`
    #[must_use]
    pub fn with_retry(mut self, backoff: Duration) -> Self {
        self.retry_backoff = Some(backoff);
        self
    }

    /// Return the current key set, refetching if it is missing or expired.
    pub async fn get_keys(&self) -> Result<Arc<KeySet>, AuthError> {
        if let Some(keys) = self.fresh() {
            return Ok(keys);
        }

        let _gate = self.refresh.lock().await;

        // Another caller may have refreshed while we waited
        if let Some(keys) = self.fresh() {
            return Ok(keys);
        }

        let fetched = self.fetch().await.inspect_err(|e| {
            warn!(error = %e, "Key set refresh failed");
        })?;

        let now = self.clock.now_epoch_seconds();
        let keys = Arc::new(fetched.keys);
        let mut entry = self.entry.write();
        if let Some(max_age) = fetched.max_age {
            entry.expires_at = now.saturating_add(max_age);
        }
        entry.keys = Some(Arc::clone(&keys));

        info!(
            keys = keys.len(),
            max_age = ?fetched.max_age,
            expires_at = entry.expires_at,
            "Key set refreshed"
        );
        Ok(keys)
    }

    /// Number of remote fetch attempts made so far
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    /// Expiry of the cached entry in epoch seconds (0 if never set)
    pub fn expires_at(&self) -> u64 {
        self.entry.read().expires_at
    }

    fn fresh(&self) -> Option<Arc<KeySet>> {
        let entry = self.entry.read();
        let keys = entry.keys.as_ref()?;
        (self.clock.now_epoch_seconds() < entry.expires_at).then(|| Arc::clone(keys))
    }

    async fn fetch(&self) -> Result<FetchedKeySet, AuthError> {
        let Some(backoff) = self.retry_backoff else {
            return self.fetch_once().await;
        };

        (|| self.fetch_once())
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(backoff)
                    .with_max_times(1),
            )
            .when(AuthError::is_retryable)
            .notify(|e, delay| {
                warn!(error = %e, delay = ?delay, "Retrying key set fetch");
            })
            .await
    }

    async fn fetch_once(&self) -> Result<FetchedKeySet, AuthError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        debug!("Fetching key set");
        self.source.fetch().await
    }
}
