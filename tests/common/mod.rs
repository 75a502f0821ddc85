//! Shared fixtures: RSA test keys, token signing, stub key-set source

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use edge_authorizer::clock::{Clock, ManualClock};
use edge_authorizer::config::AuthorizerConfig;
use edge_authorizer::keyset::{FetchedKeySet, KeySet, KeySetCache, KeySetSource, PublicKey};
use edge_authorizer::{AuthError, Authorizer};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{Value, json};

pub const SIGNING_KEY: &str = include_str!("../fixtures/signing-key.pem");
pub const SIGNING_CERT: &str = include_str!("../fixtures/signing-cert.pem");
pub const OTHER_KEY: &str = include_str!("../fixtures/other-key.pem");
pub const OTHER_CERT: &str = include_str!("../fixtures/other-cert.pem");
pub const SIGNING_JWKS: &str = include_str!("../fixtures/signing-jwks.json");

pub const KID: &str = "test-key-1";
pub const OTHER_KID: &str = "test-key-2";
pub const AUDIENCE: &str = "463482814474-test.apps.googleusercontent.com";
pub const ISSUER: &str = "accounts.google.com";
pub const COOKIE: &str = "CLOUDFRONT_GOOGLE_TOKEN";
pub const NOW: u64 = 1_700_000_000;

/// Claims that pass every mandatory check at `NOW`
pub fn valid_claims() -> Value {
    json!({
        "iss": ISSUER,
        "aud": AUDIENCE,
        "sub": "110169484474386276334",
        "email": "me@example.com",
        "hd": "example.com",
        "iat": NOW - 60,
        "exp": NOW + 3600,
    })
}

/// Sign `claims` with the PEM private key under `kid`
pub fn sign_with(claims: &Value, kid: &str, private_pem: &str) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    let key = EncodingKey::from_rsa_pem(private_pem.as_bytes()).unwrap();
    jsonwebtoken::encode(&header, claims, &key).unwrap()
}

/// Sign `claims` with the primary test key
pub fn sign(claims: &Value) -> String {
    sign_with(claims, KID, SIGNING_KEY)
}

/// `Cookie` header carrying `token` among other cookies
pub fn cookie_header(token: &str) -> String {
    format!("_ga=GA1.1.123; {COOKIE}={token}; theme=dark")
}

/// Key set containing both test certificates
pub fn test_key_set() -> KeySet {
    let mut keys = KeySet::default();
    keys.insert(KID, PublicKey::from_pem(SIGNING_CERT));
    keys.insert(OTHER_KID, PublicKey::from_pem(OTHER_CERT));
    keys
}

/// In-memory key-set source that counts fetches
pub struct StubSource {
    keys: KeySet,
    max_age: Option<u64>,
    fail: bool,
    calls: AtomicUsize,
}

impl StubSource {
    pub fn new(keys: KeySet, max_age: Option<u64>) -> Self {
        Self {
            keys,
            max_age,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(KeySet::default(), None)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeySetSource for StubSource {
    async fn fetch(&self) -> Result<FetchedKeySet, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AuthError::KeySetFetch("connection refused".to_string()));
        }
        Ok(FetchedKeySet {
            keys: self.keys.clone(),
            max_age: self.max_age,
        })
    }
}

/// Authorizer wired to a stub source and a manual clock at `NOW`
pub struct Harness {
    pub authorizer: Authorizer,
    pub source: Arc<StubSource>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new(source: StubSource) -> Self {
        Self::with_config(source, &authorizer_config())
    }

    pub fn with_config(source: StubSource, config: &AuthorizerConfig) -> Self {
        let source = Arc::new(source);
        let clock = Arc::new(ManualClock::new(NOW));
        let cache = KeySetCache::new(
            Arc::clone(&source) as Arc<dyn KeySetSource>,
            Arc::clone(&clock) as Arc<dyn Clock>,
        );
        let authorizer = Authorizer::with_cache(
            config,
            Arc::new(cache),
            Arc::clone(&clock) as Arc<dyn Clock>,
        )
        .unwrap();
        Self {
            authorizer,
            source,
            clock,
        }
    }

    /// Standard harness: both test keys, one-hour `max-age`
    pub fn standard() -> Self {
        Self::new(StubSource::new(test_key_set(), Some(3600)))
    }
}

pub fn authorizer_config() -> AuthorizerConfig {
    AuthorizerConfig {
        audience: AUDIENCE.to_string(),
        issuer: ISSUER.to_string(),
        ..AuthorizerConfig::default()
    }
}
