//! Compact signed-token handling
//!
//! [`decode`] splits and parses a token without trusting it;
//! [`TokenVerifier`] checks its signature against a [`KeySet`](crate::keyset::KeySet)
//! and then its claims.

mod decode;
pub mod predicates;
mod verify;

pub use decode::{DecodedToken, TokenHeader, decode};
pub use predicates::{ClaimCheck, ClaimPredicate, EmailAllowList, HostedDomain};
pub use verify::TokenVerifier;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Token payload: an arbitrary JSON object with typed accessors for the
/// registered claims the authorizer checks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Claims(Map<String, Value>);

impl Claims {
    /// Raw claim value
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Claim value if it is a string
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    /// `aud` when it is a single string
    #[must_use]
    pub fn audience(&self) -> Option<&str> {
        self.get_str("aud")
    }

    /// `iss`
    #[must_use]
    pub fn issuer(&self) -> Option<&str> {
        self.get_str("iss")
    }

    /// `sub`
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.get_str("sub")
    }

    /// `exp` in epoch seconds; fractional values are kept
    #[must_use]
    pub fn expires_at(&self) -> Option<f64> {
        self.0.get("exp").and_then(Value::as_f64)
    }
}

impl From<Map<String, Value>> for Claims {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(value: Value) -> Claims {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn registered_claim_accessors() {
        let c = claims(json!({"aud": "client", "iss": "issuer", "sub": "42", "exp": 1700000000}));
        assert_eq!(c.audience(), Some("client"));
        assert_eq!(c.issuer(), Some("issuer"));
        assert_eq!(c.subject(), Some("42"));
        assert_eq!(c.expires_at(), Some(1_700_000_000.0));
    }

    #[test]
    fn non_string_claims_read_as_absent() {
        let c = claims(json!({"aud": ["a", "b"], "iss": 7, "exp": "soon"}));
        assert_eq!(c.audience(), None);
        assert_eq!(c.issuer(), None);
        assert_eq!(c.expires_at(), None);
        assert!(c.get("aud").is_some());
    }

    #[test]
    fn payload_must_be_an_object() {
        assert!(serde_json::from_value::<Claims>(json!([1, 2])).is_err());
    }
}
