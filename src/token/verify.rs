//! Signature and claim verification
//!
//! Checks run in a fixed order and stop at the first failure:
//! key lookup, signature, `aud`, `iss`, `exp`, then each configured
//! [`ClaimPredicate`] in registration order.

use std::str::FromStr;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::Algorithm;

use super::{ClaimPredicate, Claims, DecodedToken};
use crate::clock::Clock;
use crate::error::AuthError;
use crate::keyset::{KeySet, PublicKey};

/// Verifies decoded tokens against a key set and claim policy
pub struct TokenVerifier {
    audience: String,
    issuer: String,
    algorithms: Vec<Algorithm>,
    predicates: Vec<Box<dyn ClaimPredicate>>,
    clock: Arc<dyn Clock>,
}

impl TokenVerifier {
    /// Verifier for RS256 tokens issued by `issuer` for `audience`
    pub fn new(audience: impl Into<String>, issuer: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            audience: audience.into(),
            issuer: issuer.into(),
            algorithms: vec![Algorithm::RS256],
            predicates: Vec::new(),
            clock,
        }
    }

    /// Replace the permitted signing algorithms
    #[must_use]
    pub fn with_algorithms(mut self, algorithms: Vec<Algorithm>) -> Self {
        self.algorithms = algorithms;
        self
    }

    /// Append an optional claim check
    #[must_use]
    pub fn with_predicate(mut self, predicate: impl ClaimPredicate + 'static) -> Self {
        self.predicates.push(Box::new(predicate));
        self
    }

    /// Append an already boxed claim check
    #[must_use]
    pub fn with_boxed_predicate(mut self, predicate: Box<dyn ClaimPredicate>) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Number of optional claim checks
    #[must_use]
    pub fn predicate_count(&self) -> usize {
        self.predicates.len()
    }

    /// Verify signature, then claims
    pub fn verify(&self, token: &DecodedToken, keys: &KeySet) -> Result<(), AuthError> {
        self.verify_signature(token, keys)?;
        self.verify_claims(&token.claims)
    }

    /// Check the signature over the original signed input
    pub fn verify_signature(&self, token: &DecodedToken, keys: &KeySet) -> Result<(), AuthError> {
        let kid = token.kid().unwrap_or_default();
        let key = keys
            .get(kid)
            .ok_or_else(|| AuthError::KeyNotFound(kid.to_string()))?;

        let alg = Algorithm::from_str(&token.header.alg).map_err(|_| {
            AuthError::SignatureInvalid(format!("unknown algorithm '{}'", token.header.alg))
        })?;
        if !self.algorithms.contains(&alg) {
            return Err(AuthError::SignatureInvalid(format!(
                "algorithm {alg:?} not permitted"
            )));
        }

        let decoding_key = match key {
            PublicKey::Rsa(k) | PublicKey::Ec(k) => k,
            PublicKey::Unusable(reason) => {
                return Err(AuthError::SignatureInvalid(format!(
                    "key '{kid}' unusable: {reason}"
                )));
            }
        };
        if !key.supports(alg) {
            return Err(AuthError::SignatureInvalid(format!(
                "key '{kid}' cannot verify {alg:?}"
            )));
        }

        let signature = URL_SAFE_NO_PAD.encode(&token.signature);
        match jsonwebtoken::crypto::verify(
            &signature,
            token.signed_input.as_bytes(),
            decoding_key,
            alg,
        ) {
            Ok(true) => Ok(()),
            Ok(false) => Err(AuthError::SignatureInvalid("signature mismatch".to_string())),
            Err(e) => Err(AuthError::SignatureInvalid(e.to_string())),
        }
    }

    /// Check `aud`, `iss`, `exp` and the optional predicates
    pub fn verify_claims(&self, claims: &Claims) -> Result<(), AuthError> {
        if claims.audience() != Some(self.audience.as_str()) {
            return Err(AuthError::ClaimInvalid("aud".to_string()));
        }

        if claims.issuer() != Some(self.issuer.as_str()) {
            return Err(AuthError::ClaimInvalid("iss".to_string()));
        }

        #[allow(clippy::cast_precision_loss)]
        let now = self.clock.now_epoch_seconds() as f64;
        // Whole seconds only: the clock has no fraction, exp == now is expired
        if !claims.expires_at().is_some_and(|exp| exp.trunc() > now) {
            return Err(AuthError::ClaimInvalid("exp".to_string()));
        }

        for predicate in &self.predicates {
            if !predicate.check(claims) {
                return Err(AuthError::ClaimInvalid(predicate.claim().to_string()));
            }
        }

        Ok(())
    }
}
