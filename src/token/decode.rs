//! Untrusted decoding of a compact `header.payload.signature` token

use base64::Engine;
use base64::alphabet;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::Claims;
use crate::error::AuthError;

const LENIENT: GeneralPurposeConfig = GeneralPurposeConfig::new()
    .with_decode_padding_mode(DecodePaddingMode::Indifferent)
    .with_decode_allow_trailing_bits(true);

/// base64url, padding optional
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);
/// Standard alphabet, padding optional
const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT);

/// Token header; fields other than these are ignored
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenHeader {
    /// Signing algorithm as written in the token
    pub alg: String,
    /// Key identifier
    #[serde(default)]
    pub kid: Option<String>,
    /// Token type
    #[serde(default)]
    pub typ: Option<String>,
}

/// A structurally valid, not yet verified token
#[derive(Debug, Clone)]
pub struct DecodedToken {
    /// Decoded header
    pub header: TokenHeader,
    /// Decoded payload
    pub claims: Claims,
    /// The first two segments exactly as received, joined by `.`
    pub signed_input: String,
    /// Decoded signature bytes
    pub signature: Vec<u8>,
}

impl DecodedToken {
    /// Header key identifier, if any
    #[must_use]
    pub fn kid(&self) -> Option<&str> {
        self.header.kid.as_deref()
    }
}

/// Split and decode `token`.
///
/// An `alg` of `none` is refused as soon as the header is read, before the
/// payload or signature are looked at.
pub fn decode(token: &str) -> Result<DecodedToken, AuthError> {
    let parts: Vec<&str> = token.split('.').collect();
    let [header_b64, payload_b64, signature_b64] = parts.as_slice() else {
        return Err(AuthError::TokenFormat(format!(
            "expected 3 segments, found {}",
            parts.len()
        )));
    };

    let header: TokenHeader = decode_json(header_b64, "header")?;
    if header.alg.eq_ignore_ascii_case("none") {
        return Err(AuthError::AlgorithmRejected(header.alg));
    }

    let claims: Claims = decode_json(payload_b64, "payload")?;
    // Exactly one encoding per signature, so the token text cannot be altered
    let signature = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|e| AuthError::TokenFormat(format!("signature: {e}")))?;

    Ok(DecodedToken {
        header,
        claims,
        signed_input: format!("{header_b64}.{payload_b64}"),
        signature,
    })
}

fn decode_json<T: DeserializeOwned>(segment: &str, what: &str) -> Result<T, AuthError> {
    let bytes =
        decode_segment(segment).map_err(|e| AuthError::TokenFormat(format!("{what}: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| AuthError::TokenFormat(format!("{what}: {e}")))
}

/// Accept base64url or standard base64, with or without padding.
///
/// Header and payload only; both are covered by the signature as written.
fn decode_segment(segment: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_LENIENT
        .decode(segment)
        .or_else(|_| STANDARD_LENIENT.decode(segment))
}
