//! Per-request authorization decision
//!
//! Cookie → token → key set → signature and claims. Any failure along the way
//! becomes the same [`Decision::Deny`]; the specific [`AuthError`] is logged
//! and kept on the decision for the caller's own diagnostics, never sent to
//! the client.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::{AuthorizerConfig, Config};
use crate::cookie::parse_cookie_header;
use crate::edge::{EdgeEvent, EdgeRequest, EdgeResponse};
use crate::error::AuthError;
use crate::keyset::{HttpKeySetSource, KeySetCache};
use crate::token::{self, Claims, ClaimPredicate, EmailAllowList, HostedDomain, TokenVerifier};
use crate::Result;

/// Outcome of one authorization
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Forward the request to the origin
    Allow,
    /// Answer with `response` instead
    Deny {
        /// Why; internal only
        reason: AuthError,
        /// What the client receives
        response: EdgeResponse,
    },
}

impl Decision {
    /// Whether the request may proceed
    #[must_use]
    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// Response to send, if denied
    #[must_use]
    pub fn response(&self) -> Option<&EdgeResponse> {
        match self {
            Self::Allow => None,
            Self::Deny { response, .. } => Some(response),
        }
    }

    /// Deny reason, if denied
    #[must_use]
    pub fn reason(&self) -> Option<&AuthError> {
        match self {
            Self::Allow => None,
            Self::Deny { reason, .. } => Some(reason),
        }
    }

    /// Convert into the edge handler result (`None` = proceed)
    #[must_use]
    pub fn into_response(self) -> Option<EdgeResponse> {
        match self {
            Self::Allow => None,
            Self::Deny { response, .. } => Some(response),
        }
    }
}

/// Stateless authorizer over a shared key-set cache
pub struct Authorizer {
    cookie_name: String,
    cache: Arc<KeySetCache>,
    verifier: TokenVerifier,
}

impl Authorizer {
    /// Assemble from parts
    pub fn new(cookie_name: impl Into<String>, cache: Arc<KeySetCache>, verifier: TokenVerifier) -> Self {
        Self {
            cookie_name: cookie_name.into(),
            cache,
            verifier,
        }
    }

    /// Build the production authorizer: HTTP key-set source and system clock
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let source = HttpKeySetSource::new(
            config.key_set.parsed_url()?,
            config.key_set.timeout(),
            config.key_set.allow_insecure_http,
        )?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let mut cache = KeySetCache::new(Arc::new(source), Arc::clone(&clock));
        if let Some(backoff) = config.key_set.retry_backoff() {
            cache = cache.with_retry(backoff);
        }

        Self::with_cache(&config.authorizer, Arc::new(cache), clock)
    }

    /// Build from policy config over an existing cache
    pub fn with_cache(
        config: &AuthorizerConfig,
        cache: Arc<KeySetCache>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let mut verifier = TokenVerifier::new(&config.audience, &config.issuer, clock)
            .with_algorithms(config.parsed_algorithms()?);
        for predicate in predicates_from_config(config) {
            verifier = verifier.with_boxed_predicate(predicate);
        }
        Ok(Self::new(&config.cookie_name, cache, verifier))
    }

    /// Cookie the token is read from
    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Shared key-set cache
    #[must_use]
    pub fn cache(&self) -> &Arc<KeySetCache> {
        &self.cache
    }

    /// Verify the token carried in a raw `Cookie` header value
    pub async fn check(&self, cookie_header: Option<&str>) -> std::result::Result<Claims, AuthError> {
        let cookies = parse_cookie_header(cookie_header.unwrap_or_default());
        let raw = cookies
            .get(&self.cookie_name)
            .ok_or_else(|| AuthError::CookieMissing(self.cookie_name.clone()))?;

        let decoded = token::decode(raw)?;
        let keys = self.cache.get_keys().await?;
        self.verifier.verify(&decoded, &keys)?;
        Ok(decoded.claims)
    }

    /// Decide whether `request` may proceed
    pub async fn authorize(&self, request: &EdgeRequest) -> Decision {
        match self.check(request.header("cookie")).await {
            Ok(claims) => {
                debug!(
                    uri = %request.uri,
                    subject = claims.subject().unwrap_or_default(),
                    "Request authorized"
                );
                Decision::Allow
            }
            Err(reason) => {
                warn!(
                    uri = %request.uri,
                    kind = reason.kind(),
                    error = %reason,
                    "Request unauthorized"
                );
                Decision::Deny {
                    reason,
                    response: EdgeResponse::unauthorized(),
                }
            }
        }
    }

    /// Edge handler entry point: `None` lets the request through
    pub async fn handle_event(&self, event: &EdgeEvent) -> Option<EdgeResponse> {
        let Some(request) = event.request() else {
            warn!("Event carries no request record");
            return Some(EdgeResponse::unauthorized());
        };
        self.authorize(request).await.into_response()
    }
}

/// Optional claim checks enabled by configuration
#[must_use]
pub fn predicates_from_config(config: &AuthorizerConfig) -> Vec<Box<dyn ClaimPredicate>> {
    let mut predicates: Vec<Box<dyn ClaimPredicate>> = Vec::new();
    if let Some(domain) = &config.hosted_domain {
        predicates.push(Box::new(HostedDomain::new(domain.clone())));
    }
    if let Some(emails) = &config.email_allow_list {
        predicates.push(Box::new(EmailAllowList::new(emails.iter().cloned())));
    }
    predicates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicates_are_off_by_default() {
        assert!(predicates_from_config(&AuthorizerConfig::default()).is_empty());
    }

    #[test]
    fn predicates_follow_config_toggles() {
        let config = AuthorizerConfig {
            hosted_domain: Some("example.com".to_string()),
            email_allow_list: Some(vec!["me@example.com".to_string()]),
            ..AuthorizerConfig::default()
        };
        let claims: Vec<_> = predicates_from_config(&config)
            .iter()
            .map(|p| p.claim().to_string())
            .collect();
        assert_eq!(claims, vec!["hd", "email"]);
    }

    #[test]
    fn decision_accessors() {
        assert!(Decision::Allow.is_allow());
        assert_eq!(Decision::Allow.into_response(), None);

        let deny = Decision::Deny {
            reason: AuthError::CookieMissing("c".to_string()),
            response: EdgeResponse::unauthorized(),
        };
        assert!(!deny.is_allow());
        assert_eq!(deny.reason().map(AuthError::kind), Some("cookie_missing"));
        assert_eq!(deny.response(), Some(&EdgeResponse::unauthorized()));
    }

    #[test]
    fn from_config_requires_audience() {
        assert!(Authorizer::from_config(&Config::default()).is_err());
    }
}
