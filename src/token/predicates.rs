//! Optional claim checks applied after the mandatory ones

use std::collections::HashSet;

use super::Claims;

/// A policy check over a verified payload
pub trait ClaimPredicate: Send + Sync {
    /// Claim reported when the check fails
    fn claim(&self) -> &str;

    /// Whether the payload passes
    fn check(&self, claims: &Claims) -> bool;
}

/// Requires the `hd` (hosted domain) claim to equal a configured domain
#[derive(Debug, Clone)]
pub struct HostedDomain {
    domain: String,
}

impl HostedDomain {
    /// Accept only tokens for `domain`
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
        }
    }
}

impl ClaimPredicate for HostedDomain {
    fn claim(&self) -> &str {
        "hd"
    }

    fn check(&self, claims: &Claims) -> bool {
        claims.get_str("hd") == Some(self.domain.as_str())
    }
}

/// Requires the `email` claim to be one of an allow-list
#[derive(Debug, Clone)]
pub struct EmailAllowList {
    emails: HashSet<String>,
}

impl EmailAllowList {
    /// Accept only the listed addresses (exact match)
    pub fn new<I, S>(emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            emails: emails.into_iter().map(Into::into).collect(),
        }
    }
}

impl ClaimPredicate for EmailAllowList {
    fn claim(&self) -> &str {
        "email"
    }

    fn check(&self, claims: &Claims) -> bool {
        claims
            .get_str("email")
            .is_some_and(|email| self.emails.contains(email))
    }
}

/// Ad-hoc predicate from a closure
pub struct ClaimCheck<F> {
    claim: String,
    check: F,
}

impl<F> ClaimCheck<F>
where
    F: Fn(&Claims) -> bool + Send + Sync,
{
    /// Report `claim` when `check` returns false
    pub fn new(claim: impl Into<String>, check: F) -> Self {
        Self {
            claim: claim.into(),
            check,
        }
    }
}

impl<F> ClaimPredicate for ClaimCheck<F>
where
    F: Fn(&Claims) -> bool + Send + Sync,
{
    fn claim(&self) -> &str {
        &self.claim
    }

    fn check(&self, claims: &Claims) -> bool {
        (self.check)(claims)
    }
}
