//! Remote key-set endpoint access

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::CACHE_CONTROL;
use tracing::debug;
use url::Url;

use super::KeySet;
use crate::error::AuthError;

/// One successful key-set fetch
#[derive(Debug, Clone)]
pub struct FetchedKeySet {
    /// Parsed key set
    pub keys: KeySet,
    /// `max-age` from the response's `Cache-Control`, in seconds
    pub max_age: Option<u64>,
}

/// Where key sets come from
#[async_trait]
pub trait KeySetSource: Send + Sync {
    /// Fetch and parse the current key set
    async fn fetch(&self) -> Result<FetchedKeySet, AuthError>;
}

/// Fetches the key set over HTTPS with a bounded timeout
pub struct HttpKeySetSource {
    http: reqwest::Client,
    url: Url,
}

impl HttpKeySetSource {
    /// Create a source for `url`.
    ///
    /// Every request is bounded by `timeout`; plain `http://` endpoints are
    /// refused unless `allow_insecure_http` is set.
    pub fn new(url: Url, timeout: Duration, allow_insecure_http: bool) -> crate::Result<Self> {
        let http = reqwest::Client::builder()
            .https_only(!allow_insecure_http)
            .timeout(timeout)
            .build()?;
        Ok(Self { http, url })
    }

    /// Endpoint URL
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl KeySetSource for HttpKeySetSource {
    async fn fetch(&self) -> Result<FetchedKeySet, AuthError> {
        let response = self
            .http
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| AuthError::KeySetFetch(describe(&e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::KeySetFetch(format!(
                "endpoint returned status {status}"
            )));
        }

        let max_age = response
            .headers()
            .get(CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_max_age);

        let body = response
            .bytes()
            .await
            .map_err(|e| AuthError::KeySetFetch(describe(&e)))?;
        let keys = KeySet::from_json(&body)?;

        debug!(url = %self.url, keys = keys.len(), max_age = ?max_age, "Fetched key set");
        Ok(FetchedKeySet { keys, max_age })
    }
}

fn describe(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("request timed out: {e}")
    } else {
        e.to_string()
    }
}

/// Extract `max-age=<seconds>` from a `Cache-Control` value (case-insensitive).
#[must_use]
pub fn parse_max_age(cache_control: &str) -> Option<u64> {
    static MAX_AGE_RE: OnceLock<Regex> = OnceLock::new();
    let re = MAX_AGE_RE.get_or_init(|| Regex::new(r"(?i)max-age=(\d+)").unwrap());

    re.captures(cache_control)?.get(1)?.as_str().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_age_is_found_among_directives() {
        assert_eq!(
            parse_max_age("public, max-age=19837, must-revalidate, no-transform"),
            Some(19837)
        );
    }

    #[test]
    fn max_age_is_case_insensitive() {
        assert_eq!(parse_max_age("MAX-AGE=60"), Some(60));
    }

    #[test]
    fn missing_or_malformed_max_age_is_none() {
        assert_eq!(parse_max_age("no-cache"), None);
        assert_eq!(parse_max_age("max-age="), None);
        assert_eq!(parse_max_age("max-age=abc"), None);
        assert_eq!(parse_max_age(""), None);
    }

    #[test]
    fn absurd_max_age_is_ignored() {
        assert_eq!(parse_max_age("max-age=99999999999999999999999"), None);
    }

    #[tokio::test]
    async fn plain_http_is_refused_by_default() {
        let url = Url::parse("http://127.0.0.1:9/certs").unwrap();
        let source = HttpKeySetSource::new(url, Duration::from_secs(1), false).unwrap();
        assert_eq!(source.url().scheme(), "http");

        let err = source.fetch().await.unwrap_err();
        assert_eq!(err.kind(), "key_set_fetch");
    }
}
