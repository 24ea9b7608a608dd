//! OIDC discovery for issuers that do not embed their key set URL
//!
//! IAS tokens name only their issuer; the key set URI is resolved through
//! the issuer's discovery document and cached here with the same bounds and
//! floors as the signing-key cache.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use serde::Deserialize;
use tessera_client::{http::HttpExchange, ServiceError};
use tessera_clock::{Clock, System};
use url::Url;

use crate::cache::{
    checked_configuration, evict_to_capacity, live_value, CacheConfiguration, CacheEntry,
};

/// The well-known path of the OIDC discovery document
pub const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";

/// The endpoints resolved from a discovery document
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct OidcEndpoints {
    /// The token endpoint, when advertised
    #[serde(default)]
    pub token_endpoint: Option<Url>,
    /// The authorization endpoint, when advertised
    #[serde(default)]
    pub authorization_endpoint: Option<Url>,
    /// The key set endpoint
    #[serde(default)]
    pub jwks_uri: Option<Url>,
}

/// Appends the well-known discovery path to an issuer URL
///
/// # Errors
///
/// Returns an error if the issuer is not a parseable URL.
pub fn discovery_uri(issuer: &str) -> Result<Url, url::ParseError> {
    let base = Url::parse(issuer)?;
    let mut url = base.clone();
    url.set_path(&format!("{}{}", base.path().trim_end_matches('/'), DISCOVERY_PATH));
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

/// Caches resolved discovery documents by their URI
pub struct DiscoveryCache {
    exchange: Arc<dyn HttpExchange>,
    entries: DashMap<Url, CacheEntry<OidcEndpoints>>,
    configuration: ArcSwap<CacheConfiguration>,
    clock: Box<dyn Clock + Send + Sync>,
}

impl DiscoveryCache {
    /// Constructs a cache with default bounds over the given transport
    #[must_use]
    pub fn new(exchange: Arc<dyn HttpExchange>) -> Self {
        Self {
            exchange,
            entries: DashMap::new(),
            configuration: ArcSwap::from_pointee(CacheConfiguration::default()),
            clock: Box::new(System),
        }
    }

    /// Replaces the clock; used by tests
    #[must_use]
    pub fn with_clock(mut self, clock: impl Clock + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// The active cache bounds
    #[must_use]
    pub fn configuration(&self) -> CacheConfiguration {
        **self.configuration.load()
    }

    /// Applies new cache bounds, holding each field to its floor
    pub fn set_configuration(&self, requested: CacheConfiguration) {
        let accepted = checked_configuration(self.configuration(), requested);
        self.configuration.store(Arc::new(accepted));
    }

    /// Returns the resolved endpoints, fetching the document on a miss
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be fetched or parsed.
    pub async fn get_or_fetch(&self, discovery_uri: &Url) -> Result<OidcEndpoints, ServiceError> {
        let configuration = self.configuration();

        if let Some(endpoints) = live_value(
            &self.entries,
            discovery_uri,
            configuration.ttl,
            self.clock.now(),
        ) {
            return Ok(endpoints);
        }

        let response = self.exchange.get(discovery_uri, &[]).await?;
        if !response.is_success() {
            return Err(ServiceError::error_response(
                response.status,
                discovery_uri.clone(),
                response.body,
            ));
        }

        let endpoints: OidcEndpoints = serde_json::from_str(&response.body).map_err(|e| {
            ServiceError::invalid_response(
                discovery_uri.clone(),
                format!("discovery document is not valid JSON: {e}"),
            )
        })?;

        tracing::debug!(discovery.url = %discovery_uri, "discovery document retrieved");

        evict_to_capacity(&self.entries, configuration.max_entries);
        self.entries.insert(
            discovery_uri.clone(),
            CacheEntry {
                value: endpoints.clone(),
                inserted: self.clock.now(),
            },
        );

        Ok(endpoints)
    }

    /// Drops every cached document
    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl fmt::Debug for DiscoveryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoveryCache")
            .field("configuration", &self.configuration())
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use tessera_clock::DurationSecs;

    use crate::test::StubExchange;

    use super::*;

    const DISCOVERY_BODY: &str = r#"{
        "issuer": "https://tenant.accounts.example.com",
        "token_endpoint": "https://tenant.accounts.example.com/oauth2/token",
        "authorization_endpoint": "https://tenant.accounts.example.com/oauth2/authorize",
        "jwks_uri": "https://tenant.accounts.example.com/oauth2/certs"
    }"#;

    fn uri() -> Url {
        discovery_uri("https://tenant.accounts.example.com").unwrap()
    }

    #[test]
    fn derives_the_well_known_uri() {
        assert_eq!(
            uri().as_str(),
            "https://tenant.accounts.example.com/.well-known/openid-configuration"
        );
    }

    #[test]
    fn keeps_an_issuer_path_prefix() {
        let uri = discovery_uri("https://tenant.accounts.example.com/tenant1/").unwrap();
        assert_eq!(
            uri.as_str(),
            "https://tenant.accounts.example.com/tenant1/.well-known/openid-configuration"
        );
    }

    #[tokio::test]
    async fn fetches_once_and_serves_from_cache() {
        let exchange = Arc::new(StubExchange::answering(200, DISCOVERY_BODY));
        let cache = DiscoveryCache::new(exchange.clone());

        for _ in 0..3 {
            let endpoints = cache.get_or_fetch(&uri()).await.unwrap();
            assert_eq!(
                endpoints.jwks_uri.as_ref().map(Url::as_str),
                Some("https://tenant.accounts.example.com/oauth2/certs")
            );
        }

        assert_eq!(exchange.gets(), 1);
    }

    #[tokio::test]
    async fn document_without_jwks_uri_still_resolves() {
        let exchange = Arc::new(StubExchange::answering(200, r#"{"issuer": "x"}"#));
        let cache = DiscoveryCache::new(exchange);

        let endpoints = cache.get_or_fetch(&uri()).await.unwrap();
        assert!(endpoints.jwks_uri.is_none());
    }

    #[tokio::test]
    async fn non_2xx_is_a_service_error() {
        let exchange = Arc::new(StubExchange::answering(404, "not found"));
        let cache = DiscoveryCache::new(exchange);

        let err = cache.get_or_fetch(&uri()).await.unwrap_err();
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn floors_apply_to_the_discovery_cache_too() {
        let exchange = Arc::new(StubExchange::answering(200, DISCOVERY_BODY));
        let cache = DiscoveryCache::new(exchange);

        cache.set_configuration(CacheConfiguration::new(DurationSecs(5), 10));
        assert_eq!(cache.configuration(), CacheConfiguration::default());
    }
}
