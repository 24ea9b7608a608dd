//! The signing-key cache backing signature verification
//!
//! Keys are cached individually by (key set URI, algorithm, key id), so a
//! rotation that introduces a new key id does not invalidate still-valid
//! cached keys. One fetch primes the cache with every key the endpoint
//! currently publishes.
//!
//! Concurrent misses for the same key may each trigger an independent fetch;
//! there is deliberately no single-flight de-duplication. The fetch is an
//! idempotent GET and concurrency is bounded by request handling anyway.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use tessera_client::{http::HttpExchange, ServiceError};
use tessera_clock::{Clock, System};
use url::Url;

use crate::{
    cache::{checked_configuration, evict_to_capacity, live_value, CacheConfiguration, CacheEntry},
    jwa::{SignatureAlgorithm, VerificationKey},
    jwk::JsonWebKeySet,
};

const HEADER_CLIENT_ID: &str = "x-client_id";
const HEADER_TENANT_ID: &str = "x-app_tid";

/// Caches the verification keys published at identity service key set endpoints
pub struct SigningKeyCache {
    exchange: Arc<dyn HttpExchange>,
    entries: DashMap<String, CacheEntry<VerificationKey>>,
    configuration: ArcSwap<CacheConfiguration>,
    clock: Box<dyn Clock + Send + Sync>,
    client_id: Option<String>,
    tenant_id: Option<String>,
}

impl SigningKeyCache {
    /// Constructs a cache with default bounds over the given transport
    #[must_use]
    pub fn new(exchange: Arc<dyn HttpExchange>) -> Self {
        Self {
            exchange,
            entries: DashMap::new(),
            configuration: ArcSwap::from_pointee(CacheConfiguration::default()),
            clock: Box::new(System),
            client_id: None,
            tenant_id: None,
        }
    }

    /// Attaches the client id and tenant id sent as key-fetch context headers
    #[must_use]
    pub fn with_context(mut self, client_id: Option<String>, tenant_id: Option<String>) -> Self {
        self.client_id = client_id;
        self.tenant_id = tenant_id;
        self
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
    ///
    /// A below-floor value is rejected with a warning and the previous value
    /// stays in effect. Entries already cached are not retroactively
    /// evicted; the new bounds apply to subsequent reads and inserts.
    pub fn set_configuration(&self, requested: CacheConfiguration) {
        let accepted = checked_configuration(self.configuration(), requested);
        tracing::debug!(
            ttl_secs = accepted.ttl.0,
            max_entries = accepted.max_entries,
            "configured signing key cache"
        );
        self.configuration.store(Arc::new(accepted));
    }

    /// Returns the cached key, fetching and priming the cache on a miss
    ///
    /// `Ok(None)` means the key set endpoint answered but does not publish a
    /// key with the requested id; callers treat that as a trust failure, not
    /// an infrastructure failure.
    ///
    /// # Errors
    ///
    /// Returns an error if the key set cannot be fetched or parsed.
    pub async fn get_public_key(
        &self,
        algorithm: SignatureAlgorithm,
        key_id: &str,
        jwks_uri: &Url,
    ) -> Result<Option<VerificationKey>, ServiceError> {
        let cache_key = unique_cache_key(algorithm, key_id, jwks_uri);
        let configuration = self.configuration();

        if let Some(key) =
            live_value(&self.entries, &cache_key, configuration.ttl, self.clock.now())
        {
            return Ok(Some(key));
        }

        self.retrieve_and_fill(jwks_uri).await?;

        Ok(live_value(
            &self.entries,
            &cache_key,
            configuration.ttl,
            self.clock.now(),
        ))
    }

    /// Drops every cached key
    pub fn clear(&self) {
        self.entries.clear();
    }

    async fn retrieve_and_fill(&self, jwks_uri: &Url) -> Result<(), ServiceError> {
        let mut headers = Vec::new();
        if let Some(client_id) = &self.client_id {
            headers.push((HEADER_CLIENT_ID.to_owned(), client_id.clone()));
        }
        if let Some(tenant_id) = &self.tenant_id {
            headers.push((HEADER_TENANT_ID.to_owned(), tenant_id.clone()));
        }

        let response = self.exchange.get(jwks_uri, &headers).await?;
        if !response.is_success() {
            return Err(ServiceError::error_response(
                response.status,
                jwks_uri.clone(),
                response.body,
            ));
        }

        let key_set: JsonWebKeySet = serde_json::from_str(&response.body).map_err(|e| {
            ServiceError::invalid_response(
                jwks_uri.clone(),
                format!("key set response is not valid JSON: {e}"),
            )
        })?;

        tracing::debug!(jwks.url = %jwks_uri, keys = key_set.keys().len(), "key set retrieved");

        let max_entries = self.configuration().max_entries;
        let now = self.clock.now();
        for key in key_set.keys() {
            evict_to_capacity(&self.entries, max_entries);
            self.entries.insert(
                unique_cache_key(key.algorithm(), key.key_id(), jwks_uri),
                CacheEntry {
                    value: key.verification_key().clone(),
                    inserted: now,
                },
            );
        }

        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

impl fmt::Debug for SigningKeyCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeyCache")
            .field("configuration", &self.configuration())
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

/// One opaque cache key per (key set URI, algorithm, key id)
///
/// Plain concatenation is enough here; a collision only costs a cache miss.
fn unique_cache_key(algorithm: SignatureAlgorithm, key_id: &str, jwks_uri: &Url) -> String {
    format!("{jwks_uri}#{algorithm}/{key_id}")
}
