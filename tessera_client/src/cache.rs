//! The token response cache
//!
//! Responses are cached by the full request shape: endpoint (after subdomain
//! substitution), headers, and parameters. A cached response is served only
//! while it is comfortably within its lifetime; once its expiry minus the
//! configured refresh-ahead delta has passed, a lookup counts as a miss and
//! the next request replaces the entry.

use std::collections::BTreeMap;

use dashmap::DashMap;
use tessera_clock::{DurationSecs, UnixTime};
use url::Url;

use crate::response::OAuth2TokenResponse;

/// Configuration for the token response cache
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TokenCacheConfiguration {
    /// How long a response stays in the cache at most
    pub ttl: DurationSecs,
    /// The maximum number of cached responses
    pub max_entries: usize,
    /// How long before its expiry a cached token is already refreshed
    pub expiration_delta: DurationSecs,
    /// Disables caching entirely when set
    pub disabled: bool,
}

impl Default for TokenCacheConfiguration {
    fn default() -> Self {
        Self {
            ttl: DurationSecs(600),
            max_entries: 1000,
            expiration_delta: DurationSecs(30),
            disabled: false,
        }
    }
}

impl TokenCacheConfiguration {
    /// A configuration with explicit bounds and refresh-ahead delta
    #[must_use]
    pub fn new(ttl: DurationSecs, max_entries: usize, expiration_delta: DurationSecs) -> Self {
        Self {
            ttl,
            max_entries,
            expiration_delta,
            disabled: false,
        }
    }

    /// A configuration that turns caching off
    #[must_use]
    pub fn cache_disabled() -> Self {
        Self {
            disabled: true,
            ..Self::default()
        }
    }
}

/// Two token requests are cache-equivalent iff endpoint, headers, and
/// parameters are all equal.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct CacheKey {
    pub endpoint: Url,
    pub headers: Vec<(String, String)>,
    pub params: BTreeMap<String, String>,
}

#[derive(Debug)]
struct CachedResponse {
    response: OAuth2TokenResponse,
    inserted: UnixTime,
}

#[derive(Debug)]
pub(crate) struct TokenResponseCache {
    entries: DashMap<CacheKey, CachedResponse>,
    configuration: TokenCacheConfiguration,
}

impl TokenResponseCache {
    pub(crate) fn new(configuration: TokenCacheConfiguration) -> Self {
        Self {
            entries: DashMap::new(),
            configuration,
        }
    }

    /// Returns a cached response, applying entry TTL and refresh-ahead
    pub(crate) fn lookup(&self, key: &CacheKey, now: UnixTime) -> Option<OAuth2TokenResponse> {
        let (response, inserted) = {
            let entry = self.entries.get(key)?;
            (entry.response.clone(), entry.inserted)
        };

        if now >= inserted + self.configuration.ttl {
            self.entries.remove(key);
            return None;
        }

        if response.expired_at() - self.configuration.expiration_delta < now {
            // (soon) expired token; treat as a miss so it gets refreshed
            self.entries.remove(key);
            return None;
        }

        Some(response)
    }

    pub(crate) fn insert(&self, key: CacheKey, response: OAuth2TokenResponse, now: UnixTime) {
        while !self.entries.contains_key(&key) && self.entries.len() >= self.configuration.max_entries
        {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.value().inserted)
                .map(|entry| entry.key().clone());
            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                }
                None => break,
            }
        }

        self.entries.insert(
            key,
            CachedResponse {
                response,
                inserted: now,
            },
        );
    }

    pub(crate) fn clear(&self) {
        self.entries.clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
