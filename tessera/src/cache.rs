//! Shared plumbing for the signing-key and discovery caches
//!
//! Both caches are concurrent maps with per-entry insertion timestamps.
//! Expiry is checked lazily on read, eviction happens on insert by dropping
//! the oldest-inserted entries; no background thread is involved.

use std::hash::Hash;

use dashmap::DashMap;
use tessera_clock::{DurationSecs, UnixTime};

/// The lowest accepted time-to-live
pub const MIN_CACHE_TTL: DurationSecs = DurationSecs(600);
/// The lowest accepted entry bound
pub const MIN_CACHE_ENTRIES: usize = 1000;

/// Time and size bounds for a cache
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheConfiguration {
    /// How long an entry stays in the cache
    pub ttl: DurationSecs,
    /// The maximum number of entries
    pub max_entries: usize,
}

impl Default for CacheConfiguration {
    fn default() -> Self {
        Self {
            ttl: MIN_CACHE_TTL,
            max_entries: MIN_CACHE_ENTRIES,
        }
    }
}

impl CacheConfiguration {
    /// A configuration with explicit bounds
    ///
    /// Values below the floors (600 seconds, 1000 entries) are rejected when
    /// the configuration is applied to a cache; the previous value is
    /// retained with a warning.
    #[must_use]
    pub fn new(ttl: DurationSecs, max_entries: usize) -> Self {
        Self { ttl, max_entries }
    }
}

/// Applies the floor rules: a below-floor field keeps its current value
pub(crate) fn checked_configuration(
    current: CacheConfiguration,
    requested: CacheConfiguration,
) -> CacheConfiguration {
    let mut accepted = requested;

    if requested.max_entries < MIN_CACHE_ENTRIES {
        tracing::warn!(
            requested = requested.max_entries,
            retained = current.max_entries,
            "cache size must be at least 1000 entries; keeping the previous size"
        );
        accepted.max_entries = current.max_entries;
    }

    if requested.ttl < MIN_CACHE_TTL {
        tracing::warn!(
            requested = requested.ttl.0,
            retained = current.ttl.0,
            "cache time-to-live must be at least 600 seconds; keeping the previous time-to-live"
        );
        accepted.ttl = current.ttl;
    }

    accepted
}

/// A cached value plus its insertion instant
#[derive(Clone, Debug)]
pub(crate) struct CacheEntry<V> {
    pub value: V,
    pub inserted: UnixTime,
}

/// Returns the live value for `key`, removing it when its TTL has passed
pub(crate) fn live_value<K, V>(
    entries: &DashMap<K, CacheEntry<V>>,
    key: &K,
    ttl: DurationSecs,
    now: UnixTime,
) -> Option<V>
where
    K: Eq + Hash,
    V: Clone,
{
    let (value, inserted) = {
        let entry = entries.get(key)?;
        (entry.value.clone(), entry.inserted)
    };

    if now >= inserted + ttl {
        entries.remove(key);
        return None;
    }

    Some(value)
}

/// Makes room for one more entry by dropping the oldest-inserted ones
pub(crate) fn evict_to_capacity<K, V>(entries: &DashMap<K, CacheEntry<V>>, max_entries: usize)
where
    K: Eq + Hash + Clone,
{
    while entries.len() >= max_entries {
        let oldest = entries
            .iter()
            .min_by_key(|entry| entry.value().inserted)
            .map(|entry| entry.key().clone());
        match oldest {
            Some(key) => {
                entries.remove(&key);
            }
            None => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn below_floor_ttl_keeps_the_previous_value() {
        let current = CacheConfiguration::default();
        let accepted =
            checked_configuration(current, CacheConfiguration::new(DurationSecs(599), 2000));
        assert_eq!(accepted.ttl, MIN_CACHE_TTL);
        assert_eq!(accepted.max_entries, 2000);
    }

    #[test]
    fn below_floor_size_keeps_the_previous_value() {
        let current = CacheConfiguration::new(DurationSecs(900), 5000);
        let accepted =
            checked_configuration(current, CacheConfiguration::new(DurationSecs(700), 999));
        assert_eq!(accepted.ttl, DurationSecs(700));
        assert_eq!(accepted.max_entries, 5000);
    }

    #[test]
    fn at_floor_values_are_accepted() {
        let accepted = checked_configuration(
            CacheConfiguration::default(),
            CacheConfiguration::new(MIN_CACHE_TTL, MIN_CACHE_ENTRIES),
        );
        assert_eq!(accepted, CacheConfiguration::default());
    }

    #[test]
    fn live_value_expires_lazily() {
        let entries: DashMap<&str, CacheEntry<u32>> = DashMap::new();
        entries.insert(
            "key",
            CacheEntry {
                value: 7,
                inserted: UnixTime(0),
            },
        );

        assert_eq!(
            live_value(&entries, &"key", DurationSecs(600), UnixTime(599)),
            Some(7)
        );
        assert_eq!(
            live_value(&entries, &"key", DurationSecs(600), UnixTime(600)),
            None
        );
        assert!(entries.is_empty());
    }

    #[test]
    fn eviction_drops_the_oldest_entries() {
        let entries: DashMap<u32, CacheEntry<u32>> = DashMap::new();
        for i in 0..4u32 {
            entries.insert(
                i,
                CacheEntry {
                    value: i,
                    inserted: UnixTime(u64::from(i)),
                },
            );
        }

        evict_to_capacity(&entries, 3);
        assert_eq!(entries.len(), 2);
        assert!(!entries.contains_key(&0));
        assert!(!entries.contains_key(&1));
        assert!(entries.contains_key(&3));
    }
}
