//! Caching decorator for keyrings.
//!
//! [`CachingKeyring`] memoizes keys resolved by any [`Keyring`] in an LRU
//! table with a time-to-live, so hot keys do not hit a slow key source
//! (files, secret stores) on every field operation.

use crate::error::KeyringError;
use crate::keyring::{Key, Keyring};
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

/// Default time-to-live for cached keys.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Default maximum number of cached keys.
pub const DEFAULT_MAX_ENTRIES: usize = 5000;

/// Time source for cache expiry.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

/// Monotonic system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    elapsed: Mutex<Duration>,
}

impl ManualClock {
    /// Creates a clock frozen at the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self { origin: Instant::now(), elapsed: Mutex::new(Duration::ZERO) }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        *lock(&self.elapsed) += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *lock(&self.elapsed)
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// Cache sizing and expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    ttl: Duration,
    max_entries: NonZeroUsize,
}

impl CacheConfig {
    /// Creates a cache configuration.
    ///
    /// A zero `ttl` disables caching: every lookup reaches the wrapped
    /// keyring.
    ///
    /// # Errors
    ///
    /// Returns `KeyringError::InvalidConfig` if `max_entries` is zero.
    pub fn new(ttl: Duration, max_entries: usize) -> Result<Self, KeyringError> {
        let max_entries = NonZeroUsize::new(max_entries).ok_or_else(|| {
            KeyringError::InvalidConfig("cache max entries must be positive".to_string())
        })?;
        Ok(Self { ttl, max_entries })
    }

    /// Returns the time-to-live.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the maximum number of entries.
    #[must_use]
    pub const fn max_entries(&self) -> usize {
        self.max_entries.get()
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            max_entries: NonZeroUsize::new(DEFAULT_MAX_ENTRIES).unwrap_or(NonZeroUsize::MIN),
        }
    }
}

/// Hit and miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups forwarded to the wrapped keyring
    pub misses: u64,
}

struct CacheEntry {
    key: Key,
    /// `None` when `now + ttl` is not representable.
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |expires_at| now < expires_at)
    }
}

/// Keyring decorator that caches resolved keys.
///
/// Keys are cached under the identifier the caller passed in (so a bare
/// name keeps resolving to the same version until the entry expires).
/// Absent keys and errors are never cached, so a key created by a later
/// rotation becomes visible on the next lookup.
///
/// Concurrent misses for the same identifier are coalesced: one caller
/// queries the wrapped keyring while the others wait and then read its
/// result from the cache.
///
/// # Example
///
/// ```
/// use rotakey::cache::{CacheConfig, CachingKeyring};
/// use rotakey::keyring::{Keyring, StaticKeyring};
/// use std::time::Duration;
///
/// let inner = StaticKeyring::new().with_key("myKey", vec![0u8; 32]);
/// let config = CacheConfig::new(Duration::from_secs(60), 100).unwrap();
/// let keyring = CachingKeyring::new(inner, config);
///
/// assert!(keyring.get("myKey").unwrap().is_some());
/// assert!(keyring.get("myKey").unwrap().is_some());
/// assert_eq!(keyring.stats().hits, 1);
/// ```
pub struct CachingKeyring<K, C = SystemClock> {
    inner: K,
    clock: C,
    ttl: Duration,
    entries: Mutex<LruCache<String, CacheEntry>>,
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K: Keyring> CachingKeyring<K> {
    /// Wraps `inner` using the system clock.
    pub fn new(inner: K, config: CacheConfig) -> Self {
        Self::with_clock(inner, config, SystemClock)
    }
}

impl<K: Keyring, C: Clock> CachingKeyring<K, C> {
    /// Wraps `inner` using `clock` for expiry.
    pub fn with_clock(inner: K, config: CacheConfig, clock: C) -> Self {
        Self {
            inner,
            clock,
            ttl: config.ttl,
            entries: Mutex::new(LruCache::new(config.max_entries)),
            in_flight: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns the wrapped keyring.
    pub const fn inner(&self) -> &K {
        &self.inner
    }

    /// Drops the cached entry for `key_id`, returning `true` if one existed.
    pub fn invalidate(&self, key_id: &str) -> bool {
        lock(&self.entries).pop(key_id).is_some()
    }

    /// Drops all cached entries.
    pub fn clear(&self) {
        lock(&self.entries).clear();
    }

    /// Drops all expired entries.
    pub fn evict_expired(&self) {
        let now = self.clock.now();
        let mut entries = lock(&self.entries);

        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| !entry.is_fresh(now))
            .map(|(key_id, _)| key_id.clone())
            .collect();

        for key_id in &expired {
            entries.pop(key_id.as_str());
        }
        drop(entries);

        if !expired.is_empty() {
            debug!(count = expired.len(), "evicted expired keys");
        }
    }

    /// Returns the number of cached entries, including expired ones not yet
    /// evicted.
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the hit and miss counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn cached(&self, key_id: &str) -> Option<Key> {
        let now = self.clock.now();
        let mut entries = lock(&self.entries);

        let found = entries.get(key_id).map(|entry| (entry.is_fresh(now), entry.key.clone()));
        match found {
            Some((true, key)) => Some(key),
            Some((false, _)) => {
                entries.pop(key_id);
                debug!(key_id, "cached key expired");
                None
            }
            None => None,
        }
    }

    fn load(&self, key_id: &str) -> Result<Option<Key>, KeyringError> {
        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(key_id, "key cache miss");

        let key = self.inner.get(key_id)?;
        if let Some(key) = &key {
            if !self.ttl.is_zero() {
                let entry = CacheEntry {
                    key: key.clone(),
                    expires_at: self.clock.now().checked_add(self.ttl),
                };
                if let Some((evicted, _)) = lock(&self.entries).push(key_id.to_string(), entry) {
                    if evicted != key_id {
                        debug!(evicted = %evicted, "evicted least recently used key");
                    }
                }
            }
        }
        Ok(key)
    }

    fn slot(&self, key_id: &str) -> Arc<Mutex<()>> {
        Arc::clone(lock(&self.in_flight).entry(key_id.to_string()).or_default())
    }

    fn release(&self, key_id: &str, slot: Arc<Mutex<()>>) {
        let mut in_flight = lock(&self.in_flight);
        let ours = in_flight.get(key_id).is_some_and(|current| Arc::ptr_eq(current, &slot));
        drop(slot);
        // Only the map's reference left: nobody else is waiting on this slot.
        if ours && in_flight.get(key_id).is_some_and(|current| Arc::strong_count(current) == 1) {
            in_flight.remove(key_id);
        }
    }
}

impl<K: Keyring, C: Clock> Keyring for CachingKeyring<K, C> {
    fn get(&self, key_id: &str) -> Result<Option<Key>, KeyringError> {
        if let Some(key) = self.cached(key_id) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Some(key));
        }

        let slot = self.slot(key_id);
        let result = {
            let _guard = lock(&slot);
            // Another caller may have loaded the key while we waited.
            match self.cached(key_id) {
                Some(key) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    Ok(Some(key))
                }
                None => self.load(key_id),
            }
        };
        self.release(key_id, slot);
        result
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
