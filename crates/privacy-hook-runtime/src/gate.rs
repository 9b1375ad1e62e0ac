//! Consent gate with a key-based result cache.
//!
//! Every wrapper call goes through [`ConsentGate::guard`]:
//!
//! 1. With the cache enabled, a stored value of the expected type is returned
//!    immediately. No consent check happens and the real accessor is not called.
//! 2. Without consent, the denial is logged with a backtrace and the
//!    wrapper's safe default is returned. The cache is left untouched.
//! 3. Otherwise the real accessor runs and its result is stored under the key,
//!    unless it is absent or empty.
//!
//! Keys name the wrapped accessor, not the call arguments, so differently
//! parameterized calls share one entry. Entries are never evicted, and
//! revoking consent does not clear them.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::backtrace::Backtrace;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, enabled, info, warn, Level};

use crate::metrics::GateMetrics;

/// Log target for consent denials.
pub const AUDIT_TARGET: &str = "privacy_hook::audit";

/// A value the gate may cache.
pub trait CacheValue: Any + Clone + Send + Sync {
    /// Whether a freshly fetched value should be stored.
    fn is_storable(&self) -> bool {
        true
    }
}

impl CacheValue for String {
    fn is_storable(&self) -> bool {
        !self.is_empty()
    }
}

impl<T: Clone + Send + Sync + 'static> CacheValue for Vec<T> {
    fn is_storable(&self) -> bool {
        !self.is_empty()
    }
}

impl<T: CacheValue> CacheValue for Option<T> {
    fn is_storable(&self) -> bool {
        self.as_ref().map(|v| v.is_storable()).unwrap_or(false)
    }
}

/// Initial gate state, as supplied by the host application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsentConfig {
    pub consent_granted: bool,
    pub cache_enabled: bool,
}

impl Default for ConsentConfig {
    fn default() -> Self {
        Self {
            consent_granted: false,
            cache_enabled: true,
        }
    }
}

type Entry = Arc<dyn Any + Send + Sync>;

/// Process-wide consent state and result cache.
///
/// Construct once at startup and share as `Arc<ConsentGate>`.
#[derive(Debug)]
pub struct ConsentGate {
    consent_granted: AtomicBool,
    cache_enabled: AtomicBool,
    cache: RwLock<HashMap<String, Entry>>,
    metrics: GateMetrics,
}

impl Default for ConsentGate {
    fn default() -> Self {
        Self::new(ConsentConfig::default())
    }
}

impl ConsentGate {
    pub fn new(config: ConsentConfig) -> Self {
        Self {
            consent_granted: AtomicBool::new(config.consent_granted),
            cache_enabled: AtomicBool::new(config.cache_enabled),
            cache: RwLock::new(HashMap::new()),
            metrics: GateMetrics::default(),
        }
    }

    pub fn shared(config: ConsentConfig) -> Arc<Self> {
        Arc::new(Self::new(config))
    }

    pub fn grant_consent(&self) {
        self.set_consent(true);
    }

    pub fn revoke_consent(&self) {
        self.set_consent(false);
    }

    pub fn set_consent(&self, granted: bool) {
        let previous = self.consent_granted.swap(granted, Ordering::AcqRel);
        if previous != granted {
            info!(granted, "privacy consent changed");
        }
    }

    pub fn is_consent_granted(&self) -> bool {
        self.consent_granted.load(Ordering::Acquire)
    }

    /// Turn cache reads on or off. Fetched values are stored either way.
    pub fn set_cache_enabled(&self, enabled: bool) {
        self.cache_enabled.store(enabled, Ordering::Release);
    }

    pub fn is_cache_enabled(&self) -> bool {
        self.cache_enabled.load(Ordering::Acquire)
    }

    /// Consent check for `key`. Logs the denial and the calling stack when
    /// consent is missing.
    pub fn check(&self, key: &str) -> bool {
        if self.is_consent_granted() {
            return true;
        }
        self.metrics.record_denial();
        if enabled!(target: AUDIT_TARGET, Level::INFO) {
            let backtrace = Backtrace::force_capture();
            info!(
                target: AUDIT_TARGET,
                key,
                backtrace = %backtrace,
                "privacy accessor called before consent"
            );
        }
        false
    }

    /// Cached lookup, then consent check, then `fetch`.
    pub fn guard<T, D, F>(&self, key: &str, default: D, fetch: F) -> T
    where
        T: CacheValue,
        D: FnOnce() -> T,
        F: FnOnce() -> T,
    {
        if self.is_cache_enabled() {
            if let Some(hit) = self.cached::<T>(key) {
                self.metrics.record_cache_hit();
                debug!(key, "privacy accessor served from cache");
                return hit;
            }
        }
        if !self.check(key) {
            return default();
        }

        self.metrics.record_fetch();
        let value = fetch();
        if value.is_storable() {
            self.cache
                .write()
                .insert(key.to_string(), Arc::new(value.clone()));
            debug!(key, "privacy accessor result cached");
        } else {
            self.metrics.record_unstored();
            debug!(key, "privacy accessor returned nothing to cache");
        }
        value
    }

    /// Consent check only. Nothing is cached.
    pub fn guard_uncached<T, D, F>(&self, key: &str, default: D, fetch: F) -> T
    where
        D: FnOnce() -> T,
        F: FnOnce() -> T,
    {
        if !self.check(key) {
            return default();
        }
        self.metrics.record_fetch();
        fetch()
    }

    /// The cached value for `key`, if one of type `T` is stored.
    ///
    /// An entry of another type is reported and treated as absent.
    pub fn cached<T: CacheValue>(&self, key: &str) -> Option<T> {
        let entry = self.cache.read().get(key).cloned()?;
        match entry.downcast_ref::<T>() {
            Some(value) => Some(value.clone()),
            None => {
                self.metrics.record_type_mismatch();
                warn!(
                    key,
                    expected = std::any::type_name::<T>(),
                    "cached value has an unexpected type, ignoring it"
                );
                None
            }
        }
    }

    /// Keys with a stored value, sorted.
    pub fn cached_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.cache.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn cache_len(&self) -> usize {
        self.cache.read().len()
    }

    pub fn metrics(&self) -> &GateMetrics {
        &self.metrics
    }
}
