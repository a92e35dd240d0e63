use crate::entry::{CacheEntry, EntryState};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[cfg(feature = "graphql")]
use async_graphql::SimpleObject;

/// Optional partitioning dimension within a domain.
///
/// Off by default: everything lands in `Base` unless a binding opts in to a
/// separate scope, e.g. keeping a paginated list and a single-record view of
/// the same domain apart.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum SubScope {
    #[default]
    Base,
    List,
    Record,
}

/// One domain's slice of the cache.
///
/// `freeze` is carried in the data model but enforced by nothing; its
/// intended semantics were never settled, so it stays a documented no-op
/// rather than growing an invented policy.
pub struct DomainBucket<T> {
    freeze: AtomicBool,
    entries: DashMap<(SubScope, String), Arc<CacheEntry<T>>>,
}

impl<T> Default for DomainBucket<T> {
    fn default() -> Self {
        Self {
            freeze: AtomicBool::new(false),
            entries: DashMap::new(),
        }
    }
}

/// Registry of cache entries, keyed by domain → (sub-scope, canonical key).
///
/// Buckets and entries are created lazily on first access and never removed;
/// the registry lives as long as its owning [`CacheContext`](crate::context::CacheContext).
pub struct CacheStore<T> {
    domains: DashMap<String, DomainBucket<T>>,
}

impl<T> Default for CacheStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CacheStore<T> {
    pub fn new() -> Self {
        Self {
            domains: DashMap::new(),
        }
    }

    /// Resolve the entry for (domain, scope, key), creating it on first
    /// observation. Idempotent: repeated calls return the same `Arc`, so a
    /// mutation through one holder is observed by every other.
    pub fn get_or_create(&self, domain: &str, scope: SubScope, key: &str) -> Arc<CacheEntry<T>>
    where
        T: Default,
    {
        let bucket = self.domains.entry(domain.to_string()).or_default();
        // Bind before returning so the inner map guard drops ahead of
        // `bucket`'s.
        let entry = bucket
            .entries
            .entry((scope, key.to_string()))
            .or_insert_with(|| Arc::new(CacheEntry::new()))
            .clone();
        entry
    }

    /// Replace the data of an entry, leaving its state untouched.
    pub fn set_data(&self, domain: &str, scope: SubScope, key: &str, value: T)
    where
        T: Default,
    {
        self.get_or_create(domain, scope, key).set_data(value);
    }

    /// Merge fields into an entry's state; unrelated fields are preserved.
    pub fn merge_state(
        &self,
        domain: &str,
        scope: SubScope,
        key: &str,
        f: impl FnOnce(&mut EntryState),
    ) where
        T: Default,
    {
        self.get_or_create(domain, scope, key).merge_state(f);
    }

    /// Whether the domain is flagged frozen. Nothing in the engine reads
    /// this; see [`DomainBucket`].
    pub fn frozen(&self, domain: &str) -> bool {
        self.domains
            .get(domain)
            .map(|bucket| bucket.freeze.load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    /// Flag a domain frozen or not. Carried, never enforced.
    pub fn set_frozen(&self, domain: &str, frozen: bool) {
        self.domains
            .entry(domain.to_string())
            .or_default()
            .freeze
            .store(frozen, Ordering::Relaxed);
    }

    /// Snapshot of registry size and entry lifecycle states.
    pub fn stats(&self) -> CacheStats {
        let mut entries = 0;
        let mut initialized_entries = 0;
        let mut loading_entries = 0;

        for bucket in self.domains.iter() {
            for entry in bucket.entries.iter() {
                entries += 1;
                let state = entry.value().state();
                if state.initialized {
                    initialized_entries += 1;
                }
                if state.is_loading {
                    loading_entries += 1;
                }
            }
        }

        CacheStats {
            domains: self.domains.len(),
            entries,
            initialized_entries,
            loading_entries,
        }
    }
}

/// Cache registry statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "graphql", derive(SimpleObject))]
pub struct CacheStats {
    pub domains: usize,
    pub entries: usize,
    pub initialized_entries: usize,
    pub loading_entries: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_is_idempotent() {
        let store: CacheStore<Vec<u32>> = CacheStore::new();
        let a = store.get_or_create("users", SubScope::Base, "{}");
        let b = store.get_or_create("users", SubScope::Base, "{}");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn scopes_and_keys_address_distinct_entries() {
        let store: CacheStore<Vec<u32>> = CacheStore::new();
        let base = store.get_or_create("users", SubScope::Base, "{}");
        let list = store.get_or_create("users", SubScope::List, "{}");
        let other_key = store.get_or_create("users", SubScope::Base, r#"{"page":2}"#);

        assert!(!Arc::ptr_eq(&base, &list));
        assert!(!Arc::ptr_eq(&base, &other_key));
    }

    #[test]
    fn mutations_are_visible_through_every_holder() {
        let store: CacheStore<Vec<u32>> = CacheStore::new();
        let held = store.get_or_create("users", SubScope::Base, "{}");

        store.set_data("users", SubScope::Base, "{}", vec![7]);
        store.merge_state("users", SubScope::Base, "{}", |s| s.initialized = true);

        assert_eq!(held.data(), vec![7]);
        assert!(held.state().initialized);
    }

    #[test]
    fn freeze_flag_round_trips_without_side_effects() {
        let store: CacheStore<Vec<u32>> = CacheStore::new();
        assert!(!store.frozen("users"));
        store.set_frozen("users", true);
        assert!(store.frozen("users"));

        // Still writable: the flag is declared, not enforced.
        store.set_data("users", SubScope::Base, "{}", vec![1]);
        assert_eq!(
            store.get_or_create("users", SubScope::Base, "{}").data(),
            vec![1]
        );
    }

    #[test]
    fn stats_count_lifecycle_states() {
        let store: CacheStore<Vec<u32>> = CacheStore::new();
        store.merge_state("users", SubScope::Base, "{}", |s| {
            s.initialized = true;
            s.is_loading = true;
        });
        store.get_or_create("posts", SubScope::Base, "{}");

        let stats = store.stats();
        assert_eq!(stats.domains, 2);
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.initialized_entries, 1);
        assert_eq!(stats.loading_entries, 1);
    }

    #[test]
    fn sub_scope_parses_and_displays_lowercase() {
        use std::str::FromStr;
        assert_eq!(SubScope::List.to_string(), "list");
        assert_eq!(SubScope::from_str("record").unwrap(), SubScope::Record);
        assert_eq!(SubScope::default(), SubScope::Base);
    }
}
