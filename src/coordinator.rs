use crate::entry::CacheEntry;
use crate::error::Error;
use crate::fetch::Fetch;
use crate::store::SubScope;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use getset::Getters;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[cfg(feature = "graphql")]
use async_graphql::SimpleObject;

/// Identifier of one fetchable cache slot: domain, sub-scope, canonical key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Getters)]
#[get = "pub"]
pub struct FetchId {
    domain: String,
    scope: SubScope,
    key: String,
}

impl FetchId {
    pub fn new(domain: impl Into<String>, scope: SubScope, key: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            scope,
            key: key.into(),
        }
    }
}

impl fmt::Display for FetchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ":{}:{}:{}:", self.domain, self.scope, self.key)
    }
}

/// A joinable fetch operation. Every caller for the same [`FetchId`] holds a
/// clone of the same shared future and observes the same settlement.
pub type SharedFetch<T> = Shared<BoxFuture<'static, Result<T, Error>>>;

struct InFlight<T> {
    /// Identifies the exact operation registered under a [`FetchId`], so a
    /// settling fetch only unregisters itself and can never clobber a newer
    /// operation for the same id.
    token: u64,
    op: SharedFetch<T>,
}

/// Orchestrates fetch execution against cache entries: joins callers onto
/// in-flight operations, applies the Loading / Ready / Failed transitions,
/// and keeps the in-flight registry consistent across settlements.
///
/// At most one operation is outstanding per [`FetchId`] at any time; the
/// registry is the single source of truth for that invariant.
pub struct FetchCoordinator<T> {
    in_flight: Arc<DashMap<FetchId, InFlight<T>>>,
    seq: AtomicU64,
}

impl<T> Default for FetchCoordinator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FetchCoordinator<T> {
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(DashMap::new()),
            seq: AtomicU64::new(0),
        }
    }

    /// Start a fetch for `id`, or join the one already outstanding.
    ///
    /// Starting a fetch marks the entry `initialized` and `is_loading` in a
    /// single observable step, registers the operation, and spawns a driver
    /// task so the operation settles the entry even if every caller drops
    /// the returned handle.
    ///
    /// On success the entry's data is replaced, then `is_loading` clears and
    /// `error` resets in one merge, so a state subscriber always reads the
    /// fresh data. On failure only the state changes; stale data survives a
    /// failed refetch. The returned handle resolves to the fetch result
    /// either way — passive observers read failures from entry state, the
    /// awaiting caller sees the `Err` directly.
    pub fn ensure_fetched(
        &self,
        entry: &Arc<CacheEntry<T>>,
        id: FetchId,
        fetcher: Arc<dyn Fetch<T>>,
        filters: Value,
    ) -> SharedFetch<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let op = match self.in_flight.entry(id.clone()) {
            Entry::Occupied(pending) => {
                log::debug!("joining in-flight fetch for {id}");
                return pending.get().op.clone();
            }
            Entry::Vacant(slot) => {
                log::debug!("starting fetch for {id}");
                entry.merge_state(|s| {
                    s.is_loading = true;
                    s.initialized = true;
                });

                let token = self.seq.fetch_add(1, Ordering::Relaxed);
                let registry = Arc::clone(&self.in_flight);
                let entry = Arc::clone(entry);
                let settle_id = id.clone();

                let op: SharedFetch<T> = async move {
                    let result = fetcher.fetch(&filters).await;
                    match &result {
                        Ok(data) => {
                            entry.set_data(data.clone());
                            entry.merge_state(|s| {
                                s.is_loading = false;
                                s.error = None;
                            });
                        }
                        Err(err) => {
                            log::debug!("fetch failed for {settle_id}: {err}");
                            entry.merge_state(|s| {
                                s.is_loading = false;
                                s.error = Some(err.clone());
                            });
                        }
                    }
                    registry.remove_if(&settle_id, |_, in_flight| in_flight.token == token);
                    result
                }
                .boxed()
                .shared();

                slot.insert(InFlight {
                    token,
                    op: op.clone(),
                });
                op
            }
        };

        // Drive the operation to completion independently of the callers.
        tokio::spawn(op.clone().map(|_| ()));
        op
    }

    /// Whether an operation is currently outstanding for `id`.
    pub fn pending(&self, id: &FetchId) -> bool {
        self.in_flight.contains_key(id)
    }

    pub fn stats(&self) -> InFlightStats {
        InFlightStats {
            pending_fetches: self.in_flight.len(),
        }
    }
}

/// In-flight registry statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "graphql", derive(SimpleObject))]
pub struct InFlightStats {
    pub pending_fetches: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchFn;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn counting_fetcher(
        count: Arc<AtomicUsize>,
        value: Vec<u32>,
    ) -> Arc<dyn Fetch<Vec<u32>>> {
        Arc::new(FetchFn(move |_filters: Value| {
            let count = count.clone();
            let value = value.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<_, Error>(value)
            }
        }))
    }

    #[tokio::test]
    async fn concurrent_calls_for_one_id_fetch_once() {
        let coordinator: FetchCoordinator<Vec<u32>> = FetchCoordinator::new();
        let entry = Arc::new(CacheEntry::new());
        let count = Arc::new(AtomicUsize::new(0));
        let id = FetchId::new("users", SubScope::Base, "{}");

        let first = coordinator.ensure_fetched(
            &entry,
            id.clone(),
            counting_fetcher(count.clone(), vec![1, 2, 3]),
            Value::Object(Default::default()),
        );
        let second = coordinator.ensure_fetched(
            &entry,
            id.clone(),
            counting_fetcher(count.clone(), vec![9, 9, 9]),
            Value::Object(Default::default()),
        );

        let (a, b) = futures::join!(first, second);
        assert_eq!(a.unwrap(), vec![1, 2, 3]);
        assert_eq!(b.unwrap(), vec![1, 2, 3]);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!coordinator.pending(&id));
    }

    #[tokio::test]
    async fn different_ids_are_not_deduplicated() {
        let coordinator: FetchCoordinator<Vec<u32>> = FetchCoordinator::new();
        let count = Arc::new(AtomicUsize::new(0));

        let entry_a = Arc::new(CacheEntry::new());
        let entry_b = Arc::new(CacheEntry::new());
        let a = coordinator.ensure_fetched(
            &entry_a,
            FetchId::new("users", SubScope::Base, r#"{"page":1}"#),
            counting_fetcher(count.clone(), vec![1]),
            Value::Object(Default::default()),
        );
        let b = coordinator.ensure_fetched(
            &entry_b,
            FetchId::new("users", SubScope::Base, r#"{"page":2}"#),
            counting_fetcher(count.clone(), vec![2]),
            Value::Object(Default::default()),
        );

        let _ = futures::join!(a, b);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn loading_and_initialized_are_set_together_at_start() {
        let coordinator: FetchCoordinator<Vec<u32>> = FetchCoordinator::new();
        let entry = Arc::new(CacheEntry::new());
        assert!(!entry.state().initialized);

        let op = coordinator.ensure_fetched(
            &entry,
            FetchId::new("users", SubScope::Base, "{}"),
            counting_fetcher(Arc::new(AtomicUsize::new(0)), vec![1]),
            Value::Object(Default::default()),
        );

        // Synchronously after the call, before the fetch settles.
        let state = entry.state();
        assert!(state.initialized);
        assert!(state.is_loading);

        op.await.unwrap();
        let state = entry.state();
        assert!(state.initialized);
        assert!(!state.is_loading);
        assert!(state.error.is_none());
        assert_eq!(entry.data(), vec![1]);
    }

    #[tokio::test]
    async fn failure_preserves_stale_data_and_initialized_survives() {
        let coordinator: FetchCoordinator<Vec<u32>> = FetchCoordinator::new();
        let entry = Arc::new(CacheEntry::new());
        let id = FetchId::new("users", SubScope::Base, "{}");

        // Seed with a successful fetch.
        coordinator
            .ensure_fetched(
                &entry,
                id.clone(),
                counting_fetcher(Arc::new(AtomicUsize::new(0)), vec![7]),
                Value::Object(Default::default()),
            )
            .await
            .unwrap();

        // Retried fetch fails: error recorded, data untouched.
        let failing: Arc<dyn Fetch<Vec<u32>>> = Arc::new(FetchFn(|_filters: Value| async {
            Err::<Vec<u32>, _>(Error::fetch("backend unavailable"))
        }));
        let result = coordinator
            .ensure_fetched(&entry, id.clone(), failing, Value::Object(Default::default()))
            .await;

        assert!(matches!(result, Err(Error::Fetch(_))));
        let state = entry.state();
        assert!(state.initialized);
        assert!(!state.is_loading);
        assert!(state.error.is_some());
        assert_eq!(entry.data(), vec![7]);

        // Registry is clear, so a later call fetches again and recovers.
        assert!(!coordinator.pending(&id));
        coordinator
            .ensure_fetched(
                &entry,
                id.clone(),
                counting_fetcher(Arc::new(AtomicUsize::new(0)), vec![8]),
                Value::Object(Default::default()),
            )
            .await
            .unwrap();
        assert!(entry.state().error.is_none());
        assert_eq!(entry.data(), vec![8]);
    }

    #[tokio::test]
    async fn operation_settles_even_when_no_caller_awaits() {
        let coordinator: FetchCoordinator<Vec<u32>> = FetchCoordinator::new();
        let entry = Arc::new(CacheEntry::new());
        let id = FetchId::new("users", SubScope::Base, "{}");
        let mut state_rx = entry.subscribe_state();

        let op = coordinator.ensure_fetched(
            &entry,
            id.clone(),
            counting_fetcher(Arc::new(AtomicUsize::new(0)), vec![4]),
            Value::Object(Default::default()),
        );
        drop(op);

        // The spawned driver still completes the fetch and settles state.
        while state_rx.borrow_and_update().is_loading || !state_rx.borrow().initialized {
            state_rx.changed().await.unwrap();
        }
        assert_eq!(entry.data(), vec![4]);
        assert!(!coordinator.pending(&id));
    }

    #[tokio::test]
    async fn settling_fetch_only_unregisters_its_own_operation() {
        let coordinator: FetchCoordinator<Vec<u32>> = FetchCoordinator::new();
        let entry = Arc::new(CacheEntry::new());
        let id = FetchId::new("users", SubScope::Base, "{}");
        let count = Arc::new(AtomicUsize::new(0));

        let first = coordinator.ensure_fetched(
            &entry,
            id.clone(),
            counting_fetcher(count.clone(), vec![1]),
            Value::Object(Default::default()),
        );

        // A newer operation takes over the registry row while the first is
        // still outstanding.
        let replacement: SharedFetch<Vec<u32>> = futures::future::ready(Ok::<_, Error>(vec![2]))
            .boxed()
            .shared();
        coordinator.in_flight.insert(
            id.clone(),
            InFlight {
                token: u64::MAX,
                op: replacement,
            },
        );

        first.await.unwrap();

        // The settled fetch removed nothing: the newer row survives and
        // later callers join it instead of fetching.
        assert!(coordinator.pending(&id));
        let joined = coordinator.ensure_fetched(
            &entry,
            id.clone(),
            counting_fetcher(count.clone(), vec![3]),
            Value::Object(Default::default()),
        );
        assert_eq!(joined.await.unwrap(), vec![2]);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn fetch_id_formats_like_a_registry_key() {
        let id = FetchId::new("users", SubScope::List, r#"{"page":1}"#);
        assert_eq!(id.to_string(), r#":users:list:{"page":1}:"#);
        assert_eq!(id.domain(), "users");
        assert_eq!(*id.scope(), SubScope::List);
    }
}
