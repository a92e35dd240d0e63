use crate::context::ContextPointer;
use crate::coordinator::{FetchId, SharedFetch};
use crate::entry::{CacheEntry, EntryState};
use crate::error::Error;
use crate::fetch::Fetch;
use crate::key::{canonical_filters, canonicalize, key_of};
use crate::readiness::Readiness;
use crate::store::SubScope;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

/// Producer of the current raw filter object, re-evaluated on every
/// reaction. `None` means "no filters" and maps to the stable empty key.
pub type FilterFn = Arc<dyn Fn() -> Option<Value> + Send + Sync>;

/// Configuration for one consumer binding.
pub struct BindingConfig<T> {
    domain: String,
    fetcher: Arc<dyn Fetch<T>>,
    filters: Option<FilterFn>,
    readiness: Readiness,
    scope: SubScope,
    dev_log: bool,
}

impl<T> BindingConfig<T> {
    pub fn new(domain: impl Into<String>, fetcher: Arc<dyn Fetch<T>>) -> Self {
        Self {
            domain: domain.into(),
            fetcher,
            filters: None,
            readiness: Readiness::Always,
            scope: SubScope::Base,
            dev_log: false,
        }
    }

    pub fn with_filters(mut self, filters: impl Fn() -> Option<Value> + Send + Sync + 'static) -> Self {
        self.filters = Some(Arc::new(filters));
        self
    }

    pub fn with_readiness(mut self, readiness: Readiness) -> Self {
        self.readiness = readiness;
        self
    }

    pub fn with_scope(mut self, scope: SubScope) -> Self {
        self.scope = scope;
        self
    }

    /// Log fetch starts at info level. Diagnostic only.
    pub fn with_dev_log(mut self, dev_log: bool) -> Self {
        self.dev_log = dev_log;
        self
    }
}

/// One consumer's view onto the cache: canonical key derivation, reactive
/// reads, readiness resolution, and gated mutation for a single domain.
///
/// The binding is addressed by whatever key its filter producer currently
/// yields. Changing filters addresses a different entry — the previous one
/// stays cached and is picked up again if the filters revert.
pub struct CacheBinding<T> {
    ctx: ContextPointer<T>,
    config: BindingConfig<T>,
    ready: watch::Sender<bool>,
}

impl<T> CacheBinding<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    pub fn new(ctx: ContextPointer<T>, config: BindingConfig<T>) -> Self {
        let ready = watch::Sender::new(config.readiness.initial());
        Self { ctx, config, ready }
    }

    fn raw_filters(&self) -> Option<Value> {
        self.config.filters.as_ref().and_then(|produce| produce())
    }

    /// Canonical (purged, sorted) filter structure; what the fetcher sees.
    pub fn filters(&self) -> Value {
        canonical_filters(self.raw_filters().as_ref())
    }

    /// Current canonical cache key.
    pub fn key(&self) -> String {
        canonicalize(self.raw_filters().as_ref())
    }

    fn entry_for(&self, key: &str) -> Arc<CacheEntry<T>> {
        self.ctx
            .store()
            .get_or_create(&self.config.domain, self.config.scope, key)
    }

    /// The entry currently addressed by this binding's domain and filters,
    /// created on first observation.
    pub fn entry(&self) -> Arc<CacheEntry<T>> {
        self.entry_for(&self.key())
    }

    /// Current cached value for the addressed entry.
    pub fn data(&self) -> T {
        self.entry().data()
    }

    /// Current lifecycle state for the addressed entry.
    pub fn state(&self) -> EntryState {
        self.entry().state()
    }

    /// Subscribe to data changes of the currently addressed entry. The
    /// subscription follows that entry, not the binding: re-subscribe after
    /// a filter change.
    pub fn subscribe_data(&self) -> watch::Receiver<T> {
        self.entry().subscribe_data()
    }

    /// Subscribe to state changes of the currently addressed entry.
    pub fn subscribe_state(&self) -> watch::Receiver<EntryState> {
        self.entry().subscribe_state()
    }

    /// Last resolved readiness.
    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Subscribe to readiness changes.
    pub fn subscribe_ready(&self) -> watch::Receiver<bool> {
        self.ready.subscribe()
    }

    /// Re-evaluate the readiness probe and record the outcome.
    pub async fn resolve_ready(&self) -> bool {
        let ready = self.config.readiness.resolve().await;
        self.ready.send_replace(ready);
        ready
    }

    fn gate_open(&self, entry: &CacheEntry<T>) -> bool {
        let state = entry.state();
        self.is_ready() && state.initialized && !state.is_loading && !state.is_validating
    }

    /// Whether mutations may act: ready, initialized, and neither loading
    /// nor validating.
    pub fn can_act(&self) -> bool {
        self.gate_open(&self.entry())
    }

    /// One reaction step, to be invoked by the external reactive layer
    /// whenever readiness inputs or filters may have changed: resolve
    /// readiness, then start a fetch if the currently addressed entry has
    /// never been fetched. Returns the started (or joined) operation, or
    /// `None` when no fetch was warranted.
    pub async fn tick(&self) -> Option<SharedFetch<T>> {
        if !self.resolve_ready().await {
            return None;
        }
        let filters = self.filters();
        let key = key_of(&filters);
        let entry = self.entry_for(&key);
        if entry.state().initialized {
            return None;
        }
        Some(self.fetch_entry(entry, key, filters))
    }

    /// Force a fetch for the current key, joining any in-flight operation.
    /// Rejections propagate on this path; passive observers only see them in
    /// entry state.
    pub async fn refetch(&self) -> Result<T, Error> {
        let filters = self.filters();
        let key = key_of(&filters);
        let entry = self.entry_for(&key);
        self.fetch_entry(entry, key, filters).await
    }

    /// Start or join the fetch for one snapshot of the binding's filters.
    ///
    /// The key, the entry, and the filters handed to the fetcher all derive
    /// from that single snapshot: the filter producer is never re-consulted
    /// mid-operation, so the registered operation and the entry it settles
    /// always correspond even when the producer's backing state moves
    /// concurrently.
    fn fetch_entry(&self, entry: Arc<CacheEntry<T>>, key: String, filters: Value) -> SharedFetch<T> {
        let id = FetchId::new(self.config.domain.clone(), self.config.scope, key);
        if self.config.dev_log {
            log::info!("fetch {id}");
        }
        self.ctx
            .coordinator()
            .ensure_fetched(&entry, id, Arc::clone(&self.config.fetcher), filters)
    }

    /// Synchronous gated mutation. Silently a no-op unless [`can_act`]
    /// holds: mutation attempts made while a fetch is outstanding are
    /// dropped, not queued.
    ///
    /// [`can_act`]: CacheBinding::can_act
    pub fn mutate(&self, f: impl FnOnce(&mut T)) {
        let entry = self.entry();
        if !self.gate_open(&entry) {
            log::debug!("mutation dropped for {}, gate closed", self.config.domain);
            return;
        }
        entry.update_data(f);
    }

    /// Asynchronous gated mutation. Gated like [`mutate`]; while the updater
    /// runs the entry is flagged `is_validating`, and the flag clears when
    /// the updater settles whether it succeeded or not. The updater's error
    /// still propagates to the caller.
    ///
    /// The updater receives the entry (its setter), the current data, and
    /// the canonical filters.
    ///
    /// [`mutate`]: CacheBinding::mutate
    pub async fn mutate_async<U, Fut>(&self, updater: U) -> Result<(), Error>
    where
        U: FnOnce(Arc<CacheEntry<T>>, T, Value) -> Fut,
        Fut: Future<Output = Result<(), Error>>,
    {
        let filters = self.filters();
        let entry = self.entry_for(&key_of(&filters));
        if !self.gate_open(&entry) {
            log::debug!("async mutation dropped for {}, gate closed", self.config.domain);
            return Ok(());
        }

        entry.merge_state(|s| s.is_validating = true);
        let outcome = updater(Arc::clone(&entry), entry.data(), filters).await;
        entry.merge_state(|s| s.is_validating = false);
        outcome
    }
}
