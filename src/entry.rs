use crate::error::Error;
use tokio::sync::watch;

/// Lifecycle state of one cached entry.
#[derive(Debug, Clone, Default)]
pub struct EntryState {
    /// True from the instant a fetch is first attempted. Monotonic: never
    /// reset for the lifetime of the entry.
    pub initialized: bool,
    /// True while the initiating fetch for this entry is outstanding.
    pub is_loading: bool,
    /// True while a caller-driven async mutation is in progress.
    pub is_validating: bool,
    /// Last fetch failure; cleared on the next successful fetch. Mutation
    /// paths never touch it.
    pub error: Option<Error>,
}

/// One cached value plus its lifecycle state, for a single
/// (domain, sub-scope, canonical key).
///
/// Both cells are watch channels: reads borrow the current value, writes
/// notify every subscriber. Multi-field state transitions go through
/// [`merge_state`](CacheEntry::merge_state) so observers see them as a single
/// step, never a half-applied update.
#[derive(Debug)]
pub struct CacheEntry<T> {
    data: watch::Sender<T>,
    state: watch::Sender<EntryState>,
}

impl<T: Default> Default for CacheEntry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CacheEntry<T> {
    /// Fresh entry: zero-value data, uninitialized state.
    pub fn new() -> Self
    where
        T: Default,
    {
        Self {
            data: watch::Sender::new(T::default()),
            state: watch::Sender::new(EntryState::default()),
        }
    }

    /// Current cached value.
    pub fn data(&self) -> T
    where
        T: Clone,
    {
        self.data.borrow().clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EntryState {
        self.state.borrow().clone()
    }

    /// Replace the cached value and notify subscribers. State is untouched.
    pub fn set_data(&self, value: T) {
        self.data.send_replace(value);
    }

    /// Apply a partial update to the cached value in place, as one notified
    /// step.
    pub fn update_data(&self, f: impl FnOnce(&mut T)) {
        self.data.send_modify(f);
    }

    /// Merge fields into the state. The closure mutates only what it means
    /// to change; unrelated fields are preserved and subscribers observe the
    /// whole merge as one step.
    pub fn merge_state(&self, f: impl FnOnce(&mut EntryState)) {
        self.state.send_modify(f);
    }

    /// Subscribe to data changes.
    pub fn subscribe_data(&self) -> watch::Receiver<T> {
        self.data.subscribe()
    }

    /// Subscribe to state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<EntryState> {
        self.state.subscribe()
    }
}
