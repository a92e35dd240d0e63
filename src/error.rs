use std::sync::Arc;

/// Shared, cloneable error source.
///
/// Fetch errors live in two places at once: in the entry's state (for passive
/// observers) and in the shared in-flight operation (for every caller that
/// joined it). Both require `Clone`, hence the `Arc`.
pub type SharedSource = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Errors produced by the cache engine.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The fetcher rejected. Recorded into the entry's state and returned to
    /// whichever caller awaited the operation directly.
    #[error("fetch failed: {0}")]
    Fetch(#[source] SharedSource),
    /// An asynchronous mutation updater failed. Propagates to the
    /// `mutate_async` caller only; entry state is never touched by it.
    #[error("mutation updater failed: {0}")]
    Mutation(#[source] SharedSource),
}

impl Error {
    pub fn fetch(source: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>) -> Self {
        Error::Fetch(Arc::from(source.into()))
    }

    pub fn mutation(source: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>) -> Self {
        Error::Mutation(Arc::from(source.into()))
    }
}
