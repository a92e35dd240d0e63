use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;

/// Error a readiness probe may fail with. Absorbed into "not ready", never
/// surfaced further.
pub type ProbeError = Box<dyn std::error::Error + Send + Sync + 'static>;
type SyncProbe = Arc<dyn Fn() -> Result<bool, ProbeError> + Send + Sync>;
type AsyncProbe = Arc<dyn Fn() -> BoxFuture<'static, Result<bool, ProbeError>> + Send + Sync>;

/// Whether a binding may fetch or mutate right now.
///
/// The sync/async split is part of the contract rather than discovered at
/// runtime: an async probe starts out not-ready until its first resolution,
/// a sync probe is evaluated immediately. A probe that fails degrades to
/// "not ready" — readiness errors are absorbed, never surfaced to entry
/// state or the caller.
#[derive(Clone, Default)]
pub enum Readiness {
    /// No gate; the binding is always ready.
    #[default]
    Always,
    Sync(SyncProbe),
    Async(AsyncProbe),
}

impl Readiness {
    pub fn sync(probe: impl Fn() -> Result<bool, ProbeError> + Send + Sync + 'static) -> Self {
        Readiness::Sync(Arc::new(probe))
    }

    pub fn asynchronous<F, Fut>(probe: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<bool, ProbeError>> + Send + 'static,
    {
        Readiness::Async(Arc::new(move || probe().boxed()))
    }

    /// Readiness before the first resolution cycle.
    pub fn initial(&self) -> bool {
        match self {
            Readiness::Always => true,
            Readiness::Sync(probe) => probe().unwrap_or(false),
            Readiness::Async(_) => false,
        }
    }

    /// Evaluate the probe once.
    pub async fn resolve(&self) -> bool {
        let outcome = match self {
            Readiness::Always => return true,
            Readiness::Sync(probe) => probe(),
            Readiness::Async(probe) => probe().await,
        };

        match outcome {
            Ok(ready) => ready,
            Err(err) => {
                log::debug!("readiness probe failed, treating as not ready: {err}");
                false
            }
        }
    }
}
