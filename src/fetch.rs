use crate::error::Error;
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;

/// The caller-supplied data source for a domain.
///
/// Receives the canonical (purged, sorted) filter structure, never the raw
/// input the binding's filter producer returned.
#[async_trait]
pub trait Fetch<T>: Send + Sync {
    async fn fetch(&self, filters: &Value) -> Result<T, Error>;
}

/// Adapter so plain async closures can serve as fetchers.
///
/// ```ignore
/// let fetcher = Arc::new(FetchFn(|filters: Value| async move {
///     Ok(load_users(&filters).await?)
/// }));
/// ```
pub struct FetchFn<F>(pub F);

#[async_trait]
impl<T, F, Fut> Fetch<T> for FetchFn<F>
where
    T: Send + 'static,
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, Error>> + Send,
{
    async fn fetch(&self, filters: &Value) -> Result<T, Error> {
        (self.0)(filters.clone()).await
    }
}
