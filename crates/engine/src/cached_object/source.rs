//! Refresh and update functions

use async_trait::async_trait;
use cachefn_core::BoxError;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Produces a fresh value, optionally from the current one
///
/// The token is cancelled when the object is disposed.
#[async_trait]
pub trait RefreshSource<T>: Send + Sync {
    async fn refresh(&self, current: Option<Arc<T>>, token: CancellationToken)
        -> Result<T, BoxError>;
}

/// Folds an update into the current value
#[async_trait]
pub trait UpdateSource<T, U>: Send + Sync {
    async fn apply(&self, current: Arc<T>, update: Arc<U>) -> Result<T, BoxError>;
}

struct RefreshFn<F>(F);

#[async_trait]
impl<T, F, Fut> RefreshSource<T> for RefreshFn<F>
where
    T: Send + Sync + 'static,
    F: Fn(Option<Arc<T>>, CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, BoxError>> + Send,
{
    async fn refresh(
        &self,
        current: Option<Arc<T>>,
        token: CancellationToken,
    ) -> Result<T, BoxError> {
        (self.0)(current, token).await
    }
}

struct UpdateFn<F>(F);

#[async_trait]
impl<T, U, F, Fut> UpdateSource<T, U> for UpdateFn<F>
where
    T: Send + Sync + 'static,
    U: Send + Sync + 'static,
    F: Fn(Arc<T>, Arc<U>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, BoxError>> + Send,
{
    async fn apply(&self, current: Arc<T>, update: Arc<U>) -> Result<T, BoxError> {
        (self.0)(current, update).await
    }
}

/// Wrap an async closure as a refresh function
pub fn refresh_fn<T, F, Fut>(func: F) -> Arc<dyn RefreshSource<T>>
where
    T: Send + Sync + 'static,
    F: Fn(Option<Arc<T>>, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
{
    Arc::new(RefreshFn(func))
}

/// Wrap an async closure as an update function
pub fn update_fn<T, U, F, Fut>(func: F) -> Arc<dyn UpdateSource<T, U>>
where
    T: Send + Sync + 'static,
    U: Send + Sync + 'static,
    F: Fn(Arc<T>, Arc<U>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
{
    Arc::new(UpdateFn(func))
}
