//! Source functions that produce values on a cache miss

use async_trait::async_trait;
use cachefn_core::BoxError;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Fetches the value for one key
#[async_trait]
pub trait SourceFunction<K, V>: Send + Sync {
    async fn fetch(&self, key: K, token: CancellationToken) -> Result<V, BoxError>;
}

/// Fetches values for a batch of keys in one call
///
/// Keys missing from the returned pairs are resolved through the engine's
/// missing-key factory, or reported as missing.
#[async_trait]
pub trait MultiKeySourceFunction<K, V>: Send + Sync {
    async fn fetch_many(&self, keys: Vec<K>, token: CancellationToken)
        -> Result<Vec<(K, V)>, BoxError>;
}

/// The source an engine dispatches misses to
pub enum Source<K, V> {
    /// One call per missed key
    Single(Arc<dyn SourceFunction<K, V>>),
    /// One call per batch of missed keys
    Multi(Arc<dyn MultiKeySourceFunction<K, V>>),
}

impl<K, V> Source<K, V> {
    pub const fn is_multi_key(&self) -> bool {
        matches!(self, Self::Multi(_))
    }
}

impl<K, V> Clone for Source<K, V> {
    fn clone(&self) -> Self {
        match self {
            Self::Single(source) => Self::Single(Arc::clone(source)),
            Self::Multi(source) => Self::Multi(Arc::clone(source)),
        }
    }
}

impl<K, V> From<Arc<dyn SourceFunction<K, V>>> for Source<K, V> {
    fn from(source: Arc<dyn SourceFunction<K, V>>) -> Self {
        Self::Single(source)
    }
}

impl<K, V> From<Arc<dyn MultiKeySourceFunction<K, V>>> for Source<K, V> {
    fn from(source: Arc<dyn MultiKeySourceFunction<K, V>>) -> Self {
        Self::Multi(source)
    }
}

/// Adapter for async closures taking one key
pub struct FnSource<F>(F);

#[async_trait]
impl<K, V, F, Fut> SourceFunction<K, V> for FnSource<F>
where
    K: Send + 'static,
    V: Send + 'static,
    F: Fn(K, CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<V, BoxError>> + Send,
{
    async fn fetch(&self, key: K, token: CancellationToken) -> Result<V, BoxError> {
        (self.0)(key, token).await
    }
}

/// Adapter for blocking closures taking one key
pub struct SyncFnSource<F, K, V> {
    func: F,
    _marker: PhantomData<fn(K) -> V>,
}

#[async_trait]
impl<K, V, F> SourceFunction<K, V> for SyncFnSource<F, K, V>
where
    K: Send + 'static,
    V: Send + 'static,
    F: Fn(K) -> Result<V, BoxError> + Send + Sync,
{
    async fn fetch(&self, key: K, _token: CancellationToken) -> Result<V, BoxError> {
        (self.func)(key)
    }
}

/// Adapter for async closures taking a batch of keys
pub struct MultiFnSource<F>(F);

#[async_trait]
impl<K, V, F, Fut> MultiKeySourceFunction<K, V> for MultiFnSource<F>
where
    K: Send + 'static,
    V: Send + 'static,
    F: Fn(Vec<K>, CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<(K, V)>, BoxError>> + Send,
{
    async fn fetch_many(
        &self,
        keys: Vec<K>,
        token: CancellationToken,
    ) -> Result<Vec<(K, V)>, BoxError> {
        (self.0)(keys, token).await
    }
}

/// Wrap an async closure as a single-key source
pub fn source_fn<K, V, F, Fut>(func: F) -> Source<K, V>
where
    K: Send + 'static,
    V: Send + 'static,
    F: Fn(K, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, BoxError>> + Send + 'static,
{
    Source::Single(Arc::new(FnSource(func)))
}

/// Wrap a blocking closure as a single-key source
///
/// The closure runs on the engine's fetch task, so it should be cheap.
pub fn sync_source_fn<K, V, F>(func: F) -> Source<K, V>
where
    K: Send + 'static,
    V: Send + 'static,
    F: Fn(K) -> Result<V, BoxError> + Send + Sync + 'static,
{
    Source::Single(Arc::new(SyncFnSource {
        func,
        _marker: PhantomData,
    }))
}

/// Wrap an async closure as a multi-key source
pub fn multi_source_fn<K, V, F, Fut>(func: F) -> Source<K, V>
where
    K: Send + 'static,
    V: Send + 'static,
    F: Fn(Vec<K>, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<(K, V)>, BoxError>> + Send + 'static,
{
    Source::Multi(Arc::new(MultiFnSource(func)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_closure_adapters_forward_calls() {
        let single = source_fn(|key: u32, _token| async move { Ok::<_, BoxError>(key * 2) });
        let Source::Single(single) = single else {
            panic!("expected a single-key source");
        };
        assert_eq!(single.fetch(21, CancellationToken::new()).await.unwrap(), 42);

        let multi = multi_source_fn(|keys: Vec<u32>, _token| async move {
            Ok::<_, BoxError>(keys.into_iter().map(|k| (k, k + 1)).collect())
        });
        assert!(multi.is_multi_key());
        let Source::Multi(multi) = multi else {
            panic!("expected a multi-key source");
        };
        let values = multi
            .fetch_many(vec![1, 2], CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(values, vec![(1, 2), (2, 3)]);
    }

    #[tokio::test]
    async fn test_sync_adapter_propagates_errors() {
        let source = sync_source_fn(|key: u32| {
            if key == 0 {
                Err::<u32, BoxError>("zero is not a valid id".into())
            } else {
                Ok(key)
            }
        });
        let Source::Single(source) = source else {
            panic!("expected a single-key source");
        };
        assert!(source.fetch(0, CancellationToken::new()).await.is_err());
        assert_eq!(source.fetch(5, CancellationToken::new()).await.unwrap(), 5);
    }
}
