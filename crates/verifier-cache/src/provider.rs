use std::error::Error as StdError;
use std::sync::Arc;

use crate::CacheError;

/// Outcome of building a resource for a key.
pub enum ProvideResult<R> {
    Provided(R),
    /// The key names nothing; callers may retry later.
    NotFound(String),
    Failed {
        message: String,
        cause: Option<Arc<dyn StdError + Send + Sync>>,
    },
}

impl<R> ProvideResult<R> {
    pub fn failed(message: impl Into<String>, cause: impl StdError + Send + Sync + 'static) -> Self {
        ProvideResult::Failed {
            message: message.into(),
            cause: Some(Arc::new(cause)),
        }
    }

    pub(crate) fn into_result(self) -> Result<R, CacheError> {
        match self {
            ProvideResult::Provided(resource) => Ok(resource),
            ProvideResult::NotFound(message) => Err(CacheError::NotFound { message }),
            ProvideResult::Failed { message, cause } => Err(CacheError::ProviderFailed { message, cause }),
        }
    }
}

impl<R, E> From<Result<R, E>> for ProvideResult<R>
where
    E: StdError + Send + Sync + 'static,
{
    fn from(result: Result<R, E>) -> Self {
        match result {
            Ok(resource) => ProvideResult::Provided(resource),
            Err(err) => ProvideResult::failed(err.to_string(), err),
        }
    }
}

/// Builds the resource for a key. Called outside the cache lock, at most once
/// concurrently per key.
pub trait ResourceProvider<K, R>: Send + Sync {
    fn provide(&self, key: &K) -> ProvideResult<R>;
}

impl<K, R, F> ResourceProvider<K, R> for F
where
    F: Fn(&K) -> ProvideResult<R> + Send + Sync,
{
    fn provide(&self, key: &K) -> ProvideResult<R> {
        self(key)
    }
}
