use std::error::Error as StdError;
use std::sync::Arc;

pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors surfaced by [`ResourceCache::get`](crate::ResourceCache::get) and
/// cache lifecycle calls.
///
/// Cloneable so a failed build can be reported to every caller waiting on it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    #[error("resource not found: {message}")]
    NotFound { message: String },

    #[error("failed to provide resource: {message}")]
    ProviderFailed {
        message: String,
        cause: Option<Arc<dyn StdError + Send + Sync>>,
    },

    #[error("cache `{name}` is closed")]
    Closed { name: String },

    #[error("cache `{name}` is already closed")]
    AlreadyClosed { name: String },
}

impl CacheError {
    /// Underlying error reported by the provider, if any.
    pub fn cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        match self {
            CacheError::ProviderFailed { cause, .. } => cause.as_deref(),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound { .. })
    }
}
