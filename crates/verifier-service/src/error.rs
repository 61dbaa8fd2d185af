use std::path::PathBuf;

use verifier_cache::CacheError;
use verifier_config::ConfigError;
use verifier_repository::RepositoryError;
use verifier_resolver::ResolverError;
use verifier_tasks::TaskManagerError;

use crate::ParseIdeVersionError;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Resolver(#[from] ResolverError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Tasks(#[from] TaskManagerError),

    #[error(transparent)]
    IdeVersion(#[from] ParseIdeVersionError),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The operation needs a config value that was left unset.
    #[error("`{0}` is not configured")]
    NotConfigured(&'static str),

    #[error("service context is already shut down")]
    AlreadyClosed,
}
