pub type Result<T> = std::result::Result<T, RepositoryError>;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http fetch failed: {message}")]
    Http { message: String },

    #[error("invalid file name `{name}`")]
    InvalidFileName { name: String },

    #[error(transparent)]
    Cache(#[from] verifier_cache::CacheError),
}
