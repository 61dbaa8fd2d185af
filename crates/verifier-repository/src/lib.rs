//! On-disk repository of downloaded or copied artifacts (plugin archives).
//!
//! Files are fetched through a [`FileProvider`], written atomically into the
//! repository directory and tracked by a weight-budgeted
//! [`ResourceCache`](verifier_cache::ResourceCache). A [`FileLock`] keeps its
//! file from being deleted; unlocked files are deleted, least recently
//! released first, while their combined size exceeds the quota.

mod error;
mod fs_util;
mod provider;
mod repository;

pub use error::{RepositoryError, Result};
pub use provider::{FetchOutcome, FileProvider, LocalCopyProvider, UrlDownloadProvider};
pub use repository::{FileLock, FileRepository, FileRepositoryResult, RepositoryKey};
