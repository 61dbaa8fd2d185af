use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use verifier_cache::{CacheBudget, CacheError, CacheStats, ProvideResult, ResourceCache, ResourceHandle};

use crate::fs_util::{is_tmp_file, remove_file_best_effort, remove_stale_tmp_files};
use crate::{FetchOutcome, FileProvider, RepositoryError, Result};

/// Identity of an artifact stored in a [`FileRepository`].
pub trait RepositoryKey: Clone + Eq + Hash + Debug + Send + Sync + 'static {
    /// Name of the file inside the repository directory.
    fn file_name(&self) -> String;

    /// Inverse of [`file_name`](Self::file_name), used to adopt files already
    /// present when the repository opens.
    fn from_file_name(name: &str) -> Option<Self>;
}

impl RepositoryKey for String {
    fn file_name(&self) -> String {
        self.clone()
    }

    fn from_file_name(name: &str) -> Option<Self> {
        Some(name.to_string())
    }
}

#[derive(Debug)]
pub struct FileInfo {
    path: PathBuf,
    size: u64,
    /// Distinguishes a re-fetched file from the one it replaced at the same path.
    generation: u64,
}

/// Generation of the entry that owns each repository path.
///
/// Claiming a path and deleting its file happen under the same lock, so an
/// evicted entry never deletes a file a newer entry has already claimed.
#[derive(Default)]
struct LiveFiles {
    next_generation: AtomicU64,
    owners: Mutex<HashMap<PathBuf, u64>>,
    #[cfg(test)]
    before_delete: Mutex<Option<Arc<dyn Fn(&Path) + Send + Sync>>>,
}

impl LiveFiles {
    /// Makes a new generation the owner of `path`. Also reports whether a
    /// file is already there, checked while the claim is held.
    fn claim(&self, path: &Path) -> (u64, bool) {
        let mut owners = self.owners.lock();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        owners.insert(path.to_path_buf(), generation);
        (generation, path.is_file())
    }

    fn abandon(&self, path: &Path, generation: u64) {
        let mut owners = self.owners.lock();
        if owners.get(path) == Some(&generation) {
            owners.remove(path);
        }
    }

    /// Deletes the file at `path` if `generation` still owns it.
    fn delete(&self, path: &Path, generation: u64) -> bool {
        let mut owners = self.owners.lock();
        if owners.get(path) != Some(&generation) {
            return false;
        }
        owners.remove(path);
        #[cfg(test)]
        self.run_before_delete(path);
        remove_file_best_effort(path, "evicted")
    }

    #[cfg(test)]
    fn run_before_delete(&self, path: &Path) {
        let hook = self.before_delete.lock().clone();
        if let Some(hook) = hook {
            hook(path);
        }
    }
}

/// Outcome of [`FileRepository::download_or_copy`].
#[derive(Debug)]
pub enum FileRepositoryResult<K: RepositoryKey> {
    Found(FileLock<K>),
    NotFound(String),
    Failed {
        message: String,
        error: Option<CacheError>,
    },
}

impl<K: RepositoryKey> FileRepositoryResult<K> {
    pub fn into_lock(self) -> Option<FileLock<K>> {
        match self {
            FileRepositoryResult::Found(lock) => Some(lock),
            _ => None,
        }
    }
}

/// Keeps a repository file on disk until released or dropped.
#[derive(Debug)]
pub struct FileLock<K: RepositoryKey> {
    handle: ResourceHandle<K, FileInfo>,
}

impl<K: RepositoryKey> FileLock<K> {
    pub fn key(&self) -> &K {
        self.handle.key()
    }

    pub fn path(&self) -> &Path {
        &self.handle.path
    }

    pub fn size(&self) -> u64 {
        self.handle.size
    }

    pub fn release(self) {
        self.handle.release();
    }
}

/// Disk-quota bounded store of fetched files.
pub struct FileRepository<K: RepositoryKey> {
    directory: PathBuf,
    cache: ResourceCache<K, FileInfo>,
    closing: Arc<AtomicBool>,
    #[cfg(test)]
    live: Arc<LiveFiles>,
}

impl<K: RepositoryKey> FileRepository<K> {
    /// Opens (creating if needed) a repository in `directory`.
    ///
    /// Leftover temp files are deleted. Files already in the directory whose
    /// names map back to a key are adopted as unlocked entries, so they count
    /// against `quota` and are evicted first.
    pub fn open(directory: impl Into<PathBuf>, quota: u64, provider: impl FileProvider + 'static) -> Result<Self> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory)?;
        let stale = remove_stale_tmp_files(&directory)?;

        let provider: Arc<dyn FileProvider> = Arc::new(provider);
        let live = Arc::new(LiveFiles::default());

        let build_dir = directory.clone();
        let build_live = Arc::clone(&live);
        let build = move |key: &K| -> ProvideResult<FileInfo> {
            let path = build_dir.join(key.file_name());
            let (generation, present) = build_live.claim(&path);
            if !present {
                match provider.fetch(&key.file_name(), &path) {
                    Ok(FetchOutcome::Fetched) => {}
                    Ok(FetchOutcome::NotFound(message)) => {
                        build_live.abandon(&path, generation);
                        return ProvideResult::NotFound(message);
                    }
                    Err(err) => {
                        build_live.abandon(&path, generation);
                        return ProvideResult::failed(format!("failed to fetch {key:?}"), err);
                    }
                }
            }
            match std::fs::metadata(&path) {
                Ok(meta) => ProvideResult::Provided(FileInfo {
                    path,
                    size: meta.len(),
                    generation,
                }),
                Err(err) => {
                    build_live.abandon(&path, generation);
                    ProvideResult::failed(format!("fetched file for {key:?} is unreadable"), err)
                }
            }
        };

        let closing = Arc::new(AtomicBool::new(false));
        let dispose_closing = Arc::clone(&closing);
        let dispose_live = Arc::clone(&live);
        let cache = ResourceCache::builder(format!("files:{}", directory.display()), build)
            .budget(CacheBudget::Weight(quota))
            .weigher(|_, info: &FileInfo| info.size)
            .disposer(move |key, info: &FileInfo| {
                if dispose_closing.load(Ordering::Acquire) {
                    return;
                }
                if dispose_live.delete(&info.path, info.generation) {
                    tracing::debug!(
                        target = "verifier.repository",
                        ?key,
                        path = %info.path.display(),
                        size = info.size,
                        "deleted file"
                    );
                }
            })
            .build();

        let repository = Self {
            directory,
            cache,
            closing,
            #[cfg(test)]
            live,
        };
        let adopted = repository.adopt_existing_files()?;
        tracing::info!(
            target = "verifier.repository",
            directory = %repository.directory.display(),
            quota,
            adopted,
            stale_tmp_removed = stale,
            "opened file repository"
        );
        Ok(repository)
    }

    fn adopt_existing_files(&self) -> Result<usize> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.directory)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str().filter(|name| !is_tmp_file(name)) {
                names.push(name.to_string());
            }
        }
        // Sorted so adoption (and thus eviction order among adopted files) is deterministic.
        names.sort();

        let mut adopted = 0;
        for name in names {
            let Some(key) = K::from_file_name(&name) else {
                continue;
            };
            if key.file_name() != name {
                continue;
            }
            match self.cache.get(&key) {
                Ok(handle) => {
                    handle.release();
                    adopted += 1;
                }
                Err(err) => {
                    tracing::warn!(target = "verifier.repository", file = %name, error = %err, "failed to adopt existing file");
                }
            }
        }
        Ok(adopted)
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Locks the file for `key`, fetching it first if it is not on disk.
    ///
    /// A cached file that vanished from disk is fetched again.
    pub fn download_or_copy(&self, key: &K) -> FileRepositoryResult<K> {
        match self.lock(key) {
            Ok(lock) if lock.path().is_file() => FileRepositoryResult::Found(lock),
            Ok(lock) => {
                tracing::warn!(
                    target = "verifier.repository",
                    ?key,
                    path = %lock.path().display(),
                    "cached file vanished; fetching again"
                );
                drop(lock);
                self.cache.invalidate(key);
                match self.lock(key) {
                    Ok(lock) => FileRepositoryResult::Found(lock),
                    Err(err) => Self::failure(err),
                }
            }
            Err(err) => Self::failure(err),
        }
    }

    fn lock(&self, key: &K) -> std::result::Result<FileLock<K>, CacheError> {
        self.cache.get(key).map(|handle| FileLock { handle })
    }

    fn failure(err: CacheError) -> FileRepositoryResult<K> {
        match err {
            CacheError::NotFound { message } => FileRepositoryResult::NotFound(message),
            other => FileRepositoryResult::Failed {
                message: other.to_string(),
                error: Some(other),
            },
        }
    }

    /// Deletes the file for `key` once no lock on it remains.
    pub fn remove(&self, key: &K) -> bool {
        self.cache.invalidate(key)
    }

    pub fn has(&self, key: &K) -> bool {
        self.cache.contains(key)
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Stops serving locks. Files stay on disk for the next session.
    pub fn close(&self) -> Result<()> {
        self.closing.store(true, Ordering::Release);
        self.cache.close().map_err(RepositoryError::from)
    }
}
