use std::path::{Path, PathBuf};
use std::sync::Arc;

use verifier_cache::{CacheStats, ProvideResult, ResourceCache, ResourceHandle};
use verifier_resolver::{ide_resolver, jdk_resolver, ReadMode, Resolver};

use crate::IdeVersion;

/// Opened classes of one JDK installation.
#[derive(Debug)]
pub struct JdkDescriptor {
    pub path: PathBuf,
    pub resolver: Arc<Resolver>,
}

/// Opened classes of one IDE build.
#[derive(Debug)]
pub struct IdeDescriptor {
    pub path: PathBuf,
    /// From `build.txt`; compiled checkouts may not have one.
    pub version: Option<IdeVersion>,
    pub resolver: Arc<Resolver>,
}

pub type JdkHandle = ResourceHandle<PathBuf, JdkDescriptor>;
pub type IdeHandle = ResourceHandle<PathBuf, IdeDescriptor>;

/// Keeps recently used JDK resolvers open. A [`JdkHandle`] pins its JDK
/// until dropped.
#[derive(Clone)]
pub struct JdkDescriptorsCache {
    cache: ResourceCache<PathBuf, JdkDescriptor>,
}

impl JdkDescriptorsCache {
    pub fn new(capacity: usize, read_mode: ReadMode) -> Self {
        let provider = move |path: &PathBuf| -> ProvideResult<JdkDescriptor> {
            if !path.exists() {
                return ProvideResult::NotFound(format!("JDK not found at {}", path.display()));
            }
            match jdk_resolver(path, read_mode) {
                Ok(resolver) => ProvideResult::Provided(JdkDescriptor {
                    path: path.clone(),
                    resolver,
                }),
                Err(err) => ProvideResult::failed(format!("failed to read JDK classes of {}", path.display()), err),
            }
        };
        let cache = ResourceCache::with_capacity("jdk-descriptors", capacity, provider, |path, _| {
            tracing::debug!(target = "verifier.service", path = %path.display(), "closed JDK resolver");
        });
        Self { cache }
    }

    pub fn get(&self, path: &Path) -> verifier_cache::Result<JdkHandle> {
        self.cache.get(&path.to_path_buf())
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn close(&self) -> verifier_cache::Result<()> {
        self.cache.close()
    }
}

/// Keeps recently used IDE resolvers open, keyed by installation directory.
#[derive(Clone)]
pub struct IdeDescriptorsCache {
    cache: ResourceCache<PathBuf, IdeDescriptor>,
}

impl IdeDescriptorsCache {
    pub fn new(capacity: usize, read_mode: ReadMode) -> Self {
        let provider = move |path: &PathBuf| -> ProvideResult<IdeDescriptor> {
            if !path.is_dir() {
                return ProvideResult::NotFound(format!("IDE not found at {}", path.display()));
            }
            let version = match IdeVersion::read_build_txt(path) {
                Ok(version) => version,
                Err(err) => return ProvideResult::failed(format!("failed to read build.txt of {}", path.display()), err),
            };
            match ide_resolver(path, read_mode) {
                Ok(resolver) => ProvideResult::Provided(IdeDescriptor {
                    path: path.clone(),
                    version,
                    resolver,
                }),
                Err(err) => ProvideResult::failed(format!("failed to read IDE classes of {}", path.display()), err),
            }
        };
        let cache = ResourceCache::with_capacity("ide-descriptors", capacity, provider, |path, _| {
            tracing::debug!(target = "verifier.service", path = %path.display(), "closed IDE resolver");
        });
        Self { cache }
    }

    pub fn get(&self, path: &Path) -> verifier_cache::Result<IdeHandle> {
        self.cache.get(&path.to_path_buf())
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn close(&self) -> verifier_cache::Result<()> {
        self.cache.close()
    }
}
