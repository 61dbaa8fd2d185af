use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use verifier_config::{RepositorySource, VerifierConfig};
use verifier_repository::{FileRepository, LocalCopyProvider, UrlDownloadProvider};
use verifier_tasks::TaskManager;

use crate::{IdeDescriptorsCache, IdeHandle, IdeRepository, IdeVersion, JdkDescriptorsCache, ServiceError};

/// Owns every shared resource of a verifier process.
///
/// Built once with [`ServiceContext::start`] and handed to whatever needs the
/// caches. [`ServiceContext::shutdown`] tears everything down; tasks are
/// drained first so that no handle outlives its cache.
pub struct ServiceContext {
    config: VerifierConfig,
    tasks: TaskManager,
    jdk_descriptors: JdkDescriptorsCache,
    ide_descriptors: IdeDescriptorsCache,
    plugins: Option<Arc<FileRepository<String>>>,
    ides: Option<IdeRepository>,
    closed: AtomicBool,
}

impl ServiceContext {
    pub fn start(config: VerifierConfig) -> Result<Self, ServiceError> {
        config.validate()?;
        let read_mode = config.resolver.read_mode;

        let tasks = TaskManager::new(config.tasks.manager_config());
        let jdk_descriptors = JdkDescriptorsCache::new(config.cache.jdk_cache_size, read_mode);
        let ide_descriptors = IdeDescriptorsCache::new(config.cache.ide_cache_size, read_mode);

        let repository = &config.repository;
        let plugins = match &repository.source {
            Some(RepositorySource::Directory(dir)) => Some(FileRepository::open(
                &repository.directory,
                repository.quota.bytes(),
                LocalCopyProvider::new(dir),
            )?),
            Some(RepositorySource::Url(template)) => Some(FileRepository::open(
                &repository.directory,
                repository.quota.bytes(),
                UrlDownloadProvider::new(template.as_str()),
            )?),
            None => None,
        }
        .map(Arc::new);

        let ides = config.paths.ides_dir.as_ref().map(IdeRepository::new);

        tracing::info!(
            target = "verifier.service",
            ?read_mode,
            plugin_source = ?repository.source.as_ref().map(ToString::to_string),
            ides_dir = ?config.paths.ides_dir,
            "service context started"
        );

        Ok(Self {
            config,
            tasks,
            jdk_descriptors,
            ide_descriptors,
            plugins,
            ides,
            closed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    pub fn task_manager(&self) -> &TaskManager {
        &self.tasks
    }

    pub fn jdk_descriptors(&self) -> &JdkDescriptorsCache {
        &self.jdk_descriptors
    }

    pub fn ide_descriptors(&self) -> &IdeDescriptorsCache {
        &self.ide_descriptors
    }

    pub fn plugin_repository(&self) -> Result<&Arc<FileRepository<String>>, ServiceError> {
        self.plugins.as_ref().ok_or(ServiceError::NotConfigured("repository.source"))
    }

    pub fn ide_repository(&self) -> Result<&IdeRepository, ServiceError> {
        self.ides.as_ref().ok_or(ServiceError::NotConfigured("paths.ides_dir"))
    }

    /// Pins the descriptor of every available IDE whose build lies in
    /// `[since, until]`, oldest first. Nothing stays pinned if any of them
    /// fails to open.
    pub fn lock_ides_in_range(&self, since: &IdeVersion, until: &IdeVersion) -> Result<Vec<IdeHandle>, ServiceError> {
        let ides = self.ide_repository()?.ides_in_range(since, until)?;
        let mut handles = Vec::with_capacity(ides.len());
        for ide in ides {
            handles.push(self.ide_descriptors.get(&ide.path)?);
        }
        tracing::debug!(
            target = "verifier.service",
            %since,
            %until,
            locked = handles.len(),
            "locked IDEs in range"
        );
        Ok(handles)
    }

    /// Closes everything in reverse order of construction. Every component is
    /// closed even if an earlier one fails; the first failure is returned.
    pub fn shutdown(&self) -> Result<(), ServiceError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(ServiceError::AlreadyClosed);
        }
        tracing::info!(target = "verifier.service", "shutting down service context");

        let mut first_error: Option<ServiceError> = None;
        let mut record = |result: Result<(), ServiceError>, component: &'static str| {
            if let Err(err) = result {
                tracing::warn!(target = "verifier.service", component, error = %err, "failed to close component");
                first_error.get_or_insert(err);
            }
        };

        record(
            self.tasks.close(self.config.tasks.shutdown_timeout()).map_err(ServiceError::from),
            "tasks",
        );
        if let Some(plugins) = &self.plugins {
            record(plugins.close().map_err(ServiceError::from), "plugin repository");
        }
        record(self.ide_descriptors.close().map_err(ServiceError::from), "IDE descriptors");
        record(self.jdk_descriptors.close().map_err(ServiceError::from), "JDK descriptors");

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
