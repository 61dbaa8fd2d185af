use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use verifier_repository::{FileRepository, FileRepositoryResult};
use verifier_resolver::{ReadMode, Resolver};
use verifier_tasks::{Task, TaskContext, TaskError, TaskType};

use crate::{IdeDescriptorsCache, JdkDescriptorsCache, ServiceContext, ServiceError};

/// Where the direct super type of a plugin class resolves from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParentLocation {
    pub class: String,
    pub parent: String,
    /// The resolver that supplied the parent, or `None` when no source has it.
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginClassesReport {
    pub plugin: String,
    pub classes: usize,
    pub packages: Vec<String>,
    pub parents: Vec<ParentLocation>,
}

impl PluginClassesReport {
    pub fn unresolved_parents(&self) -> impl Iterator<Item = &ParentLocation> {
        self.parents.iter().filter(|parent| parent.location.is_none())
    }
}

/// Resolves every class of a plugin archive against an IDE build and a JDK.
///
/// Pins the plugin file, the IDE descriptor and the JDK descriptor for the
/// duration of the run and checks for cancellation between classes.
pub struct PluginClassesTask {
    plugin: String,
    ide: PathBuf,
    jdk: PathBuf,
    read_mode: ReadMode,
    plugins: Arc<FileRepository<String>>,
    ide_descriptors: IdeDescriptorsCache,
    jdk_descriptors: JdkDescriptorsCache,
}

impl PluginClassesTask {
    pub const TASK_TYPE: TaskType = TaskType::new("plugin-classes");

    pub fn new(
        context: &ServiceContext,
        plugin: impl Into<String>,
        ide: impl Into<PathBuf>,
        jdk: impl Into<PathBuf>,
    ) -> Result<Self, ServiceError> {
        Ok(Self {
            plugin: plugin.into(),
            ide: ide.into(),
            jdk: jdk.into(),
            read_mode: context.config().resolver.read_mode,
            plugins: Arc::clone(context.plugin_repository()?),
            ide_descriptors: context.ide_descriptors().clone(),
            jdk_descriptors: context.jdk_descriptors().clone(),
        })
    }
}

impl Task for PluginClassesTask {
    type Output = PluginClassesReport;

    fn task_type(&self) -> TaskType {
        Self::TASK_TYPE
    }

    fn presentable_name(&self) -> String {
        format!("classes of {} against {}", self.plugin, self.ide.display())
    }

    fn execute(self, ctx: &TaskContext) -> Result<PluginClassesReport, TaskError> {
        ctx.report(0.0, "locking plugin file");
        let plugin_file = match self.plugins.download_or_copy(&self.plugin) {
            FileRepositoryResult::Found(lock) => lock,
            FileRepositoryResult::NotFound(message) => {
                return Err(TaskError::failed(format!("plugin {} is not available: {message}", self.plugin)))
            }
            FileRepositoryResult::Failed { message, .. } => return Err(TaskError::failed(message)),
        };
        ctx.check_cancelled()?;

        ctx.set_text("opening IDE");
        let ide = self.ide_descriptors.get(&self.ide).map_err(TaskError::failed)?;
        ctx.check_cancelled()?;

        ctx.set_text("opening JDK");
        let jdk = self.jdk_descriptors.get(&self.jdk).map_err(TaskError::failed)?;
        ctx.check_cancelled()?;

        let plugin_classes = Resolver::archive(plugin_file.path(), self.read_mode).map_err(TaskError::failed)?;
        let classpath = Resolver::union([
            Arc::clone(&plugin_classes),
            Arc::clone(&ide.resolver),
            Arc::clone(&jdk.resolver),
        ]);

        let total = plugin_classes.all_classes().len();
        let mut parents = Vec::new();
        for (idx, name) in plugin_classes.all_classes().iter().enumerate() {
            ctx.check_cancelled()?;
            let Some(class) = plugin_classes.find_class(name).map_err(TaskError::failed)? else {
                continue;
            };
            if let Some(parent) = &class.super_class {
                parents.push(ParentLocation {
                    class: name.clone(),
                    parent: parent.clone(),
                    location: classpath.location_of(parent).map(ToString::to_string),
                });
            }
            ctx.report((idx + 1) as f64 / total as f64, format!("resolved {name}"));
        }

        let report = PluginClassesReport {
            plugin: self.plugin.clone(),
            classes: total,
            packages: plugin_classes.all_packages().iter().cloned().collect(),
            parents,
        };
        tracing::info!(
            target = "verifier.service",
            plugin = %self.plugin,
            ide = %self.ide.display(),
            classes = report.classes,
            unresolved = report.unresolved_parents().count(),
            "resolved plugin classes"
        );
        Ok(report)
    }
}
