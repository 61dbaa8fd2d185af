//! Explicitly constructed service context tying the verifier's shared
//! resources together: the task manager, the JDK and IDE descriptor caches,
//! the plugin file repository and the directory of available IDE builds.

mod context;
mod descriptors;
mod error;
mod ide_repository;
mod ide_version;
mod plugin_classes;

pub use context::ServiceContext;
pub use descriptors::{IdeDescriptor, IdeDescriptorsCache, IdeHandle, JdkDescriptor, JdkDescriptorsCache, JdkHandle};
pub use error::ServiceError;
pub use ide_repository::{AvailableIde, IdeRepository};
pub use ide_version::{IdeVersion, ParseIdeVersionError};
pub use plugin_classes::{ParentLocation, PluginClassesReport, PluginClassesTask};
