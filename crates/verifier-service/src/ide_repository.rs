use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::{IdeVersion, ServiceError};

/// An IDE build found on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailableIde {
    pub version: IdeVersion,
    pub path: PathBuf,
}

/// IDE builds unpacked as subdirectories of one directory, each identified by
/// its `build.txt`.
#[derive(Debug, Clone)]
pub struct IdeRepository {
    root: PathBuf,
}

impl IdeRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Scans the directory, oldest build first. Subdirectories without a
    /// readable build number are skipped.
    pub fn available_ides(&self) -> Result<Vec<AvailableIde>, ServiceError> {
        let io_error = |source| ServiceError::Io {
            path: self.root.clone(),
            source,
        };
        let mut ides = Vec::new();
        for entry in std::fs::read_dir(&self.root).map_err(io_error)? {
            let path = entry.map_err(io_error)?.path();
            if !path.is_dir() {
                continue;
            }
            match IdeVersion::read_build_txt(&path) {
                Ok(Some(version)) => ides.push(AvailableIde { version, path }),
                Ok(None) => {
                    tracing::debug!(target = "verifier.service", path = %path.display(), "skipping directory without build number");
                }
                Err(err) => {
                    tracing::warn!(target = "verifier.service", path = %path.display(), error = %err, "failed to read build.txt");
                }
            }
        }
        ides.sort_by(|a, b| a.version.cmp(&b.version).then_with(|| a.path.cmp(&b.path)));
        Ok(ides)
    }

    pub fn find(&self, version: &IdeVersion) -> Result<Option<AvailableIde>, ServiceError> {
        Ok(self.available_ides()?.into_iter().find(|ide| &ide.version == version))
    }

    /// Builds in `[since, until]`, compared by build number only.
    pub fn ides_in_range(&self, since: &IdeVersion, until: &IdeVersion) -> Result<Vec<AvailableIde>, ServiceError> {
        let mut ides = self.available_ides()?;
        ides.retain(|ide| ide.version.is_in_range(since, until));
        Ok(ides)
    }
}
