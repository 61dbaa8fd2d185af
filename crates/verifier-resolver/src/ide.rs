use std::path::Path;
use std::sync::Arc;

use crate::{collect_jars, jars_resolver, ReadMode, Resolver, ResolverError};

/// How an IDE installation on disk is organised.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdeLayout {
    /// Unpacked distribution: `build.txt` plus `lib/*.jar`.
    Distribution,
    /// Community checkout compiled into `out/classes/production/<module>`.
    CompiledCommunity,
    /// Ultimate checkout; like community, with the community sources under `community/`.
    CompiledUltimate,
}

impl IdeLayout {
    pub fn detect(path: &Path) -> Option<Self> {
        let compiled = path.join(".idea").is_dir() && compiled_classes_root(path).is_dir();
        if compiled && path.join("community").join(".idea").is_dir() {
            Some(IdeLayout::CompiledUltimate)
        } else if compiled {
            Some(IdeLayout::CompiledCommunity)
        } else if path.join("build.txt").is_file() && path.join("lib").is_dir() {
            Some(IdeLayout::Distribution)
        } else {
            None
        }
    }
}

fn compiled_classes_root(path: &Path) -> std::path::PathBuf {
    path.join("out").join("classes").join("production")
}

/// Resolver over all classes an IDE build ships.
///
/// Compiled checkouts search `lib/` jars first, then each compiled module in
/// name order, then `community/lib` jars.
pub fn ide_resolver(path: &Path, read_mode: ReadMode) -> Result<Arc<Resolver>, ResolverError> {
    let layout = IdeLayout::detect(path).ok_or_else(|| ResolverError::InvalidIde {
        path: path.to_path_buf(),
        reason: "neither a distribution nor a compiled checkout".to_string(),
    })?;
    tracing::debug!(target = "verifier.resolver", path = %path.display(), ?layout, "building IDE resolver");

    match layout {
        IdeLayout::Distribution => lib_resolver(&path.join("lib"), read_mode),
        IdeLayout::CompiledCommunity | IdeLayout::CompiledUltimate => {
            let mut resolvers = vec![lib_resolver(&path.join("lib"), read_mode)?];

            let mut module_roots = std::fs::read_dir(compiled_classes_root(path))?
                .map(|entry| entry.map(|e| e.path()))
                .collect::<Result<Vec<_>, _>>()?;
            module_roots.retain(|root| root.is_dir());
            module_roots.sort();
            for root in module_roots {
                resolvers.push(Resolver::class_files(root, read_mode)?);
            }

            if layout == IdeLayout::CompiledUltimate {
                resolvers.push(lib_resolver(&path.join("community").join("lib"), read_mode)?);
            }
            Ok(Resolver::union(resolvers))
        }
    }
}

fn lib_resolver(dir: &Path, read_mode: ReadMode) -> Result<Arc<Resolver>, ResolverError> {
    if !dir.is_dir() {
        return Ok(Arc::new(Resolver::Empty));
    }
    jars_resolver(&collect_jars(dir, false)?, read_mode)
}
