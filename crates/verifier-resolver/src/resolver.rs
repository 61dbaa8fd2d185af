use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use verifier_classfile::ClassFile;

use crate::{
    ArchiveResolver, CacheResolver, ClassFilesResolver, FixedClassesResolver, ReadMode, ResolverError,
    UnionResolver,
};

static NO_NAMES: BTreeSet<String> = BTreeSet::new();

/// A queryable view over a set of class files.
///
/// Looking up an absent class is `Ok(None)`; errors are reserved for sources
/// that turn out to be unreadable.
#[derive(Debug)]
pub enum Resolver {
    Empty,
    Fixed(FixedClassesResolver),
    ClassFiles(ClassFilesResolver),
    Archive(ArchiveResolver),
    Cache(CacheResolver),
    Union(UnionResolver),
}

impl Resolver {
    /// Ordered composition: earlier resolvers shadow later ones.
    ///
    /// Nested unions are flattened and empty members dropped; no members yields
    /// [`Resolver::Empty`] and a single member is returned as-is.
    pub fn union(resolvers: impl IntoIterator<Item = Arc<Resolver>>) -> Arc<Resolver> {
        let mut flat = Vec::new();
        for resolver in resolvers {
            match &*resolver {
                Resolver::Empty => {}
                Resolver::Union(union) => flat.extend(union.members().iter().cloned()),
                _ => flat.push(resolver),
            }
        }
        if flat.len() <= 1 {
            return flat.pop().unwrap_or_else(|| Arc::new(Resolver::Empty));
        }
        Arc::new(Resolver::Union(UnionResolver::new(flat)))
    }

    pub fn cached(inner: Arc<Resolver>) -> Arc<Resolver> {
        Arc::new(Resolver::Cache(CacheResolver::new(inner)))
    }

    pub fn fixed(classes: impl IntoIterator<Item = ClassFile>) -> Arc<Resolver> {
        Arc::new(Resolver::Fixed(FixedClassesResolver::new(classes)))
    }

    pub fn class_files(root: impl Into<PathBuf>, read_mode: ReadMode) -> Result<Arc<Resolver>, ResolverError> {
        Ok(Arc::new(Resolver::ClassFiles(ClassFilesResolver::open(root, read_mode)?)))
    }

    pub fn archive(path: impl Into<PathBuf>, read_mode: ReadMode) -> Result<Arc<Resolver>, ResolverError> {
        Ok(Arc::new(Resolver::Archive(ArchiveResolver::open(path, read_mode)?)))
    }

    pub fn find_class(&self, name: &str) -> Result<Option<Arc<ClassFile>>, ResolverError> {
        match self {
            Resolver::Empty => Ok(None),
            Resolver::Fixed(r) => Ok(r.find_class(name)),
            Resolver::ClassFiles(r) => r.find_class(name),
            Resolver::Archive(r) => r.find_class(name),
            Resolver::Cache(r) => r.find_class(name),
            Resolver::Union(r) => r.find_class(name),
        }
    }

    pub fn all_classes(&self) -> &BTreeSet<String> {
        match self {
            Resolver::Empty => &NO_NAMES,
            Resolver::Fixed(r) => r.all_classes(),
            Resolver::ClassFiles(r) => r.all_classes(),
            Resolver::Archive(r) => r.all_classes(),
            Resolver::Cache(r) => r.all_classes(),
            Resolver::Union(r) => r.all_classes(),
        }
    }

    pub fn all_packages(&self) -> &BTreeSet<String> {
        match self {
            Resolver::Empty => &NO_NAMES,
            Resolver::Fixed(r) => r.all_packages(),
            Resolver::ClassFiles(r) => r.all_packages(),
            Resolver::Archive(r) => r.all_packages(),
            Resolver::Cache(r) => r.all_packages(),
            Resolver::Union(r) => r.all_packages(),
        }
    }

    pub fn contains_class(&self, name: &str) -> bool {
        match self {
            Resolver::Union(r) => r.contains_class(name),
            Resolver::Cache(r) => r.contains_class(name),
            _ => self.all_classes().contains(name),
        }
    }

    pub fn contains_package(&self, package: &str) -> bool {
        match self {
            Resolver::Union(r) => r.contains_package(package),
            _ => self.all_packages().contains(package),
        }
    }

    /// The leaf resolver that supplies `name`, descending through caches and unions.
    pub fn location_of(&self, name: &str) -> Option<&Resolver> {
        match self {
            Resolver::Empty => None,
            Resolver::Cache(r) => r.inner().location_of(name),
            Resolver::Union(r) => r.location_of(name),
            _ if self.contains_class(name) => Some(self),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Resolver::Empty)
    }
}

impl fmt::Display for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolver::Empty => f.write_str("empty resolver"),
            Resolver::Fixed(r) => write!(f, "{} in-memory classes", r.all_classes().len()),
            Resolver::ClassFiles(r) => write!(f, "class files in {}", r.root().display()),
            Resolver::Archive(r) => match r.kind() {
                crate::ArchiveKind::Jar => write!(f, "jar {}", r.path().display()),
                crate::ArchiveKind::Jmod => write!(f, "jmod {}", r.path().display()),
            },
            Resolver::Cache(r) => write!(f, "cached {}", r.inner()),
            Resolver::Union(r) => write!(f, "union of {} resolvers", r.members().len()),
        }
    }
}

/// Jars and jmods under `dir`, sorted by path.
pub fn collect_jars(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>, ResolverError> {
    let mut walker = walkdir::WalkDir::new(dir).follow_links(true).min_depth(1);
    if !recursive {
        walker = walker.max_depth(1);
    }
    let mut jars = Vec::new();
    for entry in walker {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let is_archive = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("jar") || ext.eq_ignore_ascii_case("jmod"));
        if is_archive {
            jars.push(entry.into_path());
        }
    }
    jars.sort();
    Ok(jars)
}

/// Union of one archive resolver per path, in the given order.
pub fn jars_resolver(jars: &[PathBuf], read_mode: ReadMode) -> Result<Arc<Resolver>, ResolverError> {
    let resolvers = jars
        .iter()
        .map(|jar| Resolver::archive(jar.clone(), read_mode))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Resolver::union(resolvers))
}
