use std::collections::{BTreeSet, HashMap};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use verifier_classfile::ClassFile;

use crate::{add_packages, is_ignored_class, ReadMode, ResolverError};

/// Resolver over a directory tree of `.class` files laid out by package.
#[derive(Debug)]
pub struct ClassFilesResolver {
    root: PathBuf,
    read_mode: ReadMode,
    /// Populated in [`ReadMode::Full`] only.
    parsed: HashMap<String, Arc<ClassFile>>,
    names: BTreeSet<String>,
    packages: BTreeSet<String>,
}

impl ClassFilesResolver {
    pub fn open(root: impl Into<PathBuf>, read_mode: ReadMode) -> Result<Self, ResolverError> {
        let root = root.into();
        let mut parsed = HashMap::new();
        let mut names = BTreeSet::new();
        let mut packages = BTreeSet::new();

        for entry in walkdir::WalkDir::new(&root)
            .follow_links(false)
            .sort_by_file_name()
        {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() || entry.path().extension() != Some(OsStr::new("class")) {
                continue;
            }

            let name = match read_mode {
                ReadMode::Full => {
                    let class = read_class(entry.path())?;
                    // First file in walk order wins when several declare the same class.
                    if names.contains(&class.this_class) {
                        continue;
                    }
                    let name = class.this_class.clone();
                    parsed.insert(name.clone(), Arc::new(class));
                    name
                }
                ReadMode::Lazy => match internal_name(&root, entry.path()) {
                    Some(name) => name,
                    None => continue,
                },
            };
            if is_ignored_class(&name) {
                parsed.remove(&name);
                continue;
            }
            add_packages(&mut packages, &name);
            names.insert(name);
        }

        tracing::debug!(
            target = "verifier.resolver",
            root = %root.display(),
            classes = names.len(),
            ?read_mode,
            "indexed class directory"
        );

        Ok(Self {
            root,
            read_mode,
            parsed,
            names,
            packages,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn find_class(&self, name: &str) -> Result<Option<Arc<ClassFile>>, ResolverError> {
        match self.read_mode {
            ReadMode::Full => Ok(self.parsed.get(name).cloned()),
            ReadMode::Lazy => {
                if !self.names.contains(name) {
                    return Ok(None);
                }
                let path = self.root.join(format!("{name}.class"));
                read_class(&path).map(|class| Some(Arc::new(class)))
            }
        }
    }

    pub fn all_classes(&self) -> &BTreeSet<String> {
        &self.names
    }

    pub fn all_packages(&self) -> &BTreeSet<String> {
        &self.packages
    }
}

fn read_class(path: &Path) -> Result<ClassFile, ResolverError> {
    let bytes = std::fs::read(path)?;
    ClassFile::parse(&bytes).map_err(|err| ResolverError::class_file(path.display().to_string(), err))
}

/// `root/a/b/C.class` -> `a/b/C`.
fn internal_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?.with_extension("");
    let parts: Vec<&str> = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<_>>()?;
    Some(parts.join("/"))
}
