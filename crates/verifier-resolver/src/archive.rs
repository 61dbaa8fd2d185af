use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use verifier_classfile::ClassFile;
use zip::ZipArchive;

use crate::{add_packages, is_ignored_class, ReadMode, ResolverError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArchiveKind {
    Jar,
    /// JDK module archive; class files live under `classes/`.
    Jmod,
}

impl ArchiveKind {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("jmod") => ArchiveKind::Jmod,
            _ => ArchiveKind::Jar,
        }
    }

    /// Maps an archive entry name to the internal class name it holds.
    fn class_name<'a>(self, entry: &'a str) -> Option<&'a str> {
        let name = entry.strip_suffix(".class")?;
        match self {
            ArchiveKind::Jar if name.starts_with("META-INF/") => None,
            ArchiveKind::Jar => Some(name),
            ArchiveKind::Jmod => name.strip_prefix("classes/"),
        }
    }
}

enum Contents {
    Parsed(HashMap<String, Arc<ClassFile>>),
    /// Internal name -> entry name, read on demand.
    Indexed {
        archive: Mutex<ZipArchive<File>>,
        entries: HashMap<String, String>,
    },
}

/// Resolver over a single jar or jmod.
pub struct ArchiveResolver {
    path: PathBuf,
    kind: ArchiveKind,
    contents: Contents,
    names: BTreeSet<String>,
    packages: BTreeSet<String>,
}

impl std::fmt::Debug for ArchiveResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveResolver")
            .field("path", &self.path)
            .field("kind", &self.kind)
            .field("classes", &self.names.len())
            .finish()
    }
}

impl ArchiveResolver {
    pub fn open(path: impl Into<PathBuf>, read_mode: ReadMode) -> Result<Self, ResolverError> {
        let path = path.into();
        let kind = ArchiveKind::from_path(&path);
        let mut archive = ZipArchive::new(File::open(&path)?)?;

        let mut names = BTreeSet::new();
        let mut packages = BTreeSet::new();
        let mut parsed = HashMap::new();
        let mut entries = HashMap::new();

        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if !file.is_file() {
                continue;
            }
            let entry_name = file.name().to_owned();
            let Some(class_name) = kind.class_name(&entry_name) else {
                continue;
            };
            if is_ignored_class(class_name) {
                continue;
            }
            // First entry wins when an archive holds duplicates.
            if names.contains(class_name) {
                continue;
            }

            match read_mode {
                ReadMode::Full => {
                    let mut bytes = Vec::with_capacity(file.size() as usize);
                    file.read_to_end(&mut bytes)?;
                    let class = ClassFile::parse(&bytes).map_err(|err| {
                        ResolverError::class_file(format!("{}!/{entry_name}", path.display()), err)
                    })?;
                    parsed.insert(class_name.to_string(), Arc::new(class));
                }
                ReadMode::Lazy => {
                    entries.insert(class_name.to_string(), entry_name.clone());
                }
            }
            add_packages(&mut packages, class_name);
            names.insert(class_name.to_string());
        }

        tracing::debug!(
            target = "verifier.resolver",
            path = %path.display(),
            ?kind,
            ?read_mode,
            classes = names.len(),
            "indexed archive"
        );

        let contents = match read_mode {
            ReadMode::Full => Contents::Parsed(parsed),
            ReadMode::Lazy => Contents::Indexed {
                archive: Mutex::new(archive),
                entries,
            },
        };

        Ok(Self {
            path,
            kind,
            contents,
            names,
            packages,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> ArchiveKind {
        self.kind
    }

    pub fn find_class(&self, name: &str) -> Result<Option<Arc<ClassFile>>, ResolverError> {
        match &self.contents {
            Contents::Parsed(classes) => Ok(classes.get(name).cloned()),
            Contents::Indexed { archive, entries } => {
                let Some(entry_name) = entries.get(name) else {
                    return Ok(None);
                };
                let bytes = {
                    let mut archive = archive.lock();
                    let mut file = archive.by_name(entry_name)?;
                    let mut bytes = Vec::with_capacity(file.size() as usize);
                    file.read_to_end(&mut bytes)?;
                    bytes
                };
                let class = ClassFile::parse(&bytes).map_err(|err| {
                    ResolverError::class_file(format!("{}!/{entry_name}", self.path.display()), err)
                })?;
                Ok(Some(Arc::new(class)))
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
