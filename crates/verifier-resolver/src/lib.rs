//! Class resolution over jars, jmods, class directories and compositions of them.
//!
//! Every source is a [`Resolver`]. Composition goes through
//! [`Resolver::union`] (ordered, first match wins) and [`Resolver::cached`]
//! (memoizes lookups and the derived name sets).

mod archive;
mod cache;
mod class_files;
mod error;
mod fixed;
mod ide;
mod jdk;
mod resolver;
mod union;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

pub use crate::archive::{ArchiveKind, ArchiveResolver};
pub use crate::cache::CacheResolver;
pub use crate::class_files::ClassFilesResolver;
pub use crate::error::ResolverError;
pub use crate::fixed::FixedClassesResolver;
pub use crate::ide::{ide_resolver, IdeLayout};
pub use crate::jdk::jdk_resolver;
pub use crate::resolver::{collect_jars, jars_resolver, Resolver};
pub use crate::union::UnionResolver;

pub use verifier_classfile::ClassFile;

/// How directory and archive resolvers read their class files.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadMode {
    /// Parse every class file when the resolver is opened.
    #[default]
    Full,
    /// Index names only; parse a class file each time it is looked up.
    Lazy,
}

/// Records the package of `internal_name` and all of its parent packages.
/// Classes in the default package contribute `""`.
pub(crate) fn add_packages(packages: &mut BTreeSet<String>, internal_name: &str) {
    let package = verifier_classfile::package_of(internal_name);
    if package.is_empty() {
        packages.insert(String::new());
        return;
    }
    for (idx, ch) in package.char_indices() {
        if ch == '/' {
            packages.insert(package[..idx].to_string());
        }
    }
    packages.insert(package.to_string());
}

pub(crate) fn is_ignored_class(internal_name: &str) -> bool {
    internal_name == "module-info"
        || internal_name == "package-info"
        || internal_name.ends_with("/package-info")
}
