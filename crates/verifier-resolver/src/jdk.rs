use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::{collect_jars, jars_resolver, ReadMode, Resolver, ResolverError};

/// Resolver over the platform classes of a JDK installation.
///
/// Modular JDKs are read from `jmods/*.jmod`; older ones from the jars under
/// `jre/lib` (or `lib` for a bare JRE).
pub fn jdk_resolver(path: &Path, read_mode: ReadMode) -> Result<Arc<Resolver>, ResolverError> {
    let jars = platform_archives(path)?;
    if jars.is_empty() {
        return Err(ResolverError::InvalidJdk {
            path: path.to_path_buf(),
            reason: "no `jmods/` directory and no jars under `jre/lib` or `lib`".to_string(),
        });
    }
    tracing::debug!(
        target = "verifier.resolver",
        path = %path.display(),
        archives = jars.len(),
        "building JDK resolver"
    );
    jars_resolver(&jars, read_mode)
}

fn platform_archives(path: &Path) -> Result<Vec<PathBuf>, ResolverError> {
    let jmods = path.join("jmods");
    if jmods.is_dir() {
        return collect_jars(&jmods, false);
    }
    for lib in [path.join("jre").join("lib"), path.join("lib")] {
        if lib.is_dir() {
            let jars = collect_jars(&lib, true)?;
            if !jars.is_empty() {
                return Ok(jars);
            }
        }
    }
    Ok(Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use verifier_test_utils::{write_jmod_jdk, JarBuilder};

    #[test]
    fn modular_jdk_reads_jmods() {
        let tmp = tempfile::tempdir().unwrap();
        write_jmod_jdk(
            tmp.path(),
            &[("java.base", &["java/lang/Object", "java/lang/String"]), ("java.sql", &["java/sql/Driver"])],
        );

        let resolver = jdk_resolver(tmp.path(), ReadMode::Full).unwrap();
        assert_eq!(resolver.all_classes().len(), 3);
        assert!(resolver.contains_package("java/lang"));
        assert!(resolver.contains_package("java"));
    }

    #[test]
    fn legacy_jdk_reads_jre_lib_recursively() {
        let tmp = tempfile::tempdir().unwrap();
        JarBuilder::new()
            .class("java/lang/Object")
            .write(&tmp.path().join("jre/lib/rt.jar"));
        JarBuilder::new()
            .class("javax/crypto/Cipher")
            .write(&tmp.path().join("jre/lib/ext/jce.jar"));

        let resolver = jdk_resolver(tmp.path(), ReadMode::Lazy).unwrap();
        assert!(resolver.find_class("javax/crypto/Cipher").unwrap().is_some());
    }

    #[test]
    fn empty_directory_is_not_a_jdk() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(matches!(
            jdk_resolver(tmp.path(), ReadMode::Full),
            Err(ResolverError::InvalidJdk { .. })
        ));
    }
}
