use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::class_bytes;

/// In-memory description of a jar (or jmod) written in one go by [`JarBuilder::write`].
#[derive(Default)]
pub struct JarBuilder {
    entries: Vec<(String, Vec<u8>)>,
    jmod: bool,
}

impl JarBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Jmod layout: class entries are placed under `classes/`.
    pub fn jmod() -> Self {
        Self { entries: Vec::new(), jmod: true }
    }

    /// Adds a minimal class named `internal_name`.
    pub fn class(self, internal_name: &str) -> Self {
        let bytes = class_bytes(internal_name);
        self.class_file(internal_name, bytes)
    }

    pub fn class_file(mut self, internal_name: &str, bytes: Vec<u8>) -> Self {
        let prefix = if self.jmod { "classes/" } else { "" };
        self.entries.push((format!("{prefix}{internal_name}.class"), bytes));
        self
    }

    pub fn entry(mut self, path: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.entries.push((path.to_string(), bytes.into()));
        self
    }

    pub fn write(self, path: &Path) -> PathBuf {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create jar parent dir");
        }
        let file = fs::File::create(path).expect("create jar");
        let mut zip = ZipWriter::new(file);
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        for (name, bytes) in self.entries {
            zip.start_file(name, options).expect("start zip entry");
            zip.write_all(&bytes).expect("write zip entry");
        }
        zip.finish().expect("finish jar");
        path.to_path_buf()
    }
}

/// Writes `<dir>/<internal_name>.class` for every class.
pub fn write_class_dir(dir: &Path, classes: &[&str]) {
    for name in classes {
        let path = dir.join(format!("{name}.class"));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create package dir");
        }
        fs::write(&path, class_bytes(name)).expect("write class file");
    }
}

/// Lays out a distribution IDE: `build.txt` plus one jar per entry under `lib/`.
pub fn write_distribution_ide(dir: &Path, build: &str, jars: &[(&str, &[&str])]) -> PathBuf {
    fs::create_dir_all(dir.join("lib")).expect("create lib dir");
    fs::write(dir.join("build.txt"), build).expect("write build.txt");
    for (jar, classes) in jars {
        classes
            .iter()
            .fold(JarBuilder::new(), |builder, class| builder.class(class))
            .write(&dir.join("lib").join(format!("{jar}.jar")));
    }
    dir.to_path_buf()
}

/// Lays out a modular JDK: one jmod per entry under `jmods/`.
pub fn write_jmod_jdk(dir: &Path, modules: &[(&str, &[&str])]) -> PathBuf {
    fs::create_dir_all(dir.join("jmods")).expect("create jmods dir");
    for (module, classes) in modules {
        classes
            .iter()
            .fold(JarBuilder::jmod(), |builder, class| builder.class(class))
            .write(&dir.join("jmods").join(format!("{module}.jmod")));
    }
    dir.to_path_buf()
}
