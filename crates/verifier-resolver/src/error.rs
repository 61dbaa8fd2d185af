use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("invalid class file `{location}`: {source}")]
    ClassFile {
        location: String,
        #[source]
        source: verifier_classfile::Error,
    },
    #[error("`{}` is not an IDE: {reason}", path.display())]
    InvalidIde { path: PathBuf, reason: String },
    #[error("`{}` is not a JDK: {reason}", path.display())]
    InvalidJdk { path: PathBuf, reason: String },
}

impl ResolverError {
    pub(crate) fn class_file(location: impl Into<String>, source: verifier_classfile::Error) -> Self {
        Self::ClassFile {
            location: location.into(),
            source,
        }
    }
}
