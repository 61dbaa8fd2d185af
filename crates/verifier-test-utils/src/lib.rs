//! Fixture builders shared by the verifier's tests.
//!
//! Class files are synthesized in memory ([`ClassBuilder`]) and packed into
//! jars ([`JarBuilder`]) or class directories ([`write_class_dir`]) so no binary
//! test data has to be checked in.

mod class_builder;
mod layout;

pub use class_builder::ClassBuilder;
pub use layout::{write_class_dir, write_distribution_ide, write_jmod_jdk, JarBuilder};

/// Minimal class file for `internal_name` extending `java/lang/Object`.
pub fn class_bytes(internal_name: &str) -> Vec<u8> {
    ClassBuilder::new(internal_name).build()
}
