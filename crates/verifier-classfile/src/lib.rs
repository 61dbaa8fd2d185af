#![forbid(unsafe_code)]

//! Parsing of JVM class files into the descriptors the resolvers hand out.

mod classfile;
mod constant_pool;
mod error;
mod reader;

pub use crate::classfile::{ClassFile, ClassMember};
pub use crate::error::{Error, Result};

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_FINAL: u16 = 0x0010;
pub const ACC_INTERFACE: u16 = 0x0200;
pub const ACC_ABSTRACT: u16 = 0x0400;
pub const ACC_SYNTHETIC: u16 = 0x1000;

/// Package of an internal class name: `a/b/C` -> `a/b`, `C` -> `` (default package).
pub fn package_of(internal_name: &str) -> &str {
    match internal_name.rfind('/') {
        Some(idx) => &internal_name[..idx],
        None => "",
    }
}
