use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};

use verifier_classfile::ClassFile;

use crate::{Resolver, ResolverError};

/// Ordered composition of resolvers. Build through [`Resolver::union`].
#[derive(Debug)]
pub struct UnionResolver {
    members: Vec<Arc<Resolver>>,
    classes: OnceLock<BTreeSet<String>>,
    packages: OnceLock<BTreeSet<String>>,
}

impl UnionResolver {
    pub(crate) fn new(members: Vec<Arc<Resolver>>) -> Self {
        Self {
            members,
            classes: OnceLock::new(),
            packages: OnceLock::new(),
        }
    }

    pub fn members(&self) -> &[Arc<Resolver>] {
        &self.members
    }

    pub fn find_class(&self, name: &str) -> Result<Option<Arc<ClassFile>>, ResolverError> {
        for member in &self.members {
            if member.contains_class(name) {
                if let Some(class) = member.find_class(name)? {
                    return Ok(Some(class));
                }
            }
        }
        Ok(None)
    }

    pub fn contains_class(&self, name: &str) -> bool {
        self.members.iter().any(|m| m.contains_class(name))
    }

    pub fn contains_package(&self, package: &str) -> bool {
        self.members.iter().any(|m| m.contains_package(package))
    }

    pub fn location_of(&self, name: &str) -> Option<&Resolver> {
        self.members
            .iter()
            .find(|m| m.contains_class(name))
            .and_then(|m| m.location_of(name))
    }

    pub fn all_classes(&self) -> &BTreeSet<String> {
        self.classes.get_or_init(|| {
            self.members
                .iter()
                .flat_map(|m| m.all_classes().iter().cloned())
                .collect()
        })
    }

    pub fn all_packages(&self) -> &BTreeSet<String> {
        self.packages.get_or_init(|| {
            self.members
                .iter()
                .flat_map(|m| m.all_packages().iter().cloned())
                .collect()
        })
    }
}
