use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use verifier_classfile::ClassFile;

use crate::add_packages;

/// Resolver over classes that are already in memory.
#[derive(Debug)]
pub struct FixedClassesResolver {
    classes: HashMap<String, Arc<ClassFile>>,
    names: BTreeSet<String>,
    packages: BTreeSet<String>,
}

impl FixedClassesResolver {
    /// Later duplicates of a class name are ignored.
    pub fn new(classes: impl IntoIterator<Item = ClassFile>) -> Self {
        Self::from_shared(classes.into_iter().map(Arc::new))
    }

    pub fn from_shared(classes: impl IntoIterator<Item = Arc<ClassFile>>) -> Self {
        let mut map = HashMap::new();
        let mut names = BTreeSet::new();
        let mut packages = BTreeSet::new();
        for class in classes {
            if map.contains_key(&class.this_class) {
                continue;
            }
            add_packages(&mut packages, &class.this_class);
            names.insert(class.this_class.clone());
            map.insert(class.this_class.clone(), class);
        }
        Self {
            classes: map,
            names,
            packages,
        }
    }

    pub fn find_class(&self, name: &str) -> Option<Arc<ClassFile>> {
        self.classes.get(name).cloned()
    }

    pub fn all_classes(&self) -> &BTreeSet<String> {
        &self.names
    }

    pub fn all_packages(&self) -> &BTreeSet<String> {
        &self.packages
    }
}
