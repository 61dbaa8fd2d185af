use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use verifier_classfile::ClassFile;

use crate::{Resolver, ResolverError};

/// Memoizes lookups (hits and misses) and the name sets of the wrapped resolver.
#[derive(Debug)]
pub struct CacheResolver {
    inner: Arc<Resolver>,
    lookups: Mutex<HashMap<String, Option<Arc<ClassFile>>>>,
    classes: OnceLock<BTreeSet<String>>,
    packages: OnceLock<BTreeSet<String>>,
}

impl CacheResolver {
    pub fn new(inner: Arc<Resolver>) -> Self {
        Self {
            inner,
            lookups: Mutex::new(HashMap::new()),
            classes: OnceLock::new(),
            packages: OnceLock::new(),
        }
    }

    pub fn inner(&self) -> &Resolver {
        &self.inner
    }

    /// Failed reads are not memoized, the next lookup retries them.
    pub fn find_class(&self, name: &str) -> Result<Option<Arc<ClassFile>>, ResolverError> {
        if let Some(hit) = self.lookups.lock().get(name) {
            return Ok(hit.clone());
        }
        // Resolve without the lock; racing lookups of one name both succeed.
        let found = self.inner.find_class(name)?;
        let mut lookups = self.lookups.lock();
        let entry = lookups.entry(name.to_string()).or_insert(found);
        Ok(entry.clone())
    }

    pub fn contains_class(&self, name: &str) -> bool {
        self.all_classes().contains(name)
    }

    pub fn all_classes(&self) -> &BTreeSet<String> {
        self.classes.get_or_init(|| self.inner.all_classes().clone())
    }

    pub fn all_packages(&self) -> &BTreeSet<String> {
        self.packages.get_or_init(|| self.inner.all_packages().clone())
    }
}
