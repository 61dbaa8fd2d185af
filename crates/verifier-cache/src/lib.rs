//! Reference-counted cache of expensive, shareable resources.
//!
//! A [`ResourceCache`] builds each resource at most once per key through its
//! [`ResourceProvider`], hands out [`ResourceHandle`]s that pin the entry, and
//! evicts unpinned entries (oldest release first) once its [`CacheBudget`] is
//! exceeded. Evicted resources are handed to the disposer exactly once.

mod cache;
mod error;
mod panic_util;
mod provider;

pub use cache::{CacheBudget, CacheStats, ResourceCache, ResourceCacheBuilder, ResourceHandle};
pub use error::{CacheError, Result};
pub use panic_util::panic_message;
pub use provider::{ProvideResult, ResourceProvider};
