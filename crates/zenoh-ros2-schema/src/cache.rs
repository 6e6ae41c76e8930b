use std::collections::HashMap;

use parking_lot::RwLock;

use crate::TypeHash;
use crate::error::Result;

/// Hashes keyed by fully qualified type name, shared between entities.
#[derive(Debug, Default)]
pub struct TypeHashCache {
    inner: RwLock<HashMap<String, TypeHash>>,
}

impl TypeHashCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, type_name: &str) -> Option<TypeHash> {
        self.inner.read().get(type_name).copied()
    }

    /// Return the cached hash or compute and store it.
    ///
    /// The lock is not held while `compute` runs; two threads racing on the
    /// same name both compute, and both get the same value.
    pub fn get_or_try_insert_with<F>(&self, type_name: &str, compute: F) -> Result<TypeHash>
    where
        F: FnOnce() -> Result<TypeHash>,
    {
        if let Some(hash) = self.get(type_name) {
            return Ok(hash);
        }
        let hash = compute()?;
        Ok(*self
            .inner
            .write()
            .entry(type_name.to_string())
            .or_insert(hash))
    }

    pub fn insert(&self, type_name: &str, hash: TypeHash) {
        self.inner.write().insert(type_name.to_string(), hash);
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
