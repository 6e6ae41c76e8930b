//! Process-wide memo of resolved descriptors and their hashes.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::debug;

use crate::cache::TypeHashCache;
use crate::descriptor::{DescriptorBuilder, ServiceDescriptor, TypeDescriptor};
use crate::error::{Result, SchemaError};
use crate::hash::{message_type_hash, service_type_hash};
use crate::resolver::{StaticResolver, TypeResolver};
use crate::type_name::TypeName;
use crate::TypeHash;

/// Thread-safe registry of interface definitions.
///
/// Definitions registered explicitly take precedence over the configured
/// resolver. Resolved descriptors and hashes are memoized, and
/// registering a changed definition invalidates everything.
pub struct TypeRegistry {
    resolver: Arc<dyn TypeResolver>,
    overrides: RwLock<HashMap<TypeName, String>>,
    /// Bumped by every effective `register`, under the `overrides` write lock.
    generation: AtomicU64,
    messages: RwLock<HashMap<TypeName, Arc<TypeDescriptor>>>,
    services: RwLock<HashMap<TypeName, Arc<ServiceDescriptor>>>,
    hashes: TypeHashCache,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new(StaticResolver::builtin())
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("overrides", &self.overrides.read().len())
            .field("messages", &self.messages.read().len())
            .field("services", &self.services.read().len())
            .finish()
    }
}

/// Resolver view: overrides first, then the configured resolver.
struct Layered<'a> {
    overrides: &'a HashMap<TypeName, String>,
    fallback: &'a dyn TypeResolver,
}

impl TypeResolver for Layered<'_> {
    fn resolve(&self, type_name: &TypeName) -> Option<String> {
        self.overrides
            .get(type_name)
            .cloned()
            .or_else(|| self.fallback.resolve(type_name))
    }
}

impl TypeRegistry {
    pub fn new<R: TypeResolver + 'static>(resolver: R) -> Self {
        Self::with_resolver(Arc::new(resolver))
    }

    pub fn with_resolver(resolver: Arc<dyn TypeResolver>) -> Self {
        Self {
            resolver,
            overrides: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
            messages: RwLock::new(HashMap::new()),
            services: RwLock::new(HashMap::new()),
            hashes: TypeHashCache::new(),
        }
    }

    /// Register (or replace) the definition text of `type_name`.
    ///
    /// Registering the text already held for `type_name` keeps the memoized
    /// descriptors and hashes.
    pub fn register(&self, type_name: &str, text: &str) -> Result<()> {
        let name: TypeName = type_name.parse()?;
        let mut overrides = self.overrides.write();
        if overrides.get(&name).is_some_and(|current| current == text) {
            return Ok(());
        }
        debug!("registering definition for {}", name);
        overrides.insert(name, text.to_string());
        // Any memoized type may embed the old definition.
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.messages.write().clear();
        self.services.write().clear();
        self.hashes.clear();
        Ok(())
    }

    pub fn message(&self, type_name: &str) -> Result<Arc<TypeDescriptor>> {
        let name: TypeName = type_name.parse()?;
        if let Some(desc) = self.messages.read().get(&name) {
            return Ok(desc.clone());
        }

        let overrides = self.overrides.read();
        let layered = Layered {
            overrides: &overrides,
            fallback: self.resolver.as_ref(),
        };
        let known: Vec<_> = self.messages.read().values().cloned().collect();
        let mut builder = DescriptorBuilder::new(&layered).with_known(known);
        let desc = builder.load(&name)?;

        let mut messages = self.messages.write();
        for built in builder.into_known() {
            messages.entry(built.name().clone()).or_insert(built);
        }
        Ok(desc)
    }

    pub fn service(&self, service_name: &str) -> Result<Arc<ServiceDescriptor>> {
        let name: TypeName = service_name.parse()?;
        if let Some(srv) = self.services.read().get(&name) {
            return Ok(srv.clone());
        }

        let overrides = self.overrides.read();
        let layered = Layered {
            overrides: &overrides,
            fallback: self.resolver.as_ref(),
        };
        let text = layered
            .resolve(&name)
            .ok_or_else(|| SchemaError::UnresolvedType(name.to_string()))?;
        let known: Vec<_> = self.messages.read().values().cloned().collect();
        let srv = Arc::new(
            DescriptorBuilder::new(&layered)
                .with_known(known)
                .build_service(&name, &text)?,
        );
        self.services.write().insert(name, srv.clone());
        Ok(srv)
    }

    /// RIHS01 hash of a message type, memoized.
    pub fn message_hash(&self, type_name: &str) -> Result<TypeHash> {
        let generation = self.generation.load(Ordering::Acquire);
        let desc = self.message(type_name)?;
        self.memo_hash(desc.name(), generation, || message_type_hash(&desc))
    }

    /// RIHS01 hash of a service type, memoized.
    pub fn service_hash(&self, service_name: &str) -> Result<TypeHash> {
        let generation = self.generation.load(Ordering::Acquire);
        let srv = self.service(service_name)?;
        self.memo_hash(srv.name(), generation, || service_type_hash(&srv))
    }

    /// Cache the computed hash only if no `register` happened since
    /// `generation` was read, since the descriptor may predate it.
    fn memo_hash(
        &self,
        name: &TypeName,
        generation: u64,
        compute: impl FnOnce() -> Result<TypeHash>,
    ) -> Result<TypeHash> {
        let key = name.to_string();
        if let Some(hash) = self.hashes.get(&key) {
            return Ok(hash);
        }
        let hash = compute()?;
        debug!("{} -> {}", name, hash);
        let _overrides = self.overrides.read();
        if self.generation.load(Ordering::Acquire) == generation {
            self.hashes.insert(&key, hash);
        }
        Ok(hash)
    }
}
