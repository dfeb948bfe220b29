//! # Method Binder
//!
//! Maps wire signatures to method descriptors for a target's concrete type.
//!
//! ## Philosophy
//!
//! - **Built once per type**: a [`MethodTable`] is derived from a target's
//!   descriptor table the first time that type is seen, then shared.
//! - **Short critical sections**: the per-type map is only locked long enough
//!   to find or insert the type's cell. The table itself is built outside the
//!   map lock, so a slow build never stalls readers of other types.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::OnceLock;

use dashmap::DashMap;
use tracing::debug;

use crate::descriptor::MethodDescriptor;
use crate::descriptor::MethodSignature;
use crate::error::Error;
use crate::error::Result;
use crate::target::Target;

pub trait MethodBinder: Send + Sync + 'static {
    /// Returns the signature lookup table for `target`'s runtime type.
    fn info_provider_for(&self, target: &dyn Target) -> Arc<MethodTable>;

    /// Returns the wire-stable signature for `method`.
    fn method_signature(&self, method: &MethodDescriptor) -> MethodSignature;
}

/// Signature lookup table for one service type.
#[derive(Debug)]
pub struct MethodTable {
    service: &'static str,
    by_signature: HashMap<MethodSignature, &'static MethodDescriptor>,
}

impl MethodTable {
    pub fn build(binder: &dyn MethodBinder, service: &'static str, methods: &'static [MethodDescriptor]) -> Self {
        let mut by_signature = HashMap::with_capacity(methods.len());
        for method in methods {
            // first registration wins if two descriptors share a shape
            by_signature.entry(binder.method_signature(method)).or_insert(method);
        }
        Self { service, by_signature }
    }

    pub fn method(&self, signature: &[u8]) -> Result<&'static MethodDescriptor> {
        self.by_signature.get(signature).copied().ok_or_else(|| Error::MethodNotFound {
            service: self.service.to_string(),
            signature: MethodSignature::from_bytes(signature.to_vec()).to_string(),
        })
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    pub fn len(&self) -> usize {
        self.by_signature.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_signature.is_empty()
    }
}

/// Binder backed by [`MethodSignature::of`], caching one table per type.
#[derive(Default)]
pub struct DefaultBinder {
    tables: DashMap<TypeId, Arc<OnceLock<Arc<MethodTable>>>>,
}

impl DefaultBinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of types a table has been requested for.
    pub fn cached_types(&self) -> usize {
        self.tables.len()
    }
}

impl MethodBinder for DefaultBinder {
    fn info_provider_for(&self, target: &dyn Target) -> Arc<MethodTable> {
        let cell = Arc::clone(&self.tables.entry(target.runtime_type()).or_default());
        let table = cell.get_or_init(|| {
            debug!(service = target.service_name(), "building method table");
            Arc::new(MethodTable::build(self, target.service_name(), target.methods()))
        });
        Arc::clone(table)
    }

    fn method_signature(&self, method: &MethodDescriptor) -> MethodSignature {
        MethodSignature::of(method)
    }
}
