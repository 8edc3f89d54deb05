//! Type-keyed service container handed to plugins and data sources.
//!
//! Slots are keyed by the concrete service type; trait-object services are
//! stored as their `Arc<dyn …>` handle. `required` is for slots the caller
//! cannot proceed without, `optional` for slots that may be absent in a
//! reduced wiring (tests, previews).

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::errors::CoreError;

/// A bag of shared services with typed access. Cloning the container clones
/// the handle; all clones see the same slots.
#[derive(Clone, Default)]
pub struct ServiceContainer {
    slots: Arc<RwLock<HashMap<TypeId, Box<dyn Any + Send + Sync>>>>,
}

impl ServiceContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service, replacing any previous slot of the same type.
    pub fn insert<S: Clone + Send + Sync + 'static>(&self, service: S) {
        let mut slots = self.slots.write().expect("service container poisoned");
        slots.insert(TypeId::of::<S>(), Box::new(service));
    }

    /// Fetch a service the caller cannot run without.
    pub fn required<S: Clone + Send + Sync + 'static>(&self) -> Result<S, CoreError> {
        self.optional::<S>()
            .ok_or_else(|| CoreError::Unavailable(format!("service {}", type_name::<S>())))
    }

    /// Fetch a service that may legitimately be absent.
    pub fn optional<S: Clone + Send + Sync + 'static>(&self) -> Option<S> {
        let slots = self.slots.read().expect("service container poisoned");
        slots
            .get(&TypeId::of::<S>())
            .and_then(|boxed| boxed.downcast_ref::<S>())
            .cloned()
    }
}
