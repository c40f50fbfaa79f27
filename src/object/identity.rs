//! Concurrent identity map

use dashmap::DashMap;
use std::any::Any;
use std::sync::Arc;

use crate::engine::ObjectPtr;

/// Type-erased live instance
pub trait InstanceBinding: Send + Sync {
    fn object(&self) -> ObjectPtr;

    fn class_name(&self) -> &str;

    /// `false` once the host value has been dropped
    fn is_alive(&self) -> bool;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Engine object handle -> instance binding
///
/// Safe for concurrent readers and writers; entries are cloned `Arc`s, so a
/// loaded binding stays valid after a concurrent delete.
pub struct IdentityMap {
    map: DashMap<ObjectPtr, Arc<dyn InstanceBinding>>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self {
            map: DashMap::with_capacity(128),
        }
    }

    /// Insert a binding; returns the one it replaced
    pub fn store(
        &self,
        object: ObjectPtr,
        binding: Arc<dyn InstanceBinding>,
    ) -> Option<Arc<dyn InstanceBinding>> {
        self.map.insert(object, binding)
    }

    #[inline]
    pub fn load(&self, object: ObjectPtr) -> Option<Arc<dyn InstanceBinding>> {
        self.map.get(&object).map(|entry| Arc::clone(entry.value()))
    }

    /// Typed load; `None` when absent or bound to another type
    pub fn load_as<T: Any + Send + Sync>(&self, object: ObjectPtr) -> Option<Arc<T>> {
        self.load(object)?.into_any().downcast::<T>().ok()
    }

    pub fn delete(&self, object: ObjectPtr) -> Option<Arc<dyn InstanceBinding>> {
        self.map.remove(&object).map(|(_, binding)| binding)
    }

    #[inline]
    pub fn contains(&self, object: ObjectPtr) -> bool {
        self.map.contains_key(&object)
    }

    /// Objects currently bound to instances of `class`
    pub fn objects_of(&self, class: &str) -> Vec<ObjectPtr> {
        self.map
            .iter()
            .filter(|entry| entry.value().class_name() == class)
            .map(|entry| *entry.key())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl Default for IdentityMap {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for IdentityMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityMap")
            .field("len", &self.map.len())
            .finish()
    }
}
