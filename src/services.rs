// Author: Eshan Roy
// SPDX-License-Identifier: MIT

//! Capability provider handed to every module initializer.
//!
//! The host never looks inside; it passes one shared `Arc<Services>` to each
//! module unchanged. Values are keyed by their type.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Type-keyed collection of shared capabilities.
#[derive(Default)]
pub struct Services {
    entries: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl Services {
    /// Create an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability, replacing any previous value of the same type.
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: Arc<T>) -> &mut Self {
        self.entries.insert(TypeId::of::<T>(), value);
        self
    }

    /// Builder form of [`Services::insert`].
    pub fn with<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.insert(Arc::new(value));
        self
    }

    /// Look up a capability by type.
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.entries
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|value| value.downcast::<T>().ok())
    }

    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("entries", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct JournalPath(String);

    #[test]
    fn test_insert_and_get() {
        let services = Services::new().with(JournalPath("/tmp/journal".to_string()));
        let path = services.get::<JournalPath>().unwrap();
        assert_eq!(*path, JournalPath("/tmp/journal".to_string()));
        assert!(services.contains::<JournalPath>());
        assert_eq!(services.len(), 1);
    }

    #[test]
    fn test_missing_type() {
        let services = Services::new().with(42u32);
        assert!(services.get::<String>().is_none());
        assert!(!services.contains::<String>());
    }

    #[test]
    fn test_insert_replaces_same_type() {
        let mut services = Services::new();
        services.insert(Arc::new(1u8)).insert(Arc::new(2u8));
        assert_eq!(*services.get::<u8>().unwrap(), 2);
        assert_eq!(services.len(), 1);
    }
}
