//! Service registry
//!
//! In-memory mapping of service id to source locator. Every operation takes
//! the lock exactly once, so callers observe each add/remove atomically.

use crate::daemon::error::{Result, ServiceError};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
pub struct ServiceRegistry {
    entries: RwLock<HashMap<String, String>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // Every mutation is a single insert/remove, so a poisoned map is intact
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, String>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, String>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Source locator of `id`, if registered.
    pub fn lookup(&self, id: &str) -> Option<String> {
        self.read().get(id).cloned()
    }

    pub fn add(&self, id: &str, source: &str) -> Result<()> {
        let mut entries = self.write();
        if entries.contains_key(id) {
            return Err(ServiceError::AlreadyExists(id.to_string()));
        }
        entries.insert(id.to_string(), source.to_string());
        Ok(())
    }

    pub fn remove(&self, id: &str) -> Result<()> {
        match self.write().remove(id) {
            Some(_) => Ok(()),
            None => Err(ServiceError::NotFound(id.to_string())),
        }
    }

    /// Snapshot of the whole mapping.
    pub fn list(&self) -> HashMap<String, String> {
        self.read().clone()
    }

    pub fn exists(&self, id: &str) -> bool {
        self.read().contains_key(id)
    }

    /// Snapshot of registered ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::error::ErrorKind;
    use std::sync::Arc;

    #[test]
    fn test_add_lookup_remove() {
        let registry = ServiceRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.lookup("echo"), None);

        registry.add("echo", "example/echo").unwrap();
        assert_eq!(registry.lookup("echo").as_deref(), Some("example/echo"));
        assert!(registry.exists("echo"));

        registry.remove("echo").unwrap();
        assert!(!registry.exists("echo"));
    }

    #[test]
    fn test_add_duplicate_keeps_first_source() {
        let registry = ServiceRegistry::new();
        registry.add("echo", "example/echo").unwrap();

        let err = registry.add("echo", "example/other").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(registry.lookup("echo").as_deref(), Some("example/echo"));
    }

    #[test]
    fn test_remove_missing() {
        let registry = ServiceRegistry::new();
        let err = registry.remove("ghost").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_list_is_a_snapshot() {
        let registry = ServiceRegistry::new();
        registry.add("a", "example/a").unwrap();
        let snapshot = registry.list();
        registry.add("b", "example/b").unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.ids(), vec!["a", "b"]);
    }

    #[test]
    fn test_concurrent_adds_lose_nothing() {
        let registry = Arc::new(ServiceRegistry::new());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    registry
                        .add(&format!("svc-{i}"), &format!("example/{i}"))
                        .unwrap()
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.len(), 16);
    }

    #[test]
    fn test_concurrent_duplicate_add_single_winner() {
        let registry = Arc::new(ServiceRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.add("echo", &format!("example/{i}")).is_ok())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(winners, 1);
    }
}
