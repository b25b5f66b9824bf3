//! Authoritative target store

use std::collections::HashSet;
use std::sync::RwLock;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Exact-match set of target identifiers.
///
/// Implementations must be safe to read from many threads at once. Writes
/// (imports) are not expected to overlap with scans.
pub trait TargetStore: Send + Sync {
    /// Insert `identifier`; returns `false` when it was already present
    fn insert_if_absent(&self, identifier: &str) -> Result<bool, StoreError>;

    fn exists(&self, identifier: &str) -> Result<bool, StoreError>;

    /// Every stored identifier, used to rebuild the pre-filter
    fn load_all(&self) -> Result<Vec<String>, StoreError>;

    fn len(&self) -> Result<usize, StoreError>;

    /// Insert a batch. The outer error aborts the batch, inner errors are per row.
    fn insert_many(&self, identifiers: &[String]) -> Result<Vec<Result<bool, StoreError>>, StoreError> {
        Ok(identifiers
            .iter()
            .map(|identifier| self.insert_if_absent(identifier))
            .collect())
    }
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    identifiers: RwLock<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identifiers<I, S>(identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            identifiers: RwLock::new(identifiers.into_iter().map(Into::into).collect()),
        }
    }

    /// Drop an identifier. The pre-filter keeps answering "maybe" for it
    /// until the next rebuild.
    pub fn remove(&self, identifier: &str) -> Result<bool, StoreError> {
        let mut set = self.identifiers.write().map_err(|_| poisoned())?;
        Ok(set.remove(identifier))
    }
}

impl TargetStore for MemoryStore {
    fn insert_if_absent(&self, identifier: &str) -> Result<bool, StoreError> {
        let mut set = self.identifiers.write().map_err(|_| poisoned())?;
        Ok(set.insert(identifier.to_string()))
    }

    fn exists(&self, identifier: &str) -> Result<bool, StoreError> {
        let set = self.identifiers.read().map_err(|_| poisoned())?;
        Ok(set.contains(identifier))
    }

    fn load_all(&self) -> Result<Vec<String>, StoreError> {
        let set = self.identifiers.read().map_err(|_| poisoned())?;
        Ok(set.iter().cloned().collect())
    }

    fn len(&self) -> Result<usize, StoreError> {
        let set = self.identifiers.read().map_err(|_| poisoned())?;
        Ok(set.len())
    }
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("lock poisoned".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_is_idempotent() {
        let store = MemoryStore::new();
        assert!(store.insert_if_absent("a").unwrap());
        assert!(!store.insert_if_absent("a").unwrap());
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_exists_and_load_all() {
        let store = MemoryStore::with_identifiers(["a", "b"]);
        assert!(store.exists("a").unwrap());
        assert!(!store.exists("c").unwrap());

        let mut all = store.load_all().unwrap();
        all.sort();
        assert_eq!(all, vec!["a", "b"]);
    }

    #[test]
    fn test_default_insert_many_reports_per_row() {
        let store = MemoryStore::new();
        let rows = store
            .insert_many(&["a".to_string(), "a".to_string(), "b".to_string()])
            .unwrap();
        let inserted: Vec<bool> = rows.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(inserted, vec![true, false, true]);
    }
}
