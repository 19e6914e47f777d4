use crate::error::StoreError;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Persistence collaborator for application records.
pub trait RecordStore<T>: Send + Sync {
    /// Inserts or replaces the record under `id`.
    fn save(&self, id: &str, record: T) -> Result<(), StoreError>;

    fn get(&self, id: &str) -> Option<T>;

    fn list(&self) -> Vec<(String, T)>;
}

#[derive(Debug)]
pub struct MemoryStore<T> {
    records: RwLock<BTreeMap<String, T>>,
    capacity: Option<usize>,
}

impl<T> MemoryStore<T> {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            capacity: None,
        }
    }

    /// Refuses new records once `capacity` are stored. Replacing an existing
    /// record is always allowed.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            capacity: Some(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl<T> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync> RecordStore<T> for MemoryStore<T> {
    fn save(&self, id: &str, record: T) -> Result<(), StoreError> {
        let mut records = self.records.write();
        if let Some(capacity) = self.capacity {
            if records.len() >= capacity && !records.contains_key(id) {
                return Err(StoreError::Full(capacity));
            }
        }
        records.insert(id.to_string(), record);
        Ok(())
    }

    fn get(&self, id: &str) -> Option<T> {
        self.records.read().get(id).cloned()
    }

    fn list(&self) -> Vec<(String, T)> {
        self.records
            .read()
            .iter()
            .map(|(id, record)| (id.clone(), record.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_replaces_and_lists_in_id_order() {
        let store = MemoryStore::new();
        store.save("b", 2).unwrap();
        store.save("a", 1).unwrap();
        store.save("b", 3).unwrap();
        assert_eq!(store.get("b"), Some(3));
        assert_eq!(
            store.list(),
            vec![("a".to_string(), 1), ("b".to_string(), 3)]
        );
    }

    #[test]
    fn test_capacity_refuses_new_records_only() {
        let store = MemoryStore::with_capacity(1);
        store.save("a", 1).unwrap();
        assert_eq!(store.save("b", 2), Err(StoreError::Full(1)));
        store.save("a", 5).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("a"), Some(5));
    }
}
