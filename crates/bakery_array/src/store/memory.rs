use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use super::{directory_prefix, ObjectStore};

/// Process-local store. Clones share the same contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    objects: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.read().map(|objects| objects.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ObjectStore for MemoryStore {
    fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>, String> {
        let objects = self
            .objects
            .read()
            .map_err(|_| "memory store lock poisoned".to_string())?;
        Ok(objects.get(key).cloned())
    }

    fn put_object(&self, key: &str, body: &[u8]) -> Result<(), String> {
        let mut objects = self
            .objects
            .write()
            .map_err(|_| "memory store lock poisoned".to_string())?;
        objects.insert(key.to_string(), body.to_vec());
        Ok(())
    }

    fn list_keys(&self, prefix: &str) -> Result<Vec<String>, String> {
        let objects = self
            .objects
            .read()
            .map_err(|_| "memory store lock poisoned".to_string())?;
        let dir = directory_prefix(prefix);
        Ok(objects
            .range(dir.clone()..)
            .take_while(|(key, _)| key.starts_with(&dir))
            .map(|(key, _)| key.clone())
            .collect())
    }

    fn delete_object(&self, key: &str) -> Result<(), String> {
        let mut objects = self
            .objects
            .write()
            .map_err(|_| "memory store lock poisoned".to_string())?;
        objects.remove(key);
        Ok(())
    }
}
