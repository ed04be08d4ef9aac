use std::fmt;
use std::sync::Arc;

use bakery_core::storage_keys::join_key;

use super::{directory_prefix, ObjectStore};
use crate::error::{BakeryError, Result};

/// A backend scoped to one store root, addressed with relative keys.
#[derive(Clone)]
pub struct StoreMapper {
    backend: Arc<dyn ObjectStore>,
    root: String,
    locator: String,
}

impl fmt::Debug for StoreMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreMapper")
            .field("root", &self.root)
            .field("locator", &self.locator)
            .finish_non_exhaustive()
    }
}

impl StoreMapper {
    pub fn new(
        backend: Arc<dyn ObjectStore>,
        root: impl Into<String>,
        locator: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            root: root.into().trim_end_matches('/').to_string(),
            locator: locator.into(),
        }
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.backend
            .get_object(&join_key(&self.root, key))
            .map_err(|reason| BakeryError::storage_access(&self.locator, reason))
    }

    pub fn put(&self, key: &str, body: &[u8]) -> Result<()> {
        self.backend
            .put_object(&join_key(&self.root, key), body)
            .map_err(|reason| BakeryError::storage_access(&self.locator, reason))
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        self.backend
            .delete_object(&join_key(&self.root, key))
            .map_err(|reason| BakeryError::storage_access(&self.locator, reason))
    }

    /// Keys relative to the store root.
    pub fn keys(&self) -> Result<Vec<String>> {
        let dir = directory_prefix(&self.root);
        let keys = self
            .backend
            .list_keys(&self.root)
            .map_err(|reason| BakeryError::storage_access(&self.locator, reason))?;
        Ok(keys
            .into_iter()
            .filter_map(|key| key.strip_prefix(&dir).map(str::to_string))
            .collect())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.keys()?.is_empty())
    }

    pub fn clear(&self) -> Result<()> {
        for key in self.keys()? {
            self.delete(&key)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::MemoryStore;
    use super::*;

    #[test]
    fn keys_are_relative_to_root() {
        let backend = MemoryStore::new();
        let mapper = StoreMapper::new(Arc::new(backend.clone()), "target.zarr/", "memory://target.zarr");

        assert!(mapper.is_empty().expect("list"));
        mapper.put(".zgroup", b"{}").expect("put");
        mapper.put("Tair/0.0", b"x").expect("put");

        assert_eq!(mapper.keys().expect("list"), vec![".zgroup", "Tair/0.0"]);
        assert_eq!(
            backend.get_object("target.zarr/.zgroup").expect("get"),
            Some(b"{}".to_vec())
        );

        mapper.clear().expect("clear");
        assert!(mapper.is_empty().expect("list"));
    }
}
