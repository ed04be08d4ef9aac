//! Key/value object stores behind store locators.
//!
//! Backends implement [`ObjectStore`] over flat string keys with `/` as the
//! hierarchy separator. [`StoreMapper`] scopes a backend to one store root,
//! the way a target store sees it.

use std::sync::Arc;

#[path = "store/local.rs"]
mod local;
#[path = "store/mapper.rs"]
mod mapper;
#[path = "store/memory.rs"]
mod memory;

pub use local::LocalFsStore;
pub use mapper::StoreMapper;
pub use memory::MemoryStore;

pub trait ObjectStore: Send + Sync {
    /// Read one object; `Ok(None)` when the key does not exist.
    fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>, String>;

    fn put_object(&self, key: &str, body: &[u8]) -> Result<(), String>;

    /// All keys below `prefix`, treating `prefix` as a directory.
    fn list_keys(&self, prefix: &str) -> Result<Vec<String>, String>;

    /// Remove one object. Removing a missing key is not an error.
    fn delete_object(&self, key: &str) -> Result<(), String>;
}

impl<S: ObjectStore + ?Sized> ObjectStore for Arc<S> {
    fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>, String> {
        (**self).get_object(key)
    }

    fn put_object(&self, key: &str, body: &[u8]) -> Result<(), String> {
        (**self).put_object(key, body)
    }

    fn list_keys(&self, prefix: &str) -> Result<Vec<String>, String> {
        (**self).list_keys(prefix)
    }

    fn delete_object(&self, key: &str) -> Result<(), String> {
        (**self).delete_object(key)
    }
}

pub(crate) fn directory_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}
