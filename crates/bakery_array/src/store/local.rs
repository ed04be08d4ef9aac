use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bakery_core::storage_keys::join_key;

use super::ObjectStore;

/// Filesystem store; keys are paths relative to `root`, or absolute paths.
#[derive(Debug, Clone)]
pub struct LocalFsStore {
    root: PathBuf,
}

impl LocalFsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

impl ObjectStore for LocalFsStore {
    fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>, String> {
        let path = self.path_for(key);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(format!("failed to read {}: {error}", path.display())),
        }
    }

    fn put_object(&self, key: &str, body: &[u8]) -> Result<(), String> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|error| format!("failed to create {}: {error}", parent.display()))?;
        }
        fs::write(&path, body).map_err(|error| format!("failed to write {}: {error}", path.display()))
    }

    fn list_keys(&self, prefix: &str) -> Result<Vec<String>, String> {
        let dir = self.path_for(prefix);
        let mut keys = Vec::new();
        if dir.is_dir() {
            collect_files(&dir, prefix.trim_end_matches('/'), &mut keys)?;
        }
        keys.sort();
        Ok(keys)
    }

    fn delete_object(&self, key: &str) -> Result<(), String> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(format!("failed to delete {}: {error}", path.display())),
        }
    }
}

fn collect_files(dir: &Path, key_prefix: &str, keys: &mut Vec<String>) -> Result<(), String> {
    let entries =
        fs::read_dir(dir).map_err(|error| format!("failed to list {}: {error}", dir.display()))?;
    for entry in entries {
        let entry = entry.map_err(|error| format!("failed to list {}: {error}", dir.display()))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let key = join_key(key_prefix, &name);
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, &key, keys)?;
        } else {
            keys.push(key);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn round_trips_nested_keys() {
        let dir = TempDir::new().expect("temp dir");
        let store = LocalFsStore::new(dir.path());

        store.put_object("target.zarr/Tair/0.0", b"chunk").expect("put");
        store.put_object("target.zarr/.zgroup", b"{}").expect("put");

        assert_eq!(
            store.get_object("target.zarr/Tair/0.0").expect("get"),
            Some(b"chunk".to_vec())
        );
        assert_eq!(store.get_object("target.zarr/missing").expect("get"), None);
        assert_eq!(
            store.list_keys("target.zarr").expect("list"),
            vec!["target.zarr/.zgroup", "target.zarr/Tair/0.0"]
        );
    }

    #[test]
    fn absolute_keys_ignore_empty_root() {
        let dir = TempDir::new().expect("temp dir");
        let store = LocalFsStore::new("");
        let absolute = dir.path().join("store").to_string_lossy().into_owned();

        store
            .put_object(&join_key(&absolute, ".zgroup"), b"{}")
            .expect("put");
        let keys = store.list_keys(&absolute).expect("list");
        assert_eq!(keys, vec![join_key(&absolute, ".zgroup")]);

        store.delete_object(&keys[0]).expect("delete");
        assert!(store.list_keys(&absolute).expect("list").is_empty());
    }
}
