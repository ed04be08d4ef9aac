//! URL resolution for sources and target stores.
//!
//! A locator is `scheme://path` or a bare filesystem path. The [`Resolver`]
//! owns the backend registered for each scheme; nothing is looked up from
//! process-global state.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{BakeryError, Result};
use crate::store::{LocalFsStore, MemoryStore, ObjectStore, StoreMapper};

pub const MEMORY_SCHEME: &str = "memory";
pub const FILE_SCHEME: &str = "file";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    scheme: String,
    path: String,
    raw: String,
}

impl Locator {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(BakeryError::InvalidArgument(
                "locator cannot be empty".to_string(),
            ));
        }

        let (scheme, path) = match trimmed.split_once("://") {
            Some((scheme, rest)) => {
                let scheme = scheme.to_ascii_lowercase();
                if scheme.is_empty()
                    || !scheme
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
                {
                    return Err(BakeryError::InvalidArgument(format!(
                        "locator '{trimmed}' has an invalid scheme"
                    )));
                }
                let path = if scheme == FILE_SCHEME {
                    rest.trim_end_matches('/').to_string()
                } else {
                    rest.trim_matches('/').to_string()
                };
                (scheme, path)
            }
            None => (FILE_SCHEME.to_string(), trimmed.trim_end_matches('/').to_string()),
        };

        if path.is_empty() {
            return Err(BakeryError::InvalidArgument(format!(
                "locator '{trimmed}' has an empty path"
            )));
        }

        Ok(Self {
            scheme,
            path,
            raw: trimmed.to_string(),
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[derive(Clone)]
pub struct Resolver {
    backends: BTreeMap<String, Arc<dyn ObjectStore>>,
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("schemes", &self.backends.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolver {
    /// Resolver with a fresh in-memory backend and the local filesystem.
    pub fn new() -> Self {
        Self::empty()
            .with_backend(MEMORY_SCHEME, Arc::new(MemoryStore::new()))
            .with_backend(FILE_SCHEME, Arc::new(LocalFsStore::new("")))
    }

    pub fn empty() -> Self {
        Self {
            backends: BTreeMap::new(),
        }
    }

    pub fn with_backend(mut self, scheme: &str, backend: Arc<dyn ObjectStore>) -> Self {
        self.backends.insert(scheme.to_ascii_lowercase(), backend);
        self
    }

    pub fn schemes(&self) -> impl Iterator<Item = &str> {
        self.backends.keys().map(String::as_str)
    }

    pub fn resolve(&self, raw: &str) -> Result<(Arc<dyn ObjectStore>, Locator)> {
        let locator = Locator::parse(raw)?;
        let backend = self.backends.get(locator.scheme()).cloned().ok_or_else(|| {
            BakeryError::InvalidArgument(format!(
                "no backend registered for scheme '{}' in '{locator}'",
                locator.scheme()
            ))
        })?;
        Ok((backend, locator))
    }

    /// Resolve, then read the whole object. Missing objects and backend
    /// failures are both reported as an unavailable source.
    pub fn open_bytes(&self, raw: &str) -> Result<Vec<u8>> {
        let (backend, locator) = self.resolve(raw)?;
        match backend.get_object(locator.path()) {
            Ok(Some(bytes)) => Ok(bytes),
            Ok(None) => Err(BakeryError::source_unavailable(raw, "object does not exist")),
            Err(reason) => Err(BakeryError::source_unavailable(raw, reason)),
        }
    }

    pub fn put_bytes(&self, raw: &str, body: &[u8]) -> Result<()> {
        let (backend, locator) = self.resolve(raw)?;
        backend
            .put_object(locator.path(), body)
            .map_err(|reason| BakeryError::storage_access(raw, reason))
    }

    pub fn mapper(&self, raw: &str) -> Result<StoreMapper> {
        let (backend, locator) = self.resolve(raw)?;
        Ok(StoreMapper::new(
            backend,
            locator.path().to_string(),
            locator.as_str().to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_schemes_and_paths() {
        let memory = Locator::parse("memory://cache/0.parquet").expect("valid locator");
        assert_eq!(memory.scheme(), "memory");
        assert_eq!(memory.path(), "cache/0.parquet");

        let file = Locator::parse("file:///tmp/target.zarr/").expect("valid locator");
        assert_eq!(file.scheme(), "file");
        assert_eq!(file.path(), "/tmp/target.zarr");

        let bare = Locator::parse("data/target.zarr").expect("valid locator");
        assert_eq!(bare.scheme(), "file");
        assert_eq!(bare.path(), "data/target.zarr");

        let s3 = Locator::parse("S3://bucket/prefix/target.zarr").expect("valid locator");
        assert_eq!(s3.scheme(), "s3");
        assert_eq!(s3.path(), "bucket/prefix/target.zarr");
    }

    #[test]
    fn rejects_empty_locators() {
        assert!(Locator::parse("  ").is_err());
        assert!(Locator::parse("memory://").is_err());
        assert!(Locator::parse("://path").is_err());
    }

    #[test]
    fn unknown_scheme_is_invalid_argument() {
        let error = Resolver::new()
            .open_bytes("gcs://bucket/file.parquet")
            .expect_err("no gcs backend");
        assert_eq!(error.code(), "invalid_argument");
    }

    #[test]
    fn missing_object_is_source_unavailable() {
        let error = Resolver::new()
            .open_bytes("memory://cache/missing.parquet")
            .expect_err("object is missing");
        assert_eq!(error.code(), "source_unavailable");
    }

    #[test]
    fn clones_share_the_memory_backend() {
        let resolver = Resolver::new();
        resolver
            .clone()
            .put_bytes("memory://cache/a", b"abc")
            .expect("put");
        assert_eq!(resolver.open_bytes("memory://cache/a").expect("read"), b"abc");
    }
}
