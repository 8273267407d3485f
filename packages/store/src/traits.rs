//! The Storage trait - contract for every backing store.

use std::sync::Arc;

use crate::{Dict, Metadata, Path, StorageError, StoreInfo, Value};

/// Key of the subdirectory listing in an index dict.
pub const IDX_DIRECTORIES: &str = "directories";

/// Key of the object listing in an index dict.
pub const IDX_OBJECTS: &str = "objects";

/// Lazy stream of `(path, value)` pairs below a prefix.
pub type LoadAllIter<'a> = Box<dyn Iterator<Item = Result<(Path, Value), StorageError>> + Send + 'a>;

/// Contract for a backing store.
///
/// Stores are thread-safe for concurrent reads; writable stores provide
/// interior synchronization. All methods take `&self`.
///
/// # Object Safety
///
/// This trait is object-safe: mounts hold `Arc<dyn Storage>`.
pub trait Storage: Send + Sync {
    /// Identity of this store.
    fn info(&self) -> StoreInfo;

    /// Resolve a path to metadata without loading the payload.
    fn lookup(&self, path: &Path) -> Option<Metadata>;

    /// Load the value at a path.
    ///
    /// # Returns
    ///
    /// * `Ok(None)` - The path does not exist.
    /// * `Ok(Some(value))` - For an index path, a dict with `directories`
    ///   and `objects` name arrays; for a leaf, the stored value.
    /// * `Err(StorageError)` - An I/O or format failure.
    fn load(&self, path: &Path) -> Result<Option<Value>, StorageError>;

    /// Stream all leaf objects at or below `prefix`.
    ///
    /// The walk is lazy, depth-first, with names sorted lexicographically.
    /// Dropping the iterator cancels the walk.
    fn load_all(&self, prefix: &Path) -> LoadAllIter<'_>;

    /// Store a value at a leaf path.
    fn store(&self, path: &Path, value: Value) -> Result<(), StorageError>;

    /// Remove the value at a path; recursive when `path` is an index.
    ///
    /// Removing a missing path is a no-op.
    fn remove(&self, path: &Path) -> Result<(), StorageError>;

    /// Drop cached listings; with `deep`, also drop cached values.
    fn cache_clean(&self, deep: bool) {
        let _ = deep;
    }
}

/// Build an index dict from listing name vectors.
pub fn index_dict(directories: Vec<String>, objects: Vec<String>) -> Dict {
    let mut dict = Dict::new();
    dict.insert(
        IDX_DIRECTORIES.to_string(),
        Value::Array(directories.into_iter().map(Value::Str).collect()),
    );
    dict.insert(
        IDX_OBJECTS.to_string(),
        Value::Array(objects.into_iter().map(Value::Str).collect()),
    );
    dict
}

impl<T: Storage + ?Sized> Storage for Box<T> {
    fn info(&self) -> StoreInfo {
        self.as_ref().info()
    }

    fn lookup(&self, path: &Path) -> Option<Metadata> {
        self.as_ref().lookup(path)
    }

    fn load(&self, path: &Path) -> Result<Option<Value>, StorageError> {
        self.as_ref().load(path)
    }

    fn load_all(&self, prefix: &Path) -> LoadAllIter<'_> {
        self.as_ref().load_all(prefix)
    }

    fn store(&self, path: &Path, value: Value) -> Result<(), StorageError> {
        self.as_ref().store(path, value)
    }

    fn remove(&self, path: &Path) -> Result<(), StorageError> {
        self.as_ref().remove(path)
    }

    fn cache_clean(&self, deep: bool) {
        self.as_ref().cache_clean(deep)
    }
}

impl<T: Storage + ?Sized> Storage for Arc<T> {
    fn info(&self) -> StoreInfo {
        self.as_ref().info()
    }

    fn lookup(&self, path: &Path) -> Option<Metadata> {
        self.as_ref().lookup(path)
    }

    fn load(&self, path: &Path) -> Result<Option<Value>, StorageError> {
        self.as_ref().load(path)
    }

    fn load_all(&self, prefix: &Path) -> LoadAllIter<'_> {
        self.as_ref().load_all(prefix)
    }

    fn store(&self, path: &Path, value: Value) -> Result<(), StorageError> {
        self.as_ref().store(path, value)
    }

    fn remove(&self, path: &Path) -> Result<(), StorageError> {
        self.as_ref().remove(path)
    }

    fn cache_clean(&self, deep: bool) {
        self.as_ref().cache_clean(deep)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{path, MemoryStore};

    #[test]
    fn index_dict_shape() {
        let dict = index_dict(
            vec!["sub".to_string()],
            vec!["a".to_string(), "b".to_string()],
        );
        let dirs = dict.get(IDX_DIRECTORIES).unwrap().as_array().unwrap();
        let objs = dict.get(IDX_OBJECTS).unwrap().as_array().unwrap();
        assert_eq!(dirs.len(), 1);
        assert_eq!(objs.len(), 2);
    }

    #[test]
    fn object_safety_works() {
        let store: Box<dyn Storage> = Box::new(MemoryStore::new("test"));
        store.store(&path!("x"), Value::from(1i64)).unwrap();
        let loaded = store.load(&path!("x")).unwrap();
        assert_eq!(loaded, Some(Value::from(1i64)));
    }

    #[test]
    fn arc_delegation_works() {
        let store = Arc::new(MemoryStore::new("test"));
        store.store(&path!("x"), Value::from(1i64)).unwrap();
        let dynamic: Arc<dyn Storage> = store;
        assert!(dynamic.lookup(&path!("x")).is_some());
        assert_eq!(dynamic.info().id, "test");
    }
}
