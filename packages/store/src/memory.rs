//! In-memory store with a maintained directory index.

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, SystemTime};

use parking_lot::RwLock;

use crate::{
    index_dict, Kind, LoadAllIter, Metadata, Path, Storage, StorageError, StoreInfo, Value,
};

/// A writable store backed by process memory.
///
/// Values live in a sorted map keyed by path; a directory index is maintained
/// on every write so that index lookups and listings never scan the object
/// map. Writes are serialized behind a reader-writer lock; reads share it.
///
/// `last_modified` is monotonic per path: a write that lands within the clock
/// resolution of its predecessor is stamped one nanosecond later.
pub struct MemoryStore {
    id: String,
    inner: RwLock<Inner>,
}

struct Inner {
    objects: BTreeMap<Path, Stored>,
    index: BTreeMap<Path, IndexNode>,
    seq: u64,
    modified: SystemTime,
}

struct Stored {
    value: Value,
    modified: SystemTime,
    etag: u64,
}

#[derive(Default)]
struct IndexNode {
    directories: BTreeSet<String>,
    objects: BTreeSet<String>,
}

impl MemoryStore {
    /// Create an empty store with the given id.
    pub fn new(id: impl Into<String>) -> Self {
        MemoryStore {
            id: id.into(),
            inner: RwLock::new(Inner {
                objects: BTreeMap::new(),
                index: BTreeMap::new(),
                seq: 0,
                modified: SystemTime::now(),
            }),
        }
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.inner.read().objects.len()
    }

    /// True if no objects are stored.
    pub fn is_empty(&self) -> bool {
        self.inner.read().objects.is_empty()
    }
}

impl Inner {
    /// Register a leaf in the directory index, creating ancestor nodes.
    fn register(&mut self, path: &Path) {
        let mut name = match path.last_name() {
            Some(n) => n.to_string(),
            None => return,
        };
        let mut parent = path.parent();
        let mut is_object = true;
        loop {
            let node = self.index.entry(parent.clone()).or_default();
            if is_object {
                node.objects.insert(name.clone());
            } else {
                node.directories.insert(name.clone());
            }
            if parent.is_root() {
                break;
            }
            name = parent.last_name().unwrap_or_default().to_string();
            parent = parent.parent();
            is_object = false;
        }
    }

    /// Remove a name from its parent index, pruning emptied ancestors.
    fn unregister(&mut self, path: &Path, is_object: bool) {
        let mut name = match path.last_name() {
            Some(n) => n.to_string(),
            None => return,
        };
        let mut parent = path.parent();
        let mut is_object = is_object;
        loop {
            let Some(node) = self.index.get_mut(&parent) else {
                break;
            };
            if is_object {
                node.objects.remove(&name);
            } else {
                node.directories.remove(&name);
            }
            if !node.directories.is_empty() || !node.objects.is_empty() || parent.is_root() {
                break;
            }
            self.index.remove(&parent);
            name = parent.last_name().unwrap_or_default().to_string();
            parent = parent.parent();
            is_object = false;
        }
    }

    fn bump_modified(&mut self, previous: Option<SystemTime>) -> SystemTime {
        let now = SystemTime::now();
        let floor = previous.unwrap_or(self.modified);
        let stamp = if floor >= now {
            floor + Duration::from_nanos(1)
        } else {
            now
        };
        if stamp > self.modified {
            self.modified = stamp;
        }
        stamp
    }
}

impl Storage for MemoryStore {
    fn info(&self) -> StoreInfo {
        StoreInfo {
            id: self.id.clone(),
            store_type: "storage/memory".to_string(),
            read_only: false,
        }
    }

    fn lookup(&self, path: &Path) -> Option<Metadata> {
        let inner = self.inner.read();
        if path.is_index() {
            if path.is_root() || inner.index.contains_key(path) {
                return Some(Metadata::index(path.clone(), inner.modified, self.id.as_str()));
            }
            return None;
        }
        let stored = inner.objects.get(path)?;
        let (kind, mime_type, size) = match &stored.value {
            Value::Binary(b) => (Kind::Binary, Some(b.mime_type().to_string()), b.size().ok()),
            _ => (Kind::Object, None, None),
        };
        Some(Metadata {
            path: path.clone(),
            kind,
            mime_type,
            size,
            last_modified: stored.modified,
            etag: Some(format!("{:x}", stored.etag)),
            origin: self.id.clone(),
        })
    }

    fn load(&self, path: &Path) -> Result<Option<Value>, StorageError> {
        let inner = self.inner.read();
        if path.is_index() {
            if !path.is_root() && !inner.index.contains_key(path) {
                return Ok(None);
            }
            let node = inner.index.get(path);
            let directories = node
                .map(|n| n.directories.iter().cloned().collect())
                .unwrap_or_default();
            let objects = node
                .map(|n| n.objects.iter().cloned().collect())
                .unwrap_or_default();
            return Ok(Some(Value::Dict(index_dict(directories, objects))));
        }
        Ok(inner.objects.get(path).map(|s| s.value.clone()))
    }

    fn load_all(&self, prefix: &Path) -> LoadAllIter<'_> {
        let paths: Vec<Path> = {
            let inner = self.inner.read();
            inner
                .objects
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect()
        };
        Box::new(paths.into_iter().filter_map(move |p| {
            match self.load(&p) {
                Ok(Some(v)) => Some(Ok((p, v))),
                // Removed between snapshot and visit.
                Ok(None) => None,
                Err(e) => Some(Err(e)),
            }
        }))
    }

    fn store(&self, path: &Path, value: Value) -> Result<(), StorageError> {
        if path.is_index() || path.last_name().is_none() {
            return Err(StorageError::Validation(format!(
                "cannot store at index path {}",
                path
            )));
        }
        let mut inner = self.inner.write();
        inner.seq += 1;
        let etag = inner.seq;
        let previous = inner.objects.get(path).map(|s| s.modified);
        let modified = inner.bump_modified(previous);
        let fresh = inner
            .objects
            .insert(
                path.clone(),
                Stored {
                    value,
                    modified,
                    etag,
                },
            )
            .is_none();
        if fresh {
            inner.register(path);
        }
        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<(), StorageError> {
        let mut inner = self.inner.write();
        if path.is_index() {
            if path.is_root() {
                inner.objects.clear();
                inner.index.clear();
                return Ok(());
            }
            let existed = inner.index.contains_key(path);
            inner.objects.retain(|k, _| !k.starts_with(path));
            inner.index.retain(|k, _| !k.starts_with(path));
            if existed {
                inner.unregister(path, false);
            }
            return Ok(());
        }
        if inner.objects.remove(path).is_some() {
            inner.unregister(path, true);
        }
        Ok(())
    }
}
