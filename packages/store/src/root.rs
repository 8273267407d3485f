//! RootStorage: the mount table and unified namespace.
//!
//! Stores are mounted at fixed index paths (`/storage/memory/`,
//! `/storage/plugin/<id>/`, ...) and optionally overlaid on the root tree
//! with a priority. Reads under a mount path resolve directly against that
//! mount; all other reads iterate the overlay set in priority order. Leaf
//! reads return the first hit, index reads merge partial listings from every
//! overlay.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexSet;
use parking_lot::RwLock;

use crate::{
    Dict, LoadAllIter, Metadata, Path, Storage, StorageError, StoreInfo, Value, IDX_DIRECTORIES,
    IDX_OBJECTS,
};

#[derive(Clone)]
struct Mount {
    store: Arc<dyn Storage>,
    path: Path,
    read_write: bool,
    overlay: Option<Path>,
    priority: i32,
    order: u64,
}

impl Mount {
    fn id(&self) -> String {
        self.store.info().id
    }
}

/// Description of one mount table entry.
#[derive(Clone, Debug, PartialEq)]
pub struct MountInfo {
    pub id: String,
    pub path: Path,
    pub store_type: String,
    pub read_only: bool,
    pub read_write: bool,
    pub overlay: Option<Path>,
    pub priority: i32,
}

/// The unified hierarchical namespace over a set of mounted stores.
///
/// The mount table is guarded by a reader-writer lock: reads acquire shared
/// access, `mount`/`unmount`/`remount` acquire exclusive access. Each
/// mounted store keeps its own interior synchronization.
pub struct RootStorage {
    mounts: RwLock<Vec<Mount>>,
    seq: AtomicU64,
}

impl RootStorage {
    /// Create an empty root storage.
    pub fn new() -> Self {
        RootStorage {
            mounts: RwLock::new(Vec::new()),
            seq: AtomicU64::new(0),
        }
    }

    /// Mount a store at a fixed index path.
    ///
    /// Rejects a mount path that overlaps an existing mount (either being a
    /// prefix of the other), and a second read-write overlay. A `read_write`
    /// mount must carry an overlay root; the flag marks the overlay write
    /// target, not the store's own capability.
    pub fn mount(
        &self,
        store: Arc<dyn Storage>,
        path: Path,
        read_write: bool,
        overlay: Option<Path>,
        priority: i32,
    ) -> Result<(), StorageError> {
        if !path.is_index() {
            return Err(StorageError::Validation(format!(
                "mount path must be an index: {}",
                path
            )));
        }
        if read_write && overlay.is_none() {
            return Err(StorageError::Validation(format!(
                "read-write mount {} requires an overlay root",
                path
            )));
        }
        let mut mounts = self.mounts.write();
        for m in mounts.iter() {
            if m.path.starts_with(&path) || path.starts_with(&m.path) {
                return Err(StorageError::Conflict(format!(
                    "mount path {} overlaps existing mount {}",
                    path, m.path
                )));
            }
        }
        if read_write && mounts.iter().any(|m| m.read_write && m.overlay.is_some()) {
            return Err(StorageError::Conflict(format!(
                "a read-write overlay is already mounted, rejecting {}",
                path
            )));
        }
        log::debug!(
            "mounting {} at {} (overlay: {:?}, priority: {})",
            store.info().id,
            path,
            overlay,
            priority
        );
        mounts.push(Mount {
            store,
            path,
            read_write,
            overlay,
            priority,
            order: self.seq.fetch_add(1, Ordering::Relaxed),
        });
        Ok(())
    }

    /// Remove the mount at an exact path.
    pub fn unmount(&self, path: &Path) -> Result<(), StorageError> {
        let mut mounts = self.mounts.write();
        match mounts.iter().position(|m| m.path == *path) {
            Some(i) => {
                let removed = mounts.remove(i);
                log::debug!("unmounted {} from {}", removed.id(), path);
                Ok(())
            }
            None => Err(StorageError::Conflict(format!("not mounted: {}", path))),
        }
    }

    /// Atomically update the overlay attributes of an existing mount.
    pub fn remount(
        &self,
        path: &Path,
        read_write: bool,
        overlay: Option<Path>,
        priority: i32,
    ) -> Result<(), StorageError> {
        if read_write && overlay.is_none() {
            return Err(StorageError::Validation(format!(
                "read-write mount {} requires an overlay root",
                path
            )));
        }
        let mut mounts = self.mounts.write();
        let i = mounts
            .iter()
            .position(|m| m.path == *path)
            .ok_or_else(|| StorageError::Conflict(format!("not mounted: {}", path)))?;
        if read_write
            && mounts
                .iter()
                .enumerate()
                .any(|(j, m)| j != i && m.read_write && m.overlay.is_some())
        {
            return Err(StorageError::Conflict(format!(
                "a read-write overlay is already mounted, rejecting {}",
                path
            )));
        }
        let m = &mut mounts[i];
        m.read_write = read_write;
        m.overlay = overlay;
        m.priority = priority;
        log::debug!(
            "remounted {} (overlay: {:?}, priority: {}, read_write: {})",
            path,
            m.overlay,
            priority,
            read_write
        );
        Ok(())
    }

    /// List all mount table entries.
    pub fn mounts(&self) -> Vec<MountInfo> {
        self.mounts
            .read()
            .iter()
            .map(|m| {
                let info = m.store.info();
                MountInfo {
                    id: info.id,
                    path: m.path.clone(),
                    store_type: info.store_type,
                    read_only: info.read_only,
                    read_write: m.read_write,
                    overlay: m.overlay.clone(),
                    priority: m.priority,
                }
            })
            .collect()
    }

    /// Check whether a store is mounted at the exact path.
    pub fn is_mounted(&self, path: &Path) -> bool {
        self.mounts.read().iter().any(|m| m.path == *path)
    }

    /// Overlay mounts, highest priority first, insertion order breaking ties.
    fn sorted_overlays(mounts: &[Mount]) -> Vec<&Mount> {
        let mut overlays: Vec<&Mount> = mounts.iter().filter(|m| m.overlay.is_some()).collect();
        overlays.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.order.cmp(&b.order)));
        overlays
    }

    fn find_direct<'a>(mounts: &'a [Mount], path: &Path) -> Option<&'a Mount> {
        mounts.iter().find(|m| path.starts_with(&m.path))
    }

    /// Merge a lower-priority partial index into an accumulated one.
    ///
    /// Listings are unioned preserving first-seen order; any other key is
    /// taken from the highest-priority non-null occurrence.
    fn merge_index(acc: &mut Dict, next: &Dict) {
        for key in [IDX_DIRECTORIES, IDX_OBJECTS] {
            let mut names: IndexSet<String> = acc
                .get(key)
                .and_then(Value::as_array)
                .map(|a| {
                    a.iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default();
            if let Some(arr) = next.get(key).and_then(Value::as_array) {
                for v in arr {
                    if let Some(s) = v.as_str() {
                        names.insert(s.to_string());
                    }
                }
            }
            acc.insert(
                key.to_string(),
                Value::Array(names.into_iter().map(Value::Str).collect()),
            );
        }
        for (key, value) in next {
            if key == IDX_DIRECTORIES || key == IDX_OBJECTS || value.is_null() {
                continue;
            }
            if acc.get(key).map(Value::is_null).unwrap_or(true) {
                acc.insert(key.clone(), value.clone());
            }
        }
    }
}

impl Default for RootStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for RootStorage {
    fn info(&self) -> StoreInfo {
        StoreInfo {
            id: "root".to_string(),
            store_type: "storage/overlay".to_string(),
            read_only: false,
        }
    }

    fn lookup(&self, path: &Path) -> Option<Metadata> {
        let mounts = self.mounts.read();
        if let Some(m) = Self::find_direct(&mounts, path) {
            let rel = path.strip_prefix(&m.path)?;
            let mut meta = m.store.lookup(&rel)?;
            meta.path = path.clone();
            return Some(meta);
        }
        for m in Self::sorted_overlays(&mounts) {
            let Some(root) = m.overlay.as_ref() else {
                continue;
            };
            if let Some(local) = path.strip_prefix(root) {
                if let Some(mut meta) = m.store.lookup(&local) {
                    meta.path = path.clone();
                    return Some(meta);
                }
            }
        }
        None
    }

    fn load(&self, path: &Path) -> Result<Option<Value>, StorageError> {
        let mounts = self.mounts.read();
        if let Some(m) = Self::find_direct(&mounts, path) {
            let rel = match path.strip_prefix(&m.path) {
                Some(rel) => rel,
                None => return Ok(None),
            };
            return m.store.load(&rel);
        }
        let overlays = Self::sorted_overlays(&mounts);
        if path.is_index() {
            let mut merged: Option<Dict> = None;
            for m in overlays {
                let Some(local) = m.overlay.as_ref().and_then(|r| path.strip_prefix(r)) else {
                    continue;
                };
                match m.store.load(&local) {
                    Ok(Some(Value::Dict(partial))) => {
                        let acc = merged.get_or_insert_with(Dict::new);
                        Self::merge_index(acc, &partial);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        log::warn!("overlay {} failed loading {}: {}", m.id(), path, e);
                    }
                }
            }
            return Ok(merged.map(Value::Dict));
        }
        for m in overlays {
            let Some(local) = m.overlay.as_ref().and_then(|r| path.strip_prefix(r)) else {
                continue;
            };
            match m.store.load(&local) {
                Ok(Some(value)) => return Ok(Some(value)),
                Ok(None) => {}
                Err(e) => {
                    log::warn!("overlay {} failed loading {}: {}", m.id(), path, e);
                }
            }
        }
        Ok(None)
    }

    fn load_all(&self, prefix: &Path) -> LoadAllIter<'_> {
        let mut sources: VecDeque<(Arc<dyn Storage>, Path, Path)> = VecDeque::new();
        {
            let mounts = self.mounts.read();
            if let Some(m) = Self::find_direct(&mounts, prefix) {
                if let Some(rel) = prefix.strip_prefix(&m.path) {
                    sources.push_back((m.store.clone(), rel, m.path.clone()));
                }
            } else {
                for m in Self::sorted_overlays(&mounts) {
                    let Some(root) = m.overlay.as_ref() else {
                        continue;
                    };
                    if let Some(local) = prefix.strip_prefix(root) {
                        sources.push_back((m.store.clone(), local, root.clone()));
                    } else if root.starts_with(prefix) {
                        sources.push_back((m.store.clone(), Path::root(), root.clone()));
                    }
                }
            }
        }
        Box::new(RootLoadAll {
            sources,
            buffer: VecDeque::new(),
            seen: HashSet::new(),
        })
    }

    fn store(&self, path: &Path, value: Value) -> Result<(), StorageError> {
        let mounts = self.mounts.read();
        if let Some(m) = Self::find_direct(&mounts, path) {
            if m.store.info().read_only {
                return Err(StorageError::NotWritable(path.clone()));
            }
            let rel = path
                .strip_prefix(&m.path)
                .ok_or_else(|| StorageError::NotWritable(path.clone()))?;
            return m.store.store(&rel, value);
        }
        for m in Self::sorted_overlays(&mounts) {
            if !m.read_write {
                continue;
            }
            if let Some(local) = m.overlay.as_ref().and_then(|r| path.strip_prefix(r)) {
                return m.store.store(&local, value);
            }
        }
        Err(StorageError::NotWritable(path.clone()))
    }

    fn remove(&self, path: &Path) -> Result<(), StorageError> {
        let mounts = self.mounts.read();
        if let Some(m) = Self::find_direct(&mounts, path) {
            if m.store.info().read_only {
                return Err(StorageError::NotWritable(path.clone()));
            }
            let rel = path
                .strip_prefix(&m.path)
                .ok_or_else(|| StorageError::NotWritable(path.clone()))?;
            return m.store.remove(&rel);
        }
        for m in Self::sorted_overlays(&mounts) {
            if !m.read_write {
                continue;
            }
            if let Some(local) = m.overlay.as_ref().and_then(|r| path.strip_prefix(r)) {
                return m.store.remove(&local);
            }
        }
        Err(StorageError::NotWritable(path.clone()))
    }

    fn cache_clean(&self, deep: bool) {
        for m in self.mounts.read().iter() {
            m.store.cache_clean(deep);
        }
    }
}

/// Streaming union over the selected sources, deduplicating by path with the
/// first (highest-priority) winner. Sources drain one at a time, so dropping
/// the iterator cancels the remaining walk.
struct RootLoadAll {
    sources: VecDeque<(Arc<dyn Storage>, Path, Path)>,
    buffer: VecDeque<Result<(Path, Value), StorageError>>,
    seen: HashSet<Path>,
}

impl Iterator for RootLoadAll {
    type Item = Result<(Path, Value), StorageError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            while let Some(item) = self.buffer.pop_front() {
                match item {
                    Ok((path, value)) => {
                        if self.seen.insert(path.clone()) {
                            return Some(Ok((path, value)));
                        }
                    }
                    Err(e) => return Some(Err(e)),
                }
            }
            let (store, local, base) = self.sources.pop_front()?;
            self.buffer = store
                .load_all(&local)
                .map(|r| r.map(|(p, v)| (base.descendant(&p), v)))
                .collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{path, Kind, MemoryStore};

    fn dict(entries: &[(&str, Value)]) -> Value {
        let mut d = Dict::new();
        for (k, v) in entries {
            d.insert(k.to_string(), v.clone());
        }
        Value::Dict(d)
    }

    fn listing(value: &Value, key: &str) -> Vec<String> {
        value
            .as_dict()
            .and_then(|d| d.get(key))
            .and_then(Value::as_array)
            .map(|a| {
                a.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn two_overlay_setup() -> (RootStorage, Arc<MemoryStore>, Arc<MemoryStore>) {
        let root = RootStorage::new();
        let a = Arc::new(MemoryStore::new("a"));
        let b = Arc::new(MemoryStore::new("b"));
        root.mount(a.clone(), path!("storage/a/"), false, Some(Path::root()), 50)
            .unwrap();
        root.mount(b.clone(), path!("storage/b/"), false, Some(Path::root()), 100)
            .unwrap();
        (root, a, b)
    }

    #[test]
    fn overlay_priority_wins() {
        // Mount A at priority 50 and B at priority 100, both overlaying the
        // root; the higher priority value shadows the lower one until removed.
        let (root, _a, _b) = two_overlay_setup();
        root.store(&path!("storage/a/x"), dict(&[("v", Value::from(1i64))]))
            .unwrap();
        root.store(&path!("storage/b/x"), dict(&[("v", Value::from(2i64))]))
            .unwrap();

        assert_eq!(
            root.load(&path!("x")).unwrap(),
            Some(dict(&[("v", Value::from(2i64))]))
        );

        root.remove(&path!("storage/b/x")).unwrap();
        assert_eq!(
            root.load(&path!("x")).unwrap(),
            Some(dict(&[("v", Value::from(1i64))]))
        );
    }

    #[test]
    fn index_merge_prefers_higher_priority_order() {
        let (root, a, b) = two_overlay_setup();
        a.store(&path!("role/admin"), Value::dict()).unwrap();
        b.store(&path!("role/guest"), Value::dict()).unwrap();

        let merged = root.load(&path!("role/")).unwrap().unwrap();
        assert_eq!(listing(&merged, IDX_OBJECTS), vec!["guest", "admin"]);
        assert!(listing(&merged, IDX_DIRECTORIES).is_empty());
    }

    #[test]
    fn index_merge_suppresses_duplicates() {
        let (root, a, b) = two_overlay_setup();
        a.store(&path!("role/admin"), Value::from(1i64)).unwrap();
        b.store(&path!("role/admin"), Value::from(2i64)).unwrap();
        a.store(&path!("role/extra"), Value::from(3i64)).unwrap();

        let merged = root.load(&path!("role/")).unwrap().unwrap();
        assert_eq!(listing(&merged, IDX_OBJECTS), vec!["admin", "extra"]);
    }

    #[test]
    fn equal_priority_breaks_ties_by_insertion() {
        let root = RootStorage::new();
        let first = Arc::new(MemoryStore::new("first"));
        let second = Arc::new(MemoryStore::new("second"));
        first.store(&path!("x"), Value::from("first")).unwrap();
        second.store(&path!("x"), Value::from("second")).unwrap();

        root.mount(first, path!("storage/first/"), false, Some(Path::root()), 100)
            .unwrap();
        root.mount(second, path!("storage/second/"), false, Some(Path::root()), 100)
            .unwrap();

        assert_eq!(root.load(&path!("x")).unwrap(), Some(Value::from("first")));
    }

    #[test]
    fn missing_path_loads_none() {
        let (root, _a, _b) = two_overlay_setup();
        assert_eq!(root.load(&path!("missing")).unwrap(), None);
        assert_eq!(root.load(&path!("missing/")).unwrap(), None);
        assert!(root.lookup(&path!("missing")).is_none());
    }

    #[test]
    fn overlapping_mounts_rejected() {
        let root = RootStorage::new();
        root.mount(
            Arc::new(MemoryStore::new("a")),
            path!("storage/a/"),
            false,
            None,
            0,
        )
        .unwrap();

        let nested = root.mount(
            Arc::new(MemoryStore::new("b")),
            path!("storage/a/sub/"),
            false,
            None,
            0,
        );
        assert!(matches!(nested, Err(StorageError::Conflict(_))));

        let enclosing = root.mount(
            Arc::new(MemoryStore::new("c")),
            path!("storage/"),
            false,
            None,
            0,
        );
        assert!(matches!(enclosing, Err(StorageError::Conflict(_))));

        let duplicate = root.mount(
            Arc::new(MemoryStore::new("d")),
            path!("storage/a/"),
            false,
            None,
            0,
        );
        assert!(matches!(duplicate, Err(StorageError::Conflict(_))));
    }

    #[test]
    fn second_read_write_overlay_rejected() {
        let root = RootStorage::new();
        root.mount(
            Arc::new(MemoryStore::new("a")),
            path!("storage/a/"),
            true,
            Some(Path::root()),
            100,
        )
        .unwrap();

        let result = root.mount(
            Arc::new(MemoryStore::new("b")),
            path!("storage/b/"),
            true,
            Some(Path::root()),
            100,
        );
        assert!(matches!(result, Err(StorageError::Conflict(_))));
    }

    #[test]
    fn mount_unmount_mount_is_idempotent() {
        let root = RootStorage::new();
        let store = Arc::new(MemoryStore::new("a"));
        let at = path!("storage/a/");

        root.mount(store.clone(), at.clone(), false, Some(Path::root()), 50)
            .unwrap();
        let before = root.mounts();
        root.unmount(&at).unwrap();
        assert!(!root.is_mounted(&at));
        root.mount(store, at.clone(), false, Some(Path::root()), 50)
            .unwrap();
        assert_eq!(root.mounts(), before);
    }

    #[test]
    fn unmount_missing_is_conflict() {
        let root = RootStorage::new();
        let result = root.unmount(&path!("storage/ghost/"));
        assert!(matches!(result, Err(StorageError::Conflict(_))));
    }

    #[test]
    fn remount_updates_overlay_attributes() {
        let root = RootStorage::new();
        let store = Arc::new(MemoryStore::new("a"));
        store.store(&path!("x"), Value::from(1i64)).unwrap();
        root.mount(store, path!("storage/a/"), false, None, 0).unwrap();

        // Not overlaid yet, so the root tree does not see it.
        assert_eq!(root.load(&path!("x")).unwrap(), None);

        root.remount(&path!("storage/a/"), false, Some(Path::root()), 100)
            .unwrap();
        assert_eq!(root.load(&path!("x")).unwrap(), Some(Value::from(1i64)));

        // Repeating the same remount changes nothing.
        root.remount(&path!("storage/a/"), false, Some(Path::root()), 100)
            .unwrap();
        assert_eq!(root.load(&path!("x")).unwrap(), Some(Value::from(1i64)));

        root.remount(&path!("storage/a/"), false, None, 0).unwrap();
        assert_eq!(root.load(&path!("x")).unwrap(), None);
    }

    #[test]
    fn overlay_write_routes_to_read_write_overlay() {
        let root = RootStorage::new();
        let plain = Arc::new(MemoryStore::new("plain"));
        let writable = Arc::new(MemoryStore::new("writable"));
        root.mount(plain, path!("storage/plain/"), false, Some(Path::root()), 100)
            .unwrap();
        root.mount(
            writable.clone(),
            path!("storage/writable/"),
            true,
            Some(Path::root()),
            50,
        )
        .unwrap();

        root.store(&path!("procedure/hello"), Value::from("body"))
            .unwrap();
        assert_eq!(
            writable.load(&path!("procedure/hello")).unwrap(),
            Some(Value::from("body"))
        );

        root.remove(&path!("procedure/hello")).unwrap();
        assert_eq!(writable.load(&path!("procedure/hello")).unwrap(), None);
    }

    #[test]
    fn overlay_write_without_target_is_not_writable() {
        let (root, _a, _b) = two_overlay_setup();
        let result = root.store(&path!("procedure/hello"), Value::from("x"));
        assert!(matches!(result, Err(StorageError::NotWritable(_))));
    }

    #[test]
    fn direct_write_checks_store_capability() {
        let root = RootStorage::new();
        root.mount(
            Arc::new(MemoryStore::new("mem")),
            path!("storage/memory/"),
            false,
            Some(Path::root()),
            50,
        )
        .unwrap();

        // The memory store is writable even though the mount is not the
        // read-write overlay.
        root.store(&path!("storage/memory/plugin/demo"), Value::from("obj"))
            .unwrap();
        assert_eq!(
            root.load(&path!("storage/memory/plugin/demo")).unwrap(),
            Some(Value::from("obj"))
        );
    }

    #[test]
    fn lookup_reports_winning_overlay() {
        let (root, a, b) = two_overlay_setup();
        a.store(&path!("x"), Value::from(1i64)).unwrap();
        b.store(&path!("x"), Value::from(2i64)).unwrap();

        let meta = root.lookup(&path!("x")).unwrap();
        assert_eq!(meta.origin, "b");
        assert_eq!(meta.path, path!("x"));
    }

    #[test]
    fn lookup_on_mount_path_reports_index() {
        let (root, _a, _b) = two_overlay_setup();
        let meta = root.lookup(&path!("storage/a/")).unwrap();
        assert_eq!(meta.kind, Kind::Index);
        assert_eq!(meta.origin, "a");
    }

    #[test]
    fn load_all_dedups_by_priority() {
        let (root, a, b) = two_overlay_setup();
        a.store(&path!("role/admin"), Value::from("low")).unwrap();
        b.store(&path!("role/admin"), Value::from("high")).unwrap();
        a.store(&path!("role/only"), Value::from("only")).unwrap();

        let all: Vec<(Path, Value)> = root
            .load_all(&path!("role/"))
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(
            all,
            vec![
                (path!("role/admin"), Value::from("high")),
                (path!("role/only"), Value::from("only")),
            ]
        );
    }

    #[test]
    fn load_all_under_mount_path_is_direct() {
        let (root, a, _b) = two_overlay_setup();
        a.store(&path!("role/admin"), Value::from(1i64)).unwrap();

        let all: Vec<(Path, Value)> = root
            .load_all(&path!("storage/a/"))
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(all, vec![(path!("storage/a/role/admin"), Value::from(1i64))]);
    }

    #[test]
    fn mounts_lists_entries() {
        let (root, _a, _b) = two_overlay_setup();
        let mounts = root.mounts();
        assert_eq!(mounts.len(), 2);
        assert_eq!(mounts[0].id, "a");
        assert_eq!(mounts[0].store_type, "storage/memory");
        assert_eq!(mounts[1].priority, 100);
    }
}
