//! Directory-backed store.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::time::SystemTime;

use parking_lot::RwLock;
use walkdir::WalkDir;

use stratum_store::{
    index_dict, Binary, Kind, LoadAllIter, Metadata, Path, Storage, StorageError, StoreInfo, Value,
};

use crate::codec::{split_data_extension, to_yaml_string, DocFormat};

const DATA_EXTENSIONS: [&str; 4] = ["yaml", "yml", "json", "properties"];

/// A store backed by a directory on disk.
///
/// Leaf paths map to files: a data extension (`.yaml`, `.json`,
/// `.properties`) identifies a structured document and is stripped from the
/// object name; any other file is exposed as a binary under its full name.
/// Index paths map to subdirectories.
///
/// Listings and parsed documents are cached and invalidated when the backing
/// file's mtime changes. Writes, when enabled, serialize structured values as
/// YAML and replace files atomically (temp file + rename).
pub struct DirStore {
    id: String,
    root: PathBuf,
    writable: bool,
    cache: RwLock<Cache>,
}

#[derive(Default)]
struct Cache {
    listings: HashMap<Path, CachedListing>,
    values: HashMap<Path, CachedValue>,
}

struct CachedListing {
    modified: SystemTime,
    directories: Vec<String>,
    objects: Vec<String>,
}

struct CachedValue {
    modified: SystemTime,
    value: Value,
}

/// How a leaf path resolves on disk.
enum Resolved {
    Document(PathBuf, DocFormat),
    Binary(PathBuf),
}

impl DirStore {
    /// Open a store over an existing directory.
    pub fn open(
        id: impl Into<String>,
        root: impl Into<PathBuf>,
        writable: bool,
    ) -> Result<Self, StorageError> {
        let root = root.into();
        let attr = fs::metadata(&root)?;
        if !attr.is_dir() {
            return Err(StorageError::Validation(format!(
                "store root is not a directory: {}",
                root.display()
            )));
        }
        let root = root.canonicalize()?;
        Ok(DirStore {
            id: id.into(),
            root,
            writable,
            cache: RwLock::new(Cache::default()),
        })
    }

    /// The filesystem directory for an index path.
    fn fs_dir(&self, path: &Path) -> PathBuf {
        let mut dir = self.root.clone();
        for component in path.iter() {
            dir.push(component);
        }
        dir
    }

    /// Resolve a leaf path to a file on disk, if present.
    fn resolve(&self, path: &Path) -> Option<Resolved> {
        let name = path.last_name()?;
        let dir = self.fs_dir(&path.parent());
        for ext in DATA_EXTENSIONS {
            let candidate = dir.join(format!("{}.{}", name, ext));
            if candidate.is_file() {
                if let Some(format) = DocFormat::from_extension(ext) {
                    return Some(Resolved::Document(candidate, format));
                }
            }
        }
        let exact = dir.join(name);
        if exact.is_file() && split_data_extension(name).is_none() {
            return Some(Resolved::Binary(exact));
        }
        None
    }

    fn listing(&self, path: &Path) -> Result<Option<(Vec<String>, Vec<String>)>, StorageError> {
        let dir = self.fs_dir(path);
        let attr = match fs::metadata(&dir) {
            Ok(attr) if attr.is_dir() => attr,
            _ => return Ok(None),
        };
        let modified = attr.modified()?;
        {
            let cache = self.cache.read();
            if let Some(cached) = cache.listings.get(path) {
                if cached.modified == modified {
                    return Ok(Some((cached.directories.clone(), cached.objects.clone())));
                }
            }
        }
        log::debug!("listing {}...", dir.display());
        let mut directories = Vec::new();
        let mut objects = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                directories.push(name);
            } else if file_type.is_file() {
                match split_data_extension(&name) {
                    Some((stem, _)) => objects.push(stem.to_string()),
                    None => objects.push(name),
                }
            }
        }
        directories.sort();
        objects.sort();
        objects.dedup();
        let mut cache = self.cache.write();
        cache.listings.insert(
            path.clone(),
            CachedListing {
                modified,
                directories: directories.clone(),
                objects: objects.clone(),
            },
        );
        Ok(Some((directories, objects)))
    }

    fn load_document(&self, path: &Path, file: &PathBuf, format: DocFormat) -> Result<Value, StorageError> {
        let modified = fs::metadata(file)?.modified()?;
        {
            let cache = self.cache.read();
            if let Some(cached) = cache.values.get(path) {
                if cached.modified == modified {
                    return Ok(cached.value.clone());
                }
            }
        }
        log::debug!("reading {}...", file.display());
        let text = fs::read_to_string(file)?;
        let value = format.parse(&text)?;
        let mut cache = self.cache.write();
        cache.values.insert(
            path.clone(),
            CachedValue {
                modified,
                value: value.clone(),
            },
        );
        Ok(value)
    }

    fn invalidate(&self, path: &Path) {
        let mut cache = self.cache.write();
        cache.values.remove(path);
        cache.listings.remove(&path.parent());
    }

    /// Atomically replace `target` with the given content.
    fn write_atomic(&self, target: &std::path::Path, content: &[u8]) -> Result<(), StorageError> {
        let parent = target
            .parent()
            .ok_or_else(|| StorageError::Io(io::Error::other("file has no parent directory")))?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(content)?;
        tmp.as_file().sync_all()?;
        tmp.persist(target).map_err(|e| StorageError::Io(e.error))?;
        Ok(())
    }

    /// The storage path for a file found below the root.
    fn storage_path(&self, file: &std::path::Path) -> Option<Path> {
        let rel = file.strip_prefix(&self.root).ok()?;
        let mut components: Vec<String> = Vec::new();
        for part in rel.components() {
            components.push(part.as_os_str().to_str()?.to_string());
        }
        let last = components.pop()?;
        match split_data_extension(&last) {
            Some((stem, _)) => components.push(stem.to_string()),
            None => components.push(last),
        }
        Path::try_from_components(components, false).ok()
    }
}

impl Storage for DirStore {
    fn info(&self) -> StoreInfo {
        StoreInfo {
            id: self.id.clone(),
            store_type: "storage/dir".to_string(),
            read_only: !self.writable,
        }
    }

    fn lookup(&self, path: &Path) -> Option<Metadata> {
        if path.is_index() {
            let dir = self.fs_dir(path);
            let attr = fs::metadata(&dir).ok()?;
            if !attr.is_dir() {
                return None;
            }
            let modified = attr.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            return Some(Metadata::index(path.clone(), modified, self.id.as_str()));
        }
        match self.resolve(path)? {
            Resolved::Document(file, _) => {
                let attr = fs::metadata(&file).ok()?;
                let modified = attr.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                Some(Metadata {
                    path: path.clone(),
                    kind: Kind::Object,
                    mime_type: None,
                    size: Some(attr.len()),
                    last_modified: modified,
                    etag: Some(etag(&attr)),
                    origin: self.id.clone(),
                })
            }
            Resolved::Binary(file) => {
                let attr = fs::metadata(&file).ok()?;
                let modified = attr.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                let mime = mime_guess::from_path(&file)
                    .first_or_octet_stream()
                    .essence_str()
                    .to_string();
                Some(Metadata {
                    path: path.clone(),
                    kind: Kind::Binary,
                    mime_type: Some(mime),
                    size: Some(attr.len()),
                    last_modified: modified,
                    etag: Some(etag(&attr)),
                    origin: self.id.clone(),
                })
            }
        }
    }

    fn load(&self, path: &Path) -> Result<Option<Value>, StorageError> {
        if path.is_index() {
            return Ok(self
                .listing(path)?
                .map(|(directories, objects)| Value::Dict(index_dict(directories, objects))));
        }
        match self.resolve(path) {
            Some(Resolved::Document(file, format)) => {
                Ok(Some(self.load_document(path, &file, format)?))
            }
            Some(Resolved::Binary(file)) => {
                let mime = mime_guess::from_path(&file)
                    .first_or_octet_stream()
                    .essence_str()
                    .to_string();
                Ok(Some(Value::Binary(Binary::file(file, mime))))
            }
            None => Ok(None),
        }
    }

    fn load_all(&self, prefix: &Path) -> LoadAllIter<'_> {
        if prefix.is_object() {
            let result = self.load(prefix);
            let prefix = prefix.clone();
            return Box::new(
                match result {
                    Ok(Some(value)) => Some(Ok((prefix, value))),
                    Ok(None) => None,
                    Err(e) => Some(Err(e)),
                }
                .into_iter(),
            );
        }
        let base = self.fs_dir(prefix);
        if !base.is_dir() {
            return Box::new(std::iter::empty());
        }
        let walker = WalkDir::new(base).sort_by_file_name().into_iter();
        Box::new(walker.filter_map(move |entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => return Some(Err(StorageError::Io(io::Error::other(e)))),
            };
            if !entry.file_type().is_file() {
                return None;
            }
            let path = self.storage_path(entry.path())?;
            match self.load(&path) {
                Ok(Some(value)) => Some(Ok((path, value))),
                Ok(None) => None,
                Err(e) => Some(Err(e)),
            }
        }))
    }

    fn store(&self, path: &Path, value: Value) -> Result<(), StorageError> {
        if !self.writable {
            return Err(StorageError::NotWritable(path.clone()));
        }
        if path.is_index() {
            return Err(StorageError::Validation(format!(
                "cannot store at index path {}",
                path
            )));
        }
        let name = path
            .last_name()
            .ok_or_else(|| StorageError::Validation("cannot store at the root".to_string()))?;
        let dir = self.fs_dir(&path.parent());
        fs::create_dir_all(&dir)?;
        match value {
            Value::Binary(binary) => {
                let mut content = Vec::new();
                binary.open()?.read_to_end(&mut content)?;
                self.write_atomic(&dir.join(name), &content)?;
            }
            other => {
                let text = to_yaml_string(&other)?;
                log::debug!("writing {}...", dir.join(name).display());
                let file = format!("{}.{}", name, DocFormat::Yaml.extension());
                self.write_atomic(&dir.join(file), text.as_bytes())?;
                // Drop stale documents in other formats so the object stays
                // single-sourced.
                for ext in ["yml", "json", "properties"] {
                    let stale = dir.join(format!("{}.{}", name, ext));
                    if stale.is_file() {
                        let _ = fs::remove_file(stale);
                    }
                }
            }
        }
        self.invalidate(path);
        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<(), StorageError> {
        if !self.writable {
            return Err(StorageError::NotWritable(path.clone()));
        }
        if path.is_index() {
            let dir = self.fs_dir(path);
            match fs::remove_dir_all(&dir) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(StorageError::Io(e)),
            }
            let mut cache = self.cache.write();
            cache.listings.retain(|k, _| !k.starts_with(path));
            cache.values.retain(|k, _| !k.starts_with(path));
            cache.listings.remove(&path.parent());
            return Ok(());
        }
        if let Some(name) = path.last_name() {
            let dir = self.fs_dir(&path.parent());
            for ext in DATA_EXTENSIONS {
                let file = dir.join(format!("{}.{}", name, ext));
                if file.is_file() {
                    fs::remove_file(file)?;
                }
            }
            let exact = dir.join(name);
            if exact.is_file() {
                fs::remove_file(exact)?;
            }
        }
        self.invalidate(path);
        Ok(())
    }

    fn cache_clean(&self, deep: bool) {
        let mut cache = self.cache.write();
        cache.listings.clear();
        if deep {
            cache.values.clear();
        }
    }
}

fn etag(attr: &fs::Metadata) -> String {
    let mtime = attr
        .modified()
        .ok()
        .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("{:x}-{:x}", attr.len(), mtime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use stratum_store::{path, IDX_DIRECTORIES, IDX_OBJECTS};

    fn listing_names(value: &Value, key: &str) -> Vec<String> {
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

    fn fixture() -> (tempfile::TempDir, DirStore) {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("role")).unwrap();
        fs::write(
            dir.path().join("role/admin.properties"),
            "id=admin\nname=Administrator\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("role/guest.yaml"),
            "id: guest\nname: Guest\n",
        )
        .unwrap();
        fs::create_dir_all(dir.path().join("files")).unwrap();
        fs::write(dir.path().join("files/logo.png"), b"not really a png").unwrap();
        let store = DirStore::open("test", dir.path(), true).unwrap();
        (dir, store)
    }

    #[test]
    fn open_rejects_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(DirStore::open("test", missing, false).is_err());
    }

    #[test]
    fn load_strips_data_extension() {
        let (_dir, store) = fixture();
        let admin = store.load(&path!("role/admin")).unwrap().unwrap();
        let dict = admin.as_dict().unwrap();
        assert_eq!(dict.get("id"), Some(&Value::from("admin")));
        assert_eq!(dict.get("name"), Some(&Value::from("Administrator")));
    }

    #[test]
    fn load_yaml_document() {
        let (_dir, store) = fixture();
        let guest = store.load(&path!("role/guest")).unwrap().unwrap();
        assert_eq!(
            guest.as_dict().unwrap().get("id"),
            Some(&Value::from("guest"))
        );
    }

    #[test]
    fn load_binary_by_full_name() {
        let (_dir, store) = fixture();
        let value = store.load(&path!("files/logo.png")).unwrap().unwrap();
        let binary = value.as_binary().unwrap();
        assert_eq!(binary.mime_type(), "image/png");
        let mut content = Vec::new();
        binary.open().unwrap().read_to_end(&mut content).unwrap();
        assert_eq!(content, b"not really a png");
    }

    #[test]
    fn listing_merges_documents_and_binaries() {
        let (_dir, store) = fixture();
        let root = store.load(&Path::root()).unwrap().unwrap();
        assert_eq!(listing_names(&root, IDX_DIRECTORIES), vec!["files", "role"]);

        let roles = store.load(&path!("role/")).unwrap().unwrap();
        assert_eq!(listing_names(&roles, IDX_OBJECTS), vec!["admin", "guest"]);

        let files = store.load(&path!("files/")).unwrap().unwrap();
        assert_eq!(listing_names(&files, IDX_OBJECTS), vec!["logo.png"]);
    }

    #[test]
    fn missing_paths_load_none() {
        let (_dir, store) = fixture();
        assert!(store.load(&path!("role/nobody")).unwrap().is_none());
        assert!(store.load(&path!("nothing/")).unwrap().is_none());
        assert!(store.lookup(&path!("role/nobody")).is_none());
    }

    #[test]
    fn lookup_reports_metadata() {
        let (_dir, store) = fixture();
        let meta = store.lookup(&path!("role/admin")).unwrap();
        assert_eq!(meta.kind, Kind::Object);
        assert!(meta.etag.is_some());

        let meta = store.lookup(&path!("files/logo.png")).unwrap();
        assert_eq!(meta.kind, Kind::Binary);
        assert_eq!(meta.mime_type.as_deref(), Some("image/png"));
        assert_eq!(meta.size, Some(16));

        let meta = store.lookup(&path!("role/")).unwrap();
        assert_eq!(meta.kind, Kind::Index);
    }

    #[test]
    fn store_writes_yaml_atomically() {
        let (dir, store) = fixture();
        let mut value = stratum_store::Dict::new();
        value.insert("id".to_string(), Value::from("fresh"));
        store
            .store(&path!("role/fresh"), Value::Dict(value.clone()))
            .unwrap();

        assert!(dir.path().join("role/fresh.yaml").is_file());
        assert_eq!(
            store.load(&path!("role/fresh")).unwrap(),
            Some(Value::Dict(value))
        );
    }

    #[test]
    fn store_replaces_other_format() {
        let (dir, store) = fixture();
        let mut value = stratum_store::Dict::new();
        value.insert("id".to_string(), Value::from("admin"));
        value.insert("name".to_string(), Value::from("Rewritten"));
        store
            .store(&path!("role/admin"), Value::Dict(value.clone()))
            .unwrap();

        assert!(!dir.path().join("role/admin.properties").exists());
        assert!(dir.path().join("role/admin.yaml").is_file());
        assert_eq!(
            store.load(&path!("role/admin")).unwrap(),
            Some(Value::Dict(value))
        );
    }

    #[test]
    fn store_binary_keeps_full_name() {
        let (dir, store) = fixture();
        store
            .store(
                &path!("files/data.bin"),
                Value::Binary(Binary::inline(&b"\x00\x01"[..], "application/octet-stream")),
            )
            .unwrap();
        assert_eq!(fs::read(dir.path().join("files/data.bin")).unwrap(), b"\x00\x01");
    }

    #[test]
    fn read_only_store_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirStore::open("test", dir.path(), false).unwrap();
        let result = store.store(&path!("x"), Value::from(1i64));
        assert!(matches!(result, Err(StorageError::NotWritable(_))));
        let result = store.remove(&path!("x"));
        assert!(matches!(result, Err(StorageError::NotWritable(_))));
    }

    #[test]
    fn remove_leaf_and_index() {
        let (dir, store) = fixture();
        store.remove(&path!("role/admin")).unwrap();
        assert!(store.load(&path!("role/admin")).unwrap().is_none());
        assert!(!dir.path().join("role/admin.properties").exists());

        store.remove(&path!("files/")).unwrap();
        assert!(store.load(&path!("files/")).unwrap().is_none());
        assert!(!dir.path().join("files").exists());

        // Removing again is a no-op.
        store.remove(&path!("files/")).unwrap();
    }

    #[test]
    fn load_all_walks_sorted() {
        let (_dir, store) = fixture();
        let paths: Vec<Path> = store
            .load_all(&Path::root())
            .map(|r| r.unwrap().0)
            .collect();
        assert_eq!(
            paths,
            vec![
                path!("files/logo.png"),
                path!("role/admin"),
                path!("role/guest"),
            ]
        );
    }

    #[test]
    fn load_all_with_leaf_prefix() {
        let (_dir, store) = fixture();
        let all: Vec<Path> = store
            .load_all(&path!("role/admin"))
            .map(|r| r.unwrap().0)
            .collect();
        assert_eq!(all, vec![path!("role/admin")]);
    }

    #[test]
    fn cache_invalidation_on_mtime_change() {
        let (dir, store) = fixture();
        let first = store.load(&path!("role/admin")).unwrap().unwrap();
        assert_eq!(
            first.as_dict().unwrap().get("name"),
            Some(&Value::from("Administrator"))
        );

        // Rewrite behind the store's back with a clearly newer mtime.
        let file = dir.path().join("role/admin.properties");
        fs::write(&file, "id=admin\nname=Changed\n").unwrap();
        let later = SystemTime::now() + std::time::Duration::from_secs(5);
        let times = fs::FileTimes::new().set_modified(later);
        let handle = fs::OpenOptions::new().append(true).open(&file).unwrap();
        handle.set_times(times).unwrap();

        let second = store.load(&path!("role/admin")).unwrap().unwrap();
        assert_eq!(
            second.as_dict().unwrap().get("name"),
            Some(&Value::from("Changed"))
        );
    }

    #[test]
    fn cache_clean_drops_caches() {
        let (_dir, store) = fixture();
        store.load(&path!("role/")).unwrap();
        store.load(&path!("role/admin")).unwrap();
        store.cache_clean(false);
        store.cache_clean(true);
        // Still readable after cleaning.
        assert!(store.load(&path!("role/admin")).unwrap().is_some());
    }
}
