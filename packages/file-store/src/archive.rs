//! ZIP-archive-backed store.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;

#[cfg(test)]
use std::path::Path as FsPath;
use std::sync::Arc;
use std::time::SystemTime;

use zip::ZipArchive;

use stratum_store::{
    index_dict, Binary, BinaryHandle, Kind, LoadAllIter, Metadata, Path, Storage, StorageError,
    StoreInfo, Value,
};

use crate::codec::{split_data_extension, DocFormat};

/// A read-only store over a ZIP archive.
///
/// The central directory is read once at open into an in-memory index; the
/// archive file is reopened for every byte stream, so no handle is held
/// between reads.
///
/// A legacy bundle carries its `plugin.{properties,yaml,json}` config at the
/// archive root; such an entry is re-indexed under `plugin/<stem>` (stem =
/// archive file stem) so the config is always addressable at its canonical
/// location.
pub struct ZipStore {
    id: String,
    archive: PathBuf,
    modified: SystemTime,
    entries: BTreeMap<Path, Entry>,
    index: BTreeMap<Path, IndexNode>,
}

struct Entry {
    /// Entry name inside the archive.
    name: String,
    size: u64,
    /// Structured format, or `None` for binary entries.
    format: Option<DocFormat>,
    mime_type: String,
}

#[derive(Default)]
struct IndexNode {
    directories: BTreeSet<String>,
    objects: BTreeSet<String>,
}

impl ZipStore {
    /// Open an archive and index its central directory.
    pub fn open(archive: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let archive = archive.into();
        let stem = archive
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| {
                StorageError::Validation(format!(
                    "archive has no usable file name: {}",
                    archive.display()
                ))
            })?
            .to_string();
        let modified = std::fs::metadata(&archive)?.modified()?;
        let mut zip = ZipArchive::new(File::open(&archive)?).map_err(zip_err)?;

        let mut entries = BTreeMap::new();
        let mut index: BTreeMap<Path, IndexNode> = BTreeMap::new();
        index.insert(Path::root(), IndexNode::default());
        for i in 0..zip.len() {
            let file = zip.by_index(i).map_err(zip_err)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            let size = file.size();
            drop(file);

            let Some((path, format)) = Self::entry_path(&stem, &name) else {
                log::warn!("skipping unaddressable entry '{}' in {}", name, archive.display());
                continue;
            };
            let mime_type = match format {
                Some(_) => "text/plain".to_string(),
                None => mime_guess::from_path(&name)
                    .first_or_octet_stream()
                    .essence_str()
                    .to_string(),
            };
            if entries.contains_key(&path) {
                log::warn!("duplicate object {} in {}", path, archive.display());
                continue;
            }
            Self::register(&mut index, &path);
            entries.insert(
                path,
                Entry {
                    name,
                    size,
                    format,
                    mime_type,
                },
            );
        }
        Ok(ZipStore {
            id: stem,
            archive,
            modified,
            entries,
            index,
        })
    }

    /// The archive file stem, used as the default plug-in id.
    pub fn stem(&self) -> &str {
        &self.id
    }

    /// Map an archive entry name to its storage path.
    ///
    /// Structured entries lose their data extension; a root-level legacy
    /// `plugin.<ext>` config is relocated under `plugin/<stem>`.
    fn entry_path(stem: &str, entry_name: &str) -> Option<(Path, Option<DocFormat>)> {
        let mut components: Vec<String> = entry_name
            .split('/')
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
        let last = components.pop()?;
        match split_data_extension(&last) {
            Some((file_stem, format)) => {
                if components.is_empty() && file_stem == "plugin" {
                    components.push("plugin".to_string());
                    components.push(stem.to_string());
                } else {
                    components.push(file_stem.to_string());
                }
                let path = Path::try_from_components(components, false).ok()?;
                Some((path, Some(format)))
            }
            None => {
                components.push(last);
                let path = Path::try_from_components(components, false).ok()?;
                Some((path, None))
            }
        }
    }

    fn register(index: &mut BTreeMap<Path, IndexNode>, path: &Path) {
        let mut name = match path.last_name() {
            Some(n) => n.to_string(),
            None => return,
        };
        let mut parent = path.parent();
        let mut is_object = true;
        loop {
            let node = index.entry(parent.clone()).or_default();
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

    /// Read an entry's full content from a fresh archive handle.
    fn read_entry(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        let mut zip = ZipArchive::new(File::open(&self.archive)?).map_err(zip_err)?;
        let mut file = zip.by_name(name).map_err(zip_err)?;
        let mut content = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut content)?;
        Ok(content)
    }
}

impl Storage for ZipStore {
    fn info(&self) -> StoreInfo {
        StoreInfo {
            id: self.id.clone(),
            store_type: "storage/zip".to_string(),
            read_only: true,
        }
    }

    fn lookup(&self, path: &Path) -> Option<Metadata> {
        if path.is_index() {
            if !self.index.contains_key(path) {
                return None;
            }
            return Some(Metadata::index(path.clone(), self.modified, self.id.as_str()));
        }
        let entry = self.entries.get(path)?;
        Some(Metadata {
            path: path.clone(),
            kind: if entry.format.is_some() {
                Kind::Object
            } else {
                Kind::Binary
            },
            mime_type: entry.format.is_none().then(|| entry.mime_type.clone()),
            size: Some(entry.size),
            last_modified: self.modified,
            etag: None,
            origin: self.id.clone(),
        })
    }

    fn load(&self, path: &Path) -> Result<Option<Value>, StorageError> {
        if path.is_index() {
            return Ok(self.index.get(path).map(|node| {
                Value::Dict(index_dict(
                    node.directories.iter().cloned().collect(),
                    node.objects.iter().cloned().collect(),
                ))
            }));
        }
        let Some(entry) = self.entries.get(path) else {
            return Ok(None);
        };
        match entry.format {
            Some(format) => {
                let content = self.read_entry(&entry.name)?;
                let text = String::from_utf8(content).map_err(|_| {
                    StorageError::Format(format!("entry {} is not valid UTF-8", entry.name))
                })?;
                Ok(Some(format.parse(&text)?))
            }
            None => Ok(Some(Value::Binary(Binary::Handle(Arc::new(
                ZipEntryHandle {
                    archive: self.archive.clone(),
                    entry: entry.name.clone(),
                    mime_type: entry.mime_type.clone(),
                    size: entry.size,
                    modified: self.modified,
                },
            ))))),
        }
    }

    fn load_all(&self, prefix: &Path) -> LoadAllIter<'_> {
        let paths: Vec<Path> = self
            .entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        Box::new(paths.into_iter().filter_map(move |p| {
            match self.load(&p) {
                Ok(Some(v)) => Some(Ok((p, v))),
                Ok(None) => None,
                Err(e) => Some(Err(e)),
            }
        }))
    }

    fn store(&self, path: &Path, _value: Value) -> Result<(), StorageError> {
        Err(StorageError::NotWritable(path.clone()))
    }

    fn remove(&self, path: &Path) -> Result<(), StorageError> {
        Err(StorageError::NotWritable(path.clone()))
    }
}

/// Byte-stream provider for a single archive entry.
///
/// The archive is reopened on every `open()`, keeping the store free of
/// long-lived handles.
#[derive(Debug)]
struct ZipEntryHandle {
    archive: PathBuf,
    entry: String,
    mime_type: String,
    size: u64,
    modified: SystemTime,
}

impl BinaryHandle for ZipEntryHandle {
    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.size)
    }

    fn last_modified(&self) -> io::Result<SystemTime> {
        Ok(self.modified)
    }

    fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        let mut zip = ZipArchive::new(File::open(&self.archive)?).map_err(io::Error::other)?;
        let mut file = zip.by_name(&self.entry).map_err(io::Error::other)?;
        let mut content = Vec::with_capacity(self.size as usize);
        file.read_to_end(&mut content)?;
        Ok(Box::new(io::Cursor::new(content)))
    }
}

fn zip_err(e: zip::result::ZipError) -> StorageError {
    match e {
        zip::result::ZipError::Io(e) => StorageError::Io(e),
        other => StorageError::Format(other.to_string()),
    }
}

/// Build a ZIP archive from `(entry name, content)` pairs, for tests.
#[cfg(test)]
pub fn write_test_archive(
    path: &FsPath,
    entries: &[(&str, &[u8])],
) -> Result<(), StorageError> {
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    let mut writer = zip::ZipWriter::new(File::create(path)?);
    for (name, content) in entries {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .map_err(zip_err)?;
        writer.write_all(content)?;
    }
    writer.finish().map_err(zip_err)?;
    Ok(())
}
