//! Metadata reported by `lookup` without loading payloads.

use std::time::SystemTime;

use crate::Path;

/// What kind of entry a path resolves to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    /// A directory-like container.
    Index,
    /// A structured object.
    Object,
    /// A byte blob.
    Binary,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Index => "index",
            Kind::Object => "object",
            Kind::Binary => "binary",
        }
    }
}

/// Metadata for an existing path.
#[derive(Clone, Debug, PartialEq)]
pub struct Metadata {
    pub path: Path,
    pub kind: Kind,
    pub mime_type: Option<String>,
    pub size: Option<u64>,
    pub last_modified: SystemTime,
    pub etag: Option<String>,
    /// Id of the mount/store that resolved the path.
    pub origin: String,
}

impl Metadata {
    /// Minimal metadata for an index path.
    pub fn index(path: Path, last_modified: SystemTime, origin: impl Into<String>) -> Self {
        Metadata {
            path,
            kind: Kind::Index,
            mime_type: None,
            size: None,
            last_modified,
            etag: None,
            origin: origin.into(),
        }
    }
}

/// Identity of a backing store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreInfo {
    /// Store id, unique within a mount table.
    pub id: String,
    /// Store type string, e.g. `storage/memory` or `storage/zip`.
    pub store_type: String,
    /// True if the store rejects all writes.
    pub read_only: bool,
}
