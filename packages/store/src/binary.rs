//! Addressable byte blobs.

use std::fmt;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use sha2::{Digest, Sha256};

/// A provider of binary content that lives outside the value tree.
///
/// Archive-backed stores implement this to hand out blobs without holding
/// their container open; [`Binary::open`] goes back to the source each time.
pub trait BinaryHandle: fmt::Debug + Send + Sync {
    /// MIME type of the content.
    fn mime_type(&self) -> &str;

    /// Content length in bytes.
    fn size(&self) -> io::Result<u64>;

    /// Last modification time of the content.
    fn last_modified(&self) -> io::Result<SystemTime>;

    /// Open a fresh byte stream over the content.
    fn open(&self) -> io::Result<Box<dyn Read + Send>>;
}

/// An addressable byte blob.
///
/// A binary is either held inline, backed by a file on disk, or provided by a
/// [`BinaryHandle`] (e.g. a ZIP archive entry). Each `open()` produces an
/// independent stream; the underlying source is reopened per read, so streams
/// never pin a shared handle.
#[derive(Clone, Debug)]
pub enum Binary {
    /// Bytes held in memory.
    Inline {
        bytes: Bytes,
        mime_type: String,
        modified: SystemTime,
    },
    /// A file on disk, read on demand.
    File { path: PathBuf, mime_type: String },
    /// Content provided by an external source.
    Handle(Arc<dyn BinaryHandle>),
}

impl Binary {
    /// Create an inline binary from bytes.
    pub fn inline(bytes: impl Into<Bytes>, mime_type: impl Into<String>) -> Self {
        Binary::Inline {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
            modified: SystemTime::now(),
        }
    }

    /// Create a file-backed binary.
    pub fn file(path: impl Into<PathBuf>, mime_type: impl Into<String>) -> Self {
        Binary::File {
            path: path.into(),
            mime_type: mime_type.into(),
        }
    }

    /// MIME type of the content.
    pub fn mime_type(&self) -> &str {
        match self {
            Binary::Inline { mime_type, .. } => mime_type,
            Binary::File { mime_type, .. } => mime_type,
            Binary::Handle(h) => h.mime_type(),
        }
    }

    /// Content length in bytes.
    pub fn size(&self) -> io::Result<u64> {
        match self {
            Binary::Inline { bytes, .. } => Ok(bytes.len() as u64),
            Binary::File { path, .. } => Ok(std::fs::metadata(path)?.len()),
            Binary::Handle(h) => h.size(),
        }
    }

    /// Last modification time of the content.
    pub fn last_modified(&self) -> io::Result<SystemTime> {
        match self {
            Binary::Inline { modified, .. } => Ok(*modified),
            Binary::File { path, .. } => std::fs::metadata(path)?.modified(),
            Binary::Handle(h) => h.last_modified(),
        }
    }

    /// Open a fresh byte stream over the content.
    pub fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        match self {
            Binary::Inline { bytes, .. } => Ok(Box::new(io::Cursor::new(bytes.clone()))),
            Binary::File { path, .. } => Ok(Box::new(std::fs::File::open(path)?)),
            Binary::Handle(h) => h.open(),
        }
    }

    /// Hex-encoded SHA-256 digest of the content, computed from a fresh
    /// stream.
    pub fn sha256(&self) -> io::Result<String> {
        let mut reader = self.open()?;
        let mut hasher = Sha256::new();
        io::copy(&mut reader, &mut hasher)?;
        let digest = hasher.finalize();
        Ok(digest.iter().map(|b| format!("{:02x}", b)).collect())
    }
}

impl PartialEq for Binary {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Binary::Inline {
                    bytes: a, mime_type: am, ..
                },
                Binary::Inline {
                    bytes: b, mime_type: bm, ..
                },
            ) => a == b && am == bm,
            (Binary::File { path: a, .. }, Binary::File { path: b, .. }) => a == b,
            (Binary::Handle(a), Binary::Handle(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_roundtrip() {
        let bin = Binary::inline(&b"hello"[..], "text/plain");
        assert_eq!(bin.mime_type(), "text/plain");
        assert_eq!(bin.size().unwrap(), 5);
        assert!(bin.last_modified().is_ok());

        let mut content = Vec::new();
        bin.open().unwrap().read_to_end(&mut content).unwrap();
        assert_eq!(content, b"hello");
    }

    #[test]
    fn open_streams_are_independent() {
        let bin = Binary::inline(&b"abc"[..], "text/plain");
        let mut first = String::new();
        let mut second = String::new();
        bin.open().unwrap().read_to_string(&mut first).unwrap();
        bin.open().unwrap().read_to_string(&mut second).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn sha256_of_known_content() {
        let bin = Binary::inline(&b"abc"[..], "text/plain");
        assert_eq!(
            bin.sha256().unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn equality_compares_content_source() {
        let a = Binary::inline(&b"x"[..], "text/plain");
        let b = Binary::inline(&b"x"[..], "text/plain");
        let c = Binary::inline(&b"y"[..], "text/plain");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
