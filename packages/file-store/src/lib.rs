//! File-backed Stratum stores.
//!
//! This crate provides the disk-facing half of the substrate:
//! - `DocFormat` and codecs: JSON, YAML and properties documents
//! - `DirStore`: a directory tree on disk, optionally writable
//! - `ZipStore`: a read-only ZIP archive with the legacy-bundle shim
//!
//! # Example
//!
//! ```rust,no_run
//! use stratum_file_store::DirStore;
//! use stratum_store::{path, Storage};
//!
//! let store = DirStore::open("plugins", "/var/lib/app/plugin", false)?;
//! let config = store.load(&path!("plugin/demo"))?;
//! # Ok::<(), stratum_store::StorageError>(())
//! ```

pub mod codec;

mod archive;
mod dir;

pub use archive::ZipStore;
pub use codec::DocFormat;
pub use dir::DirStore;
