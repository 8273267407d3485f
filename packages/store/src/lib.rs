//! Core Stratum: the storage substrate's data model and namespace.
//!
//! This layer defines the vocabulary shared by every backing store:
//! - `Path`: ordered name components plus an index flag
//! - `Value`: the tagged data variant (`Dict` preserves insertion order)
//! - `Binary`: addressable byte blobs with on-demand streams
//! - `Storage`: the leaf store contract
//! - `MemoryStore`: the writable in-memory store
//! - `RootStorage`: the mount table and priority-ordered overlay namespace
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use stratum_store::{path, MemoryStore, Path, RootStorage, Storage, Value};
//!
//! let root = RootStorage::new();
//! let mem = Arc::new(MemoryStore::new("memory"));
//! root.mount(mem, path!("storage/memory/"), false, Some(Path::root()), 50)
//!     .unwrap();
//!
//! root.store(&path!("storage/memory/greeting"), Value::from("hello"))
//!     .unwrap();
//! assert_eq!(
//!     root.load(&path!("greeting")).unwrap(),
//!     Some(Value::from("hello"))
//! );
//! ```

pub use bytes::Bytes;

mod binary;
mod error;
mod memory;
mod metadata;
mod path;
mod root;
mod traits;
mod value;

pub use binary::{Binary, BinaryHandle};
pub use error::StorageError;
pub use memory::MemoryStore;
pub use metadata::{Kind, Metadata, StoreInfo};
pub use path::{Path, PathError};
pub use root::{MountInfo, RootStorage};
pub use traits::{index_dict, LoadAllIter, Storage, IDX_DIRECTORIES, IDX_OBJECTS};
pub use value::{Dict, StorableObject, Value};
