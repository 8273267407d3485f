//! Stratum: a pluggable virtual storage substrate.
//!
//! Plug-in bundles contribute files and structured objects; each is mounted
//! under a private subtree and optionally overlaid on the root tree with a
//! priority. Reads resolve through the overlay set in priority order, writes
//! go to the single writable overlay, and legacy data is normalized
//! transparently on load.

pub use stratum_file_store::{DirStore, DocFormat, ZipStore};
pub use stratum_legacy_store::NormalizingStore;
pub use stratum_plugin::{
    CodeLoader, DefaultPlugin, Plugin, PluginError, PluginManager, RegistryCodeLoader,
    PLUGIN_LOCAL, PLUGIN_SYSTEM,
};
pub use stratum_store::{
    path, Binary, BinaryHandle, Dict, Kind, Metadata, MountInfo, Path, PathError, RootStorage,
    StorableObject, Storage, StorageError, StoreInfo, Value,
};
