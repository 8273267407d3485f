//! The plug-in manager: discovery, install, load and unload.

use std::collections::{BTreeMap, HashMap};
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::NamedTempFile;

use stratum_file_store::{DirStore, ZipStore};
use stratum_legacy_store::NormalizingStore;
use stratum_store::{
    path, MemoryStore, Path, RootStorage, StorableObject, Storage, Value,
};

use crate::loader::{CodeLoader, DefaultPlugin, Plugin};
use crate::{bundle, PluginError};

/// Reserved id of the always-overlaid base plug-in.
pub const PLUGIN_SYSTEM: &str = "system";

/// Reserved id of the writable overlay plug-in.
pub const PLUGIN_LOCAL: &str = "local";

const PRIORITY_SYSTEM: i32 = 0;
const PRIORITY_MEMORY: i32 = 50;
const PRIORITY_USER: i32 = 100;

/// Platform generation string compared against bundle `platform` fields.
const PLATFORM: &str = env!("CARGO_PKG_VERSION");

/// Owns the root storage, the installed plug-in mounts and the loaded
/// instances.
///
/// Construction mounts a writable memory store at `/storage/memory/`
/// (overlaid at priority 50), mounts every bundle found under the built-in
/// and user plug-in directories at `/storage/plugin/<id>/` (non-overlay,
/// wrapped for legacy normalization), and attaches the reserved overlays:
/// `system` at priority 0 and `local` at priority 100 as the sole read-write
/// overlay. Per-bundle mount failures are logged and skipped.
///
/// Instances are referenced by id; stored metadata never points back at
/// them.
pub struct PluginManager {
    builtin_dir: PathBuf,
    plugin_dir: PathBuf,
    storage: Arc<RootStorage>,
    loader: Box<dyn CodeLoader>,
    instances: Mutex<HashMap<String, Arc<dyn Plugin>>>,
    artifacts: Mutex<Vec<NamedTempFile>>,
}

impl PluginManager {
    /// Create a manager over the given bundle directories.
    pub fn new(
        builtin_dir: impl Into<PathBuf>,
        plugin_dir: impl Into<PathBuf>,
        loader: Box<dyn CodeLoader>,
    ) -> Result<Self, PluginError> {
        let builtin_dir = builtin_dir.into();
        let plugin_dir = plugin_dir.into();
        fs::create_dir_all(&builtin_dir)?;
        fs::create_dir_all(&plugin_dir)?;

        let storage = Arc::new(RootStorage::new());
        storage.mount(
            Arc::new(MemoryStore::new("memory")),
            path!("storage/memory/"),
            false,
            Some(Path::root()),
            PRIORITY_MEMORY,
        )?;

        let manager = PluginManager {
            builtin_dir,
            plugin_dir,
            storage,
            loader,
            instances: Mutex::new(HashMap::new()),
            artifacts: Mutex::new(Vec::new()),
        };
        manager.ensure_local_bundle()?;

        let mut bundles: BTreeMap<String, PathBuf> = BTreeMap::new();
        for (id, source) in discover(&manager.builtin_dir) {
            bundles.insert(id, source);
        }
        for (id, source) in discover(&manager.plugin_dir) {
            bundles.insert(id, source);
        }
        for (id, source) in &bundles {
            if let Err(e) = manager.mount_plugin(id, source) {
                log::warn!("skipping plug-in {}: {}", id, e);
            }
        }

        if manager.is_available(PLUGIN_SYSTEM) {
            if let Err(e) = manager.load_inner(PLUGIN_SYSTEM, PRIORITY_SYSTEM, false) {
                log::warn!("failed loading {} plug-in: {}", PLUGIN_SYSTEM, e);
            }
        }
        if manager.is_available(PLUGIN_LOCAL) {
            if let Err(e) = manager.load_inner(PLUGIN_LOCAL, PRIORITY_USER, true) {
                log::warn!("failed loading {} plug-in: {}", PLUGIN_LOCAL, e);
            }
        }
        Ok(manager)
    }

    /// The root storage backing this manager.
    pub fn storage(&self) -> &Arc<RootStorage> {
        &self.storage
    }

    /// The storage mount path of a plug-in.
    pub fn storage_path(id: &str) -> Path {
        path!("storage/plugin/").child(id, true)
    }

    /// The memory path holding a plug-in's live instance.
    pub fn instance_path(id: &str) -> Path {
        path!("storage/memory/plugin/").child(id, false)
    }

    fn is_reserved(id: &str) -> bool {
        id == PLUGIN_SYSTEM || id == PLUGIN_LOCAL
    }

    /// Check whether a plug-in's storage is mounted.
    pub fn is_available(&self, id: &str) -> bool {
        self.storage.lookup(&Self::storage_path(id)).is_some()
    }

    /// Check whether a plug-in is loaded (instantiated or overlaid).
    pub fn is_loaded(&self, id: &str) -> bool {
        if self.instances.lock().contains_key(id) {
            return true;
        }
        let mount_path = Self::storage_path(id);
        self.storage
            .mounts()
            .iter()
            .any(|m| m.path == mount_path && m.overlay.is_some())
    }

    /// Ids of all loaded plug-in instances.
    pub fn loaded_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.instances.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Install a plug-in bundle from a ZIP archive.
    ///
    /// The archive's configuration is validated, any previous installation
    /// of the same id is unloaded and unmounted, the archive replaces
    /// `plugin_dir/<id>.zip` atomically, and the plug-in storage is mounted
    /// (non-overlay).
    pub fn install(&self, archive: &FsPath) -> Result<String, PluginError> {
        let probe = ZipStore::open(archive)?;
        let config = bundle::load_config_at(&probe, &Path::root())?;
        let id = bundle::config_id(&config)?;
        drop(probe);
        if Self::is_reserved(&id) {
            return Err(PluginError::Validation(format!(
                "cannot install over reserved plug-in '{}'",
                id
            )));
        }

        if self.is_loaded(&id) {
            if let Err(e) = self.unload_inner(&id) {
                log::warn!("unloading {} before reinstall: {}", id, e);
            }
        }
        let mount_path = Self::storage_path(&id);
        if self.storage.is_mounted(&mount_path) {
            self.storage.unmount(&mount_path)?;
        }

        let target = self.plugin_dir.join(format!("{}.zip", id));
        let mut source = fs::File::open(archive)?;
        let mut tmp = NamedTempFile::new_in(&self.plugin_dir)?;
        io::copy(&mut source, tmp.as_file_mut())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&target).map_err(|e| PluginError::Io(e.error))?;

        // A directory bundle of the same id would shadow the fresh archive.
        let stale_dir = self.plugin_dir.join(&id);
        if stale_dir.is_dir() {
            fs::remove_dir_all(&stale_dir)?;
        }

        self.mount_plugin(&id, &target)?;
        log::info!("installed plug-in {}", id);
        Ok(id)
    }

    /// Load a plug-in: attach its overlay and instantiate it.
    pub fn load(&self, id: &str) -> Result<(), PluginError> {
        if Self::is_reserved(id) {
            return Err(PluginError::Validation(format!(
                "cannot force-load reserved plug-in '{}'",
                id
            )));
        }
        self.load_inner(id, PRIORITY_USER, false)
    }

    /// Unload a plug-in: destroy its instance and detach its overlay.
    pub fn unload(&self, id: &str) -> Result<(), PluginError> {
        if Self::is_reserved(id) {
            return Err(PluginError::Validation(format!(
                "cannot unload reserved plug-in '{}'",
                id
            )));
        }
        self.unload_inner(id)
    }

    /// Unload every loaded plug-in, best-effort, then reset the code loader
    /// and drop all tracked code artifacts.
    pub fn unload_all(&self) {
        let ids: Vec<String> = self.instances.lock().keys().cloned().collect();
        for id in ids {
            if let Err(e) = self.unload_inner(&id) {
                log::warn!("failed unloading plug-in {}: {}", id, e);
            }
        }
        self.loader.reset();
        self.artifacts.lock().clear();
    }

    /// Mount a bundle's storage (non-overlay), wrapped for normalization.
    fn mount_plugin(&self, id: &str, source: &FsPath) -> Result<(), PluginError> {
        let inner: Arc<dyn Storage> = if source.is_dir() {
            Arc::new(DirStore::open(id, source, id == PLUGIN_LOCAL)?)
        } else {
            Arc::new(ZipStore::open(source)?)
        };
        let wrapped = Arc::new(NormalizingStore::new(inner));
        let mount_path = Self::storage_path(id);
        if self.storage.is_mounted(&mount_path) {
            self.storage.unmount(&mount_path)?;
        }
        self.storage
            .mount(wrapped, mount_path, false, None, PRIORITY_SYSTEM)?;
        log::debug!("mounted plug-in storage for {}", id);
        Ok(())
    }

    fn load_inner(&self, id: &str, priority: i32, read_write: bool) -> Result<(), PluginError> {
        let mount_path = Self::storage_path(id);
        let config = bundle::load_config_at(&**self.storage(), &mount_path)?;
        if bundle::is_legacy(&config, PLATFORM) {
            log::debug!("plug-in {} targets an older platform generation", id);
        }
        self.storage
            .remount(&mount_path, read_write, Some(Path::root()), priority)?;
        match self.instantiate(id, config) {
            Ok(()) => {
                log::info!("loaded plug-in {}", id);
                Ok(())
            }
            Err(e) => {
                // Roll back the overlay attachment before surfacing.
                if let Err(detach) =
                    self.storage
                        .remount(&mount_path, false, None, PRIORITY_SYSTEM)
                {
                    log::warn!("rollback of {} overlay failed: {}", id, detach);
                }
                Err(e)
            }
        }
    }

    /// Copy code artifacts, construct the instance, run `init`, publish.
    fn instantiate(&self, id: &str, config: stratum_store::Dict) -> Result<(), PluginError> {
        let lib = Self::storage_path(id).descendant(&path!("lib/"));
        let mut temp_files = Vec::new();
        let mut artifact_paths = Vec::new();
        for item in self.storage.load_all(&lib) {
            let (artifact_path, value) = item?;
            let Value::Binary(binary) = value else {
                continue;
            };
            let name = artifact_path.last_name().unwrap_or("artifact");
            let mut tmp = tempfile::Builder::new()
                .prefix(name)
                .tempfile()?;
            let mut reader = binary.open()?;
            io::copy(&mut reader, tmp.as_file_mut())?;
            artifact_paths.push(tmp.path().to_path_buf());
            temp_files.push(tmp);
        }

        let instance: Arc<dyn Plugin> = match bundle::class_name(&config) {
            Some(name) => {
                let name = name.to_string();
                let constructor = self.loader.resolve(&name, &artifact_paths)?;
                constructor(config.clone())?
            }
            None => Arc::new(DefaultPlugin::new(config.clone())),
        };
        instance
            .init()
            .map_err(|e| PluginError::Init(e.to_string()))?;

        let storable: Arc<dyn StorableObject> = instance.clone();
        self.storage
            .store(&Self::instance_path(id), Value::Object(storable))?;
        self.instances.lock().insert(id.to_string(), instance);
        self.artifacts.lock().extend(temp_files);
        Ok(())
    }

    fn unload_inner(&self, id: &str) -> Result<(), PluginError> {
        let mut first_error: Option<PluginError> = None;

        if let Some(instance) = self.instances.lock().remove(id) {
            if let Err(e) = instance.destroy() {
                log::warn!("plug-in {} destroy failed: {}", id, e);
                first_error = Some(PluginError::Init(e.to_string()));
            }
        }
        if let Err(e) = self.storage.remove(&Self::instance_path(id)) {
            log::warn!("dropping instance of {} failed: {}", id, e);
            first_error = first_error.or(Some(e.into()));
        }
        let mount_path = Self::storage_path(id);
        if self.storage.is_mounted(&mount_path) {
            if let Err(e) = self
                .storage
                .remount(&mount_path, false, None, PRIORITY_SYSTEM)
            {
                log::warn!("detaching overlay of {} failed: {}", id, e);
                first_error = first_error.or(Some(e.into()));
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => {
                log::info!("unloaded plug-in {}", id);
                Ok(())
            }
        }
    }

    fn ensure_local_bundle(&self) -> Result<(), PluginError> {
        let dir = self.plugin_dir.join(PLUGIN_LOCAL);
        if !dir.is_dir() {
            fs::create_dir_all(&dir)?;
            fs::write(
                dir.join("plugin.properties"),
                "id=local\nname=Local changes\ndescription=Writable overlay for local modifications.\n",
            )?;
        }
        Ok(())
    }
}

/// Scan a directory for plug-in bundles: subdirectories and `.zip` archives.
fn discover(dir: &FsPath) -> Vec<(String, PathBuf)> {
    let mut found = Vec::new();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("cannot scan {}: {}", dir.display(), e);
            return found;
        }
    };
    for entry in entries.flatten() {
        let source = entry.path();
        if source.is_dir() {
            if let Some(name) = source.file_name().and_then(OsStr::to_str) {
                found.push((name.to_string(), source));
            }
        } else if source.extension().and_then(OsStr::to_str) == Some("zip") {
            if let Some(stem) = source.file_stem().and_then(OsStr::to_str) {
                found.push((stem.to_string(), source));
            }
        }
    }
    found.sort();
    found
}
