//! Plug-in instances and the code loader abstraction.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use stratum_store::{Dict, StorableObject};

use crate::PluginError;

/// A live plug-in instance.
///
/// Instances are owned by the manager, published to the substrate as
/// `Value::Object`, and driven through `init`/`destroy` around overlay
/// attachment.
pub trait Plugin: StorableObject {
    /// Called once after the plug-in's overlay is attached.
    fn init(&self) -> Result<(), PluginError>;

    /// Called before the plug-in's overlay is detached.
    fn destroy(&self) -> Result<(), PluginError>;

    /// The configuration dict the instance was created from.
    fn config(&self) -> &Dict;
}

/// A callable producing a plug-in instance from its configuration.
pub type Constructor = Box<dyn Fn(Dict) -> Result<Arc<dyn Plugin>, PluginError> + Send + Sync>;

/// Resolves a constructor name against a set of code artifacts.
///
/// The substrate core only needs this single contract; implementations may
/// load dynamic libraries, interpret scripts, or (as [`RegistryCodeLoader`]
/// does) dispatch to constructors registered in-process.
pub trait CodeLoader: Send + Sync {
    /// Resolve `name` to a constructor, given the plug-in's code artifacts.
    fn resolve(&self, name: &str, artifacts: &[PathBuf]) -> Result<Constructor, PluginError>;

    /// Drop any state accumulated from resolved artifacts.
    fn reset(&self) {}
}

/// The plug-in object used when a bundle declares no constructor.
#[derive(Debug)]
pub struct DefaultPlugin {
    config: Dict,
}

impl DefaultPlugin {
    pub fn new(config: Dict) -> Self {
        DefaultPlugin { config }
    }
}

impl StorableObject for DefaultPlugin {
    fn type_name(&self) -> &str {
        "plugin"
    }
}

impl Plugin for DefaultPlugin {
    fn init(&self) -> Result<(), PluginError> {
        Ok(())
    }

    fn destroy(&self) -> Result<(), PluginError> {
        Ok(())
    }

    fn config(&self) -> &Dict {
        &self.config
    }
}

type RegisteredConstructor =
    Arc<dyn Fn(Dict) -> Result<Arc<dyn Plugin>, PluginError> + Send + Sync>;

/// A code loader dispatching to constructors registered by name.
///
/// Artifact paths are accepted but unused; this loader exists for embedders
/// that compile their plug-in code into the host process and for tests.
#[derive(Default)]
pub struct RegistryCodeLoader {
    constructors: Mutex<HashMap<String, RegisteredConstructor>>,
}

impl RegistryCodeLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor under a name.
    pub fn register<F>(&self, name: impl Into<String>, constructor: F)
    where
        F: Fn(Dict) -> Result<Arc<dyn Plugin>, PluginError> + Send + Sync + 'static,
    {
        self.constructors
            .lock()
            .insert(name.into(), Arc::new(constructor));
    }
}

impl CodeLoader for RegistryCodeLoader {
    fn resolve(&self, name: &str, _artifacts: &[PathBuf]) -> Result<Constructor, PluginError> {
        let registered = self
            .constructors
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| PluginError::CodeLoad {
                name: name.to_string(),
                cause: "constructor not registered".to_string(),
            })?;
        Ok(Box::new(move |config| registered(config)))
    }
}
