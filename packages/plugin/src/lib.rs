//! Plug-in lifecycle management on top of the Stratum substrate.
//!
//! A plug-in is a bundle (directory or ZIP archive) contributing structured
//! objects, binaries and optional code artifacts. The manager mounts each
//! bundle's storage into the substrate, attaches overlays on load, and owns
//! the live instances produced through the [`CodeLoader`] abstraction.

mod bundle;
mod error;
mod loader;
mod manager;

pub use bundle::{class_name, config_id, is_legacy, load_config_at};
pub use error::PluginError;
pub use loader::{CodeLoader, Constructor, DefaultPlugin, Plugin, RegistryCodeLoader};
pub use manager::{PluginManager, PLUGIN_LOCAL, PLUGIN_SYSTEM};
