//! Plug-in bundle configuration discovery and validation.

use stratum_store::{Dict, Path, Storage, Value, IDX_OBJECTS};

use crate::PluginError;

/// Required config key: the plug-in identifier.
pub const KEY_ID: &str = "id";

/// Optional config key: the constructor name handed to the code loader.
pub const KEY_CLASSNAME: &str = "className";

/// Optional config key: the platform generation the bundle targets.
pub const KEY_PLATFORM: &str = "platform";

/// Load a plug-in configuration from below a base path.
///
/// A modern bundle publishes its config as the object `plugin/<id>`; a
/// legacy directory bundle carries a root `plugin` leaf instead. Both
/// layouts are accepted: the leaf is probed first, then the single object
/// under the `plugin/` index.
pub fn load_config_at(store: &dyn Storage, base: &Path) -> Result<Dict, PluginError> {
    let leaf = base.child("plugin", false);
    if let Some(Value::Dict(config)) = store.load(&leaf)? {
        return Ok(config);
    }
    let index = base.child("plugin", true);
    if let Some(Value::Dict(listing)) = store.load(&index)? {
        let objects = listing
            .get(IDX_OBJECTS)
            .and_then(Value::as_array)
            .unwrap_or(&[]);
        for name in objects {
            let Some(name) = name.as_str() else { continue };
            let path = index.child(name, false);
            if let Some(Value::Dict(config)) = store.load(&path)? {
                return Ok(config);
            }
        }
    }
    Err(PluginError::Format(format!(
        "no plug-in configuration found under {}",
        base
    )))
}

/// Extract and validate the plug-in id from a configuration.
pub fn config_id(config: &Dict) -> Result<String, PluginError> {
    match config.get(KEY_ID).and_then(Value::as_str) {
        Some(id) if !id.trim().is_empty() => Ok(id.to_string()),
        _ => Err(PluginError::Validation(
            "plug-in configuration has no id".to_string(),
        )),
    }
}

/// The constructor name declared by a configuration, if any.
pub fn class_name(config: &Dict) -> Option<&str> {
    config.get(KEY_CLASSNAME).and_then(Value::as_str)
}

/// Check whether a bundle predates the current platform generation.
///
/// An empty, missing or different `platform` field marks a legacy bundle;
/// nothing stricter is inferred from the value.
pub fn is_legacy(config: &Dict, host_platform: &str) -> bool {
    match config.get(KEY_PLATFORM).and_then(Value::as_str) {
        Some(platform) if !platform.is_empty() => platform != host_platform,
        _ => true,
    }
}
