//! The normalizing store wrapper and its dict transforms.

use std::sync::Arc;

use stratum_store::{
    Dict, LoadAllIter, Metadata, Path, Storage, StorageError, StoreInfo, Value,
};

/// Wraps a store and upgrades legacy dicts on load.
///
/// - `role/<id>` dicts without a `type` get `type`/`id` set and their
///   `access` entries rewritten to `path`/`regex` + `permission` form.
/// - `user/<id>` dicts without a `type` get `type`/`id` set, the legacy
///   `description` moved into `name`, and `role` names lowercased.
/// - Every dict under `plugin/` is forced to `type = "plugin"` with the
///   addressed identifier as `id`.
///
/// The wrapper is read-side only; writes and removals reach the inner store
/// unchanged.
pub struct NormalizingStore {
    inner: Arc<dyn Storage>,
}

impl NormalizingStore {
    /// Wrap a backing store.
    pub fn new(inner: Arc<dyn Storage>) -> Self {
        NormalizingStore { inner }
    }

    fn normalize(path: &Path, value: Value) -> Value {
        let Value::Dict(mut dict) = value else {
            return value;
        };
        if path.len() >= 2 {
            let id = path.last_name().unwrap_or_default().to_string();
            match path.name(0) {
                Some("role") => normalize_role(&mut dict, &id),
                Some("user") => normalize_user(&mut dict, &id),
                Some("plugin") => normalize_plugin(&mut dict, &id),
                _ => {}
            }
        }
        Value::Dict(dict)
    }
}

impl Storage for NormalizingStore {
    fn info(&self) -> StoreInfo {
        let mut info = self.inner.info();
        info.store_type = format!("{}/plugin", info.store_type);
        info
    }

    fn lookup(&self, path: &Path) -> Option<Metadata> {
        self.inner.lookup(path)
    }

    fn load(&self, path: &Path) -> Result<Option<Value>, StorageError> {
        if path.is_index() {
            return self.inner.load(path);
        }
        Ok(self
            .inner
            .load(path)?
            .map(|value| Self::normalize(path, value)))
    }

    fn load_all(&self, prefix: &Path) -> LoadAllIter<'_> {
        Box::new(
            self.inner
                .load_all(prefix)
                .map(|item| item.map(|(path, value)| {
                    let value = Self::normalize(&path, value);
                    (path, value)
                })),
        )
    }

    fn store(&self, path: &Path, value: Value) -> Result<(), StorageError> {
        self.inner.store(path, value)
    }

    fn remove(&self, path: &Path) -> Result<(), StorageError> {
        self.inner.remove(path)
    }

    fn cache_clean(&self, deep: bool) {
        self.inner.cache_clean(deep)
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::Str(s) => s.clone(),
        Value::Int(i) => i.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

/// Upgrade a legacy role dict in place.
fn normalize_role(dict: &mut Dict, id: &str) {
    if dict.contains_key("type") {
        return;
    }
    dict.insert("type".to_string(), Value::from("role"));
    dict.insert("id".to_string(), Value::from(id));
    let Some(Value::Array(access)) = dict.get_mut("access") else {
        return;
    };
    for entry in access {
        let Some(e) = entry.as_dict_mut() else {
            continue;
        };
        if e.contains_key("type") && e.contains_key("name") {
            let kind = e.shift_remove("type").as_ref().map(text).unwrap_or_default();
            let name = e.shift_remove("name").as_ref().map(text).unwrap_or_default();
            e.insert("path".to_string(), Value::Str(format!("{}/{}", kind, name)));
            e.insert("permission".to_string(), Value::from("read"));
        } else if e.contains_key("type") && e.contains_key("regexp") {
            let kind = e.shift_remove("type").as_ref().map(text).unwrap_or_default();
            let pattern = e
                .shift_remove("regexp")
                .as_ref()
                .map(text)
                .unwrap_or_default();
            e.insert(
                "regex".to_string(),
                Value::Str(format!("{}/{}", kind, pattern)),
            );
            e.insert("permission".to_string(), Value::from("read"));
        }
        if e.shift_remove("caller").is_some() {
            e.insert("permission".to_string(), Value::from("internal"));
        }
    }
}

/// Upgrade a legacy user dict in place.
fn normalize_user(dict: &mut Dict, id: &str) {
    if dict.contains_key("type") {
        return;
    }
    dict.insert("type".to_string(), Value::from("user"));
    dict.insert("id".to_string(), Value::from(id));
    let name = dict
        .shift_remove("description")
        .as_ref()
        .map(text)
        .unwrap_or_default();
    dict.insert("name".to_string(), Value::Str(name));
    dict.insert("description".to_string(), Value::from(""));
    if let Some(Value::Array(roles)) = dict.get_mut("role") {
        for role in roles {
            if let Value::Str(s) = role {
                *s = s.to_lowercase();
            }
        }
    }
}

/// Force the canonical type and id onto a plug-in dict.
fn normalize_plugin(dict: &mut Dict, id: &str) {
    dict.insert("type".to_string(), Value::from("plugin"));
    dict.insert("id".to_string(), Value::from(id));
}
