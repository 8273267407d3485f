//! Document codecs: JSON, YAML and properties text to and from `Value`.

use stratum_store::{Dict, StorageError, Value};

/// Structured document formats identified by file extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocFormat {
    Json,
    Yaml,
    Properties,
}

impl DocFormat {
    /// Match a file extension to a structured format.
    ///
    /// Extensions outside this set (including `.xml`) are treated as binary
    /// content by the file stores.
    pub fn from_extension(ext: &str) -> Option<DocFormat> {
        match ext {
            "json" => Some(DocFormat::Json),
            "yaml" | "yml" => Some(DocFormat::Yaml),
            "properties" => Some(DocFormat::Properties),
            _ => None,
        }
    }

    /// The canonical extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            DocFormat::Json => "json",
            DocFormat::Yaml => "yaml",
            DocFormat::Properties => "properties",
        }
    }

    /// Parse document text into a value.
    pub fn parse(&self, text: &str) -> Result<Value, StorageError> {
        match self {
            DocFormat::Json => {
                let json: serde_json::Value = serde_json::from_str(text)
                    .map_err(|e| StorageError::Format(format!("invalid JSON: {}", e)))?;
                Ok(json_to_value(json))
            }
            DocFormat::Yaml => {
                let yaml: serde_yaml::Value = serde_yaml::from_str(text)
                    .map_err(|e| StorageError::Format(format!("invalid YAML: {}", e)))?;
                Ok(yaml_to_value(yaml))
            }
            DocFormat::Properties => parse_properties(text).map(Value::Dict),
        }
    }
}

/// Split a file name into `(stem, structured format)` when the extension
/// names a document format.
pub fn split_data_extension(file_name: &str) -> Option<(&str, DocFormat)> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() {
        return None;
    }
    DocFormat::from_extension(ext).map(|format| (stem, format))
}

/// Convert a parsed JSON document into a value.
pub fn json_to_value(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else if let Some(f) = n.as_f64() {
                Value::Float(f)
            } else {
                Value::Str(n.to_string())
            }
        }
        serde_json::Value::String(s) => Value::Str(s),
        serde_json::Value::Array(a) => Value::Array(a.into_iter().map(json_to_value).collect()),
        serde_json::Value::Object(o) => {
            let mut dict = Dict::new();
            for (k, v) in o {
                dict.insert(k, json_to_value(v));
            }
            Value::Dict(dict)
        }
    }
}

/// Convert a parsed YAML document into a value.
pub fn yaml_to_value(yaml: serde_yaml::Value) -> Value {
    match yaml {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else if let Some(f) = n.as_f64() {
                Value::Float(f)
            } else {
                Value::Str(n.to_string())
            }
        }
        serde_yaml::Value::String(s) => Value::Str(s),
        serde_yaml::Value::Sequence(a) => Value::Array(a.into_iter().map(yaml_to_value).collect()),
        serde_yaml::Value::Mapping(m) => {
            let mut dict = Dict::new();
            for (k, v) in m {
                let key = match k {
                    serde_yaml::Value::String(s) => s,
                    other => yaml_scalar_string(&other),
                };
                dict.insert(key, yaml_to_value(v));
            }
            Value::Dict(dict)
        }
        serde_yaml::Value::Tagged(t) => yaml_to_value(t.value),
    }
}

fn yaml_scalar_string(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        other => format!("{:?}", other),
    }
}

/// Serialize a value as a YAML document.
///
/// Fails for values that have no document representation (binaries and live
/// objects).
pub fn to_yaml_string(value: &Value) -> Result<String, StorageError> {
    let yaml = value_to_yaml(value)?;
    serde_yaml::to_string(&yaml).map_err(|e| StorageError::Format(format!("YAML encode: {}", e)))
}

fn value_to_yaml(value: &Value) -> Result<serde_yaml::Value, StorageError> {
    Ok(match value {
        Value::Null => serde_yaml::Value::Null,
        Value::Bool(b) => serde_yaml::Value::Bool(*b),
        Value::Int(i) => serde_yaml::Value::Number((*i).into()),
        Value::Float(f) => serde_yaml::Value::Number((*f).into()),
        Value::Str(s) => serde_yaml::Value::String(s.clone()),
        Value::Array(a) => {
            let mut seq = Vec::with_capacity(a.len());
            for v in a {
                seq.push(value_to_yaml(v)?);
            }
            serde_yaml::Value::Sequence(seq)
        }
        Value::Dict(d) => {
            let mut mapping = serde_yaml::Mapping::new();
            for (k, v) in d {
                mapping.insert(serde_yaml::Value::String(k.clone()), value_to_yaml(v)?);
            }
            serde_yaml::Value::Mapping(mapping)
        }
        Value::Binary(_) | Value::Object(_) => {
            return Err(StorageError::Format(format!(
                "cannot serialize {} value as a document",
                value.type_name()
            )));
        }
    })
}

/// Parse properties text (`key=value` lines) into a dict.
///
/// Lines starting with `#` or `!` are comments; a trailing backslash
/// continues the logical line. Dotted keys expand into nested dicts, with
/// all-digit segments addressing array elements in order.
pub fn parse_properties(text: &str) -> Result<Dict, StorageError> {
    let mut root = Value::dict();
    let mut logical = String::new();
    for raw_line in text.lines() {
        let line = raw_line.trim_start();
        if logical.is_empty() && (line.is_empty() || line.starts_with('#') || line.starts_with('!'))
        {
            continue;
        }
        if let Some(stripped) = line.strip_suffix('\\') {
            logical.push_str(stripped);
            continue;
        }
        logical.push_str(line);
        let entry = std::mem::take(&mut logical);
        let (key, value) = entry.split_once('=').ok_or_else(|| {
            StorageError::Format(format!("properties line without '=': {}", entry))
        })?;
        let segments: Vec<&str> = key.trim().split('.').collect();
        set_dotted(
            &mut root,
            &segments,
            Value::Str(value.trim().to_string()),
        )?;
    }
    match root {
        Value::Dict(d) => Ok(d),
        _ => Ok(Dict::new()),
    }
}

fn is_index_segment(segment: &str) -> bool {
    !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit())
}

fn set_dotted(root: &mut Value, segments: &[&str], value: Value) -> Result<(), StorageError> {
    let mut current = root;
    for (i, segment) in segments.iter().enumerate() {
        let last = i == segments.len() - 1;
        let next_is_array = !last && is_index_segment(segments[i + 1]);
        let container = if next_is_array {
            Value::array
        } else {
            Value::dict
        };
        match current {
            Value::Dict(dict) => {
                if last {
                    dict.insert(segment.to_string(), value);
                    return Ok(());
                }
                let entry = dict.entry(segment.to_string()).or_insert_with(container);
                // A scalar written earlier under the same key is replaced.
                if !entry.is_dict() && !entry.is_array() {
                    *entry = container();
                }
                current = entry;
            }
            Value::Array(arr) => {
                let index: usize = segment.parse().map_err(|_| {
                    StorageError::Format(format!("invalid array index segment: {}", segment))
                })?;
                if index > arr.len() {
                    return Err(StorageError::Format(format!(
                        "non-contiguous array index {} in properties key",
                        index
                    )));
                }
                if index == arr.len() {
                    if last {
                        arr.push(value);
                        return Ok(());
                    }
                    arr.push(container());
                } else if last {
                    arr[index] = value;
                    return Ok(());
                }
                current = &mut arr[index];
            }
            _ => {
                return Err(StorageError::Format(format!(
                    "cannot descend through scalar at segment {}",
                    segment
                )));
            }
        }
    }
    Ok(())
}
