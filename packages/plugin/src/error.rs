//! Error types for the plug-in lifecycle.

use thiserror::Error;

use stratum_store::StorageError;

/// Errors raised by plug-in management operations.
#[derive(Debug, Error)]
pub enum PluginError {
    /// Underlying storage failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Semantic rejection (missing id, forbidden operation on a reserved
    /// plug-in).
    #[error("validation error: {0}")]
    Validation(String),

    /// Malformed bundle or configuration document.
    #[error("plug-in format error: {0}")]
    Format(String),

    /// Code artifact resolution or construction failed.
    #[error("code load error for '{name}': {cause}")]
    CodeLoad { name: String, cause: String },

    /// Plug-in `init()` or `destroy()` failed.
    #[error("plug-in lifecycle error: {0}")]
    Init(String),

    /// Underlying disk failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let e = PluginError::CodeLoad {
            name: "Demo".to_string(),
            cause: "unresolved".to_string(),
        };
        let text = format!("{}", e);
        assert!(text.contains("Demo"));
        assert!(text.contains("unresolved"));
    }

    #[test]
    fn storage_error_converts() {
        let inner = StorageError::Conflict("x".to_string());
        let e: PluginError = inner.into();
        assert!(matches!(e, PluginError::Storage(_)));
    }
}
