use thiserror::Error;

use polyrt_core::error::Error as CoreError;

/// Result type local to polyrt-plugin.
pub type Result<T> = std::result::Result<T, PluginError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PluginError {
    #[error("plugin library not found: {path} ({reason})")]
    LibraryNotFound { path: String, reason: String },

    #[error("plugin library {path} is incompatible: {reason}")]
    LibraryIncompatible { path: String, reason: String },

    #[error("symbol '{symbol}' not found in plugin library {path}")]
    SymbolNotFound { path: String, symbol: String },

    #[error("signature mismatch in plugin function '{function}': {detail}")]
    SignatureMismatch { function: String, detail: String },

    #[error("cannot resolve the output type of plugin function '{0}': no output type given and the plugin has no schema callback")]
    OutputTypeUnresolvable(String),

    #[error("plugin function '{function}' failed: {message}")]
    Execution { function: String, message: String },
}

impl PluginError {
    pub fn with_context(self, context: impl Into<String>) -> Self {
        let ctx = context.into();
        match self {
            PluginError::SignatureMismatch { function, detail } => PluginError::SignatureMismatch {
                function,
                detail: format!("{}: {}", ctx, detail),
            },
            PluginError::Execution { function, message } => PluginError::Execution {
                function,
                message: format!("{}: {}", ctx, message),
            },
            other => other,
        }
    }

    pub fn suggestions(&self) -> Vec<String> {
        match self {
            PluginError::LibraryNotFound { .. } => vec![
                "Check the plugin library path; it is resolved when the expression is evaluated".into(),
            ],
            PluginError::LibraryIncompatible { .. } => vec![
                "Rebuild the plugin against the same polyrt version".into(),
            ],
            PluginError::SymbolNotFound { .. } => vec![
                "Export the function with `export_plugin_function!`".into(),
                "Check the spelling of the function name".into(),
            ],
            PluginError::OutputTypeUnresolvable(_) => vec![
                "Pass an output type when registering the plugin function".into(),
                "Or export an output-field callback from the plugin".into(),
            ],
            PluginError::SignatureMismatch { .. } => vec![
                "Cast the arguments or register the call with cast_inputs = true".into(),
            ],
            PluginError::Execution { .. } => vec![],
        }
    }
}

impl From<PluginError> for CoreError {
    fn from(e: PluginError) -> Self {
        match e {
            PluginError::LibraryNotFound { .. }
            | PluginError::LibraryIncompatible { .. }
            | PluginError::SymbolNotFound { .. } => CoreError::PluginResolution(e.to_string()),
            PluginError::SignatureMismatch { .. } | PluginError::OutputTypeUnresolvable(_) => {
                CoreError::PluginSignature(e.to_string())
            }
            PluginError::Execution { .. } => CoreError::Compute(e.to_string()),
        }
    }
}
