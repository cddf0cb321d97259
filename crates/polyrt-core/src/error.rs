use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Canonical result for core.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse error taxonomy shared by every polyrt crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Configuration,
    IncompatibleBackend,
    Registration,
    Conversion,
    PluginResolution,
    PluginSignature,
    Compute,
}

/// Serializable so a backend variant can report failures across the library
/// boundary without losing the variant or context chain.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Incompatible backend: {0}")]
    IncompatibleBackend(String),

    #[error("Registration error: {0}")]
    Registration(String),

    #[error("Conversion error: {0}")]
    Conversion(String),

    #[error("Plugin resolution error: {0}")]
    PluginResolution(String),

    #[error("Plugin signature error: {0}")]
    PluginSignature(String),

    #[error("Compute error: {0}")]
    Compute(String),

    #[error("Internal invariant failed: {0}")]
    Invariant(String),

    /// Error with context chain for better debugging
    #[error("Error in {context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Add context to an error, creating an error chain.
    ///
    /// # Example
    /// ```rust,no_run
    /// use polyrt_core::error::Error;
    /// let err = Error::Conversion("Float64 is not Int64".into());
    /// let err = err.with_context("while evaluating ext.to");
    /// ```
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Error::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Taxonomy bucket of this error; context wrappers are transparent.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_) => ErrorKind::Configuration,
            Error::IncompatibleBackend(_) => ErrorKind::IncompatibleBackend,
            Error::Registration(_) => ErrorKind::Registration,
            Error::Conversion(_) => ErrorKind::Conversion,
            Error::PluginResolution(_) => ErrorKind::PluginResolution,
            Error::PluginSignature(_) => ErrorKind::PluginSignature,
            Error::Compute(_) | Error::Invariant(_) => ErrorKind::Compute,
            Error::Context { source, .. } => source.kind(),
        }
    }

    /// Get suggestions for common errors.
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            Error::Config(msg) => {
                if msg.contains("BACKEND") {
                    vec![
                        "Check the candidate id passed via POLYRT_FORCE_BACKEND / POLYRT_PREFER_BACKEND".into(),
                        "Run `polyrt info` to list the known candidates".into(),
                    ]
                } else {
                    vec![]
                }
            }
            Error::IncompatibleBackend(_) => vec![
                "Install a backend variant built for this CPU (try the `compat` variant)".into(),
                "Make sure the backend variant version matches the facade version".into(),
            ],
            Error::Registration(msg) => {
                if msg.contains("already registered") {
                    vec!["Pick a different extension type name or unregister the old one first".into()]
                } else {
                    vec![]
                }
            }
            Error::Conversion(_) => vec![
                "Cast the value to the extension's storage type before converting".into(),
            ],
            Error::PluginResolution(_) => vec![
                "Check that the plugin library path exists and was built against this version".into(),
            ],
            Error::Context { source, .. } => source.suggestions(),
            _ => vec![],
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Compute(e.to_string())
    }
}
