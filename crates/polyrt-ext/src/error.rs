use thiserror::Error;

use polyrt_core::error::Error as CoreError;
use polyrt_core::schema::DataType;

/// Result type local to polyrt-ext.
pub type Result<T> = std::result::Result<T, RegistryError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("extension type '{0}' is already registered")]
    Duplicate(String),

    #[error("extension type '{0}' is not registered")]
    NotFound(String),

    #[error("extension type name must not be empty")]
    EmptyName,

    #[error("'{storage}' is not a supported storage type for extension type '{name}'")]
    UnsupportedStorage { name: String, storage: DataType },

    #[error("cannot convert {found} to extension type '{name}': storage type is {expected}")]
    Conversion {
        name: String,
        expected: DataType,
        found: DataType,
    },
}

impl RegistryError {
    /// Registration problems can be retried with another name or storage type.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, RegistryError::Conversion { .. })
    }

    pub fn suggestions(&self) -> Vec<String> {
        match self {
            RegistryError::Duplicate(name) => vec![
                format!("Unregister '{}' first or choose a different name", name),
            ],
            RegistryError::NotFound(_) => vec!["Register the extension type before using it".into()],
            RegistryError::UnsupportedStorage { .. } => vec![
                "Use a physical type (e.g. Int64, String) as storage; extension types cannot nest".into(),
            ],
            RegistryError::Conversion { expected, .. } => vec![
                format!("Cast the value to {} before converting", expected),
            ],
            RegistryError::EmptyName => vec![],
        }
    }
}

impl From<RegistryError> for CoreError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::Conversion { .. } => CoreError::Conversion(e.to_string()),
            _ => CoreError::Registration(e.to_string()),
        }
    }
}
