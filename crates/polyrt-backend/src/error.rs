use std::fmt;

use thiserror::Error;

use polyrt_core::error::Error as CoreError;

/// Why a candidate could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("library not found at {0}")]
    NotFound(String),

    #[error("failed to open library: {0}")]
    Open(String),

    #[error("missing symbol '{0}'")]
    Symbol(String),

    #[error("backend ABI {found} does not match expected ABI {expected}")]
    Abi { expected: u32, found: u32 },

    #[error("{0}")]
    Other(String),
}

/// Why a candidate was passed over during resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Checked before loading; the candidate was never loaded.
    MissingCpuFeatures(Vec<String>),
    LoadFailed(LoadError),
    VersionMismatch { found: String, required: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingCpuFeatures(missing) => {
                write!(f, "missing CPU features [{}]", missing.join(", "))
            }
            SkipReason::LoadFailed(e) => write!(f, "load failed: {}", e),
            SkipReason::VersionMismatch { found, required } => {
                write!(f, "version '{}' does not match required version '{}'", found, required)
            }
        }
    }
}

/// Fatal resolution outcome. Cloned to every caller of a failed facade.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("invalid value for `{variable}`: '{id}' (known candidates: {known})")]
    InvalidCandidate {
        variable: &'static str,
        id: String,
        known: String,
    },

    #[error("no backend candidates configured")]
    NoCandidates,

    #[error("forced backend '{id}' is unusable: {reason}")]
    ForcedUnavailable { id: String, reason: SkipReason },

    #[error("could not find a compatible backend{}", render_skipped(.skipped))]
    NoCompatibleBackend { skipped: Vec<(String, SkipReason)> },
}

fn render_skipped(skipped: &[(String, SkipReason)]) -> String {
    let mut out = String::new();
    for (id, reason) in skipped {
        out.push_str(&format!("; '{}': {}", id, reason));
    }
    let versions: Vec<&str> = skipped
        .iter()
        .filter_map(|(_, r)| match r {
            SkipReason::VersionMismatch { found, .. } => Some(found.as_str()),
            _ => None,
        })
        .collect();
    if !versions.is_empty() {
        out.push_str(&format!(
            ". Skipped versions [{}] which don't match the facade version",
            versions.join(", ")
        ));
    }
    out
}

impl ResolveError {
    /// Every (candidate, reason) pair that led to this error.
    pub fn skipped(&self) -> Vec<(String, SkipReason)> {
        match self {
            ResolveError::ForcedUnavailable { id, reason } => vec![(id.clone(), reason.clone())],
            ResolveError::NoCompatibleBackend { skipped } => skipped.clone(),
            _ => vec![],
        }
    }
}

impl From<ResolveError> for CoreError {
    fn from(e: ResolveError) -> Self {
        match e {
            ResolveError::InvalidCandidate { .. } | ResolveError::NoCandidates => {
                CoreError::Config(e.to_string())
            }
            ResolveError::ForcedUnavailable { .. } | ResolveError::NoCompatibleBackend { .. } => {
                CoreError::IncompatibleBackend(e.to_string())
            }
        }
    }
}
