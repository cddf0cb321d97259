//! Backend candidates: one precompiled variant competing for selection.

use std::fmt;
use std::sync::Arc;

use crate::cpu::parse_feature_flags;
use crate::error::LoadError;
use crate::traits::Backend;

/// Produces a loaded backend. Called at most once per resolution.
pub trait BackendLoader: Send + Sync {
    fn load(&self) -> Result<Arc<dyn Backend>, LoadError>;

    /// Where the variant comes from, for diagnostics.
    fn describe(&self) -> String {
        "in-process".to_string()
    }
}

/// Loader backed by a closure (in-process variants, tests).
pub struct FnLoader<F>(pub F);

impl<F> BackendLoader for FnLoader<F>
where
    F: Fn() -> Result<Arc<dyn Backend>, LoadError> + Send + Sync,
{
    fn load(&self) -> Result<Arc<dyn Backend>, LoadError> {
        (self.0)()
    }
}

#[derive(Clone)]
pub struct BackendCandidate {
    id: String,
    loader: Arc<dyn BackendLoader>,
    required_cpu_features: Vec<String>,
}

impl BackendCandidate {
    pub fn new(id: impl Into<String>, loader: impl BackendLoader + 'static) -> Self {
        Self {
            id: id.into(),
            loader: Arc::new(loader),
            required_cpu_features: Vec::new(),
        }
    }

    /// Candidate whose backend is constructed in-process by `f`.
    pub fn in_process<F>(id: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn Backend>, LoadError> + Send + Sync + 'static,
    {
        Self::new(id, FnLoader(f))
    }

    /// Add required CPU features (normalized names such as `"avx2"`).
    pub fn requires<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.required_cpu_features
            .extend(features.into_iter().map(|f| f.as_ref().to_ascii_lowercase()));
        self
    }

    /// Add requirements from a build flag string (`"+sse3,+avx2"`).
    pub fn with_feature_flags(mut self, flags: &str) -> Self {
        self.required_cpu_features.extend(parse_feature_flags(flags));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn required_cpu_features(&self) -> &[String] {
        &self.required_cpu_features
    }

    pub fn loader(&self) -> &dyn BackendLoader {
        self.loader.as_ref()
    }
}

impl fmt::Debug for BackendCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendCandidate")
            .field("id", &self.id)
            .field("loader", &self.loader.describe())
            .field("required_cpu_features", &self.required_cpu_features)
            .finish()
    }
}
