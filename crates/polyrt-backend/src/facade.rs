//! The stable facade external layers call through.
//!
//! Resolution happens on first use. The once-cell guarantees a single caller
//! runs the resolver while concurrent callers block and then observe the same
//! outcome. Failures are cached too: there is no re-resolution.

use std::io::{Read, Write};
use std::sync::{Arc, OnceLock};

use polyrt_core::error::Result;
use polyrt_core::prelude::{DataType, Expr, Frame, Scalar, Series};

use crate::error::ResolveError;
use crate::resolver::Resolver;
use crate::traits::{Backend, BuildInfo};

/// The installed backend. Cheap to clone; clones share the same backend.
#[derive(Clone)]
pub struct BackendHandle {
    variant: String,
    version: String,
    backend: Arc<dyn Backend>,
}

impl BackendHandle {
    pub(crate) fn new(variant: &str, backend: Arc<dyn Backend>) -> Self {
        Self {
            variant: variant.to_string(),
            version: backend.version().to_string(),
            backend,
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Candidate id this handle was resolved from. Diagnostics only.
    pub fn variant(&self) -> &str {
        &self.variant
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// True when both handles wrap the same backend instance.
    pub fn ptr_eq(&self, other: &BackendHandle) -> bool {
        Arc::ptr_eq(&self.backend, &other.backend)
    }
}

impl std::fmt::Debug for BackendHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendHandle")
            .field("variant", &self.variant)
            .field("version", &self.version)
            .finish()
    }
}

pub struct Facade {
    resolver: Resolver,
    handle: OnceLock<std::result::Result<BackendHandle, ResolveError>>,
}

impl Facade {
    pub fn new(resolver: Resolver) -> Self {
        Self {
            resolver,
            handle: OnceLock::new(),
        }
    }

    /// The resolved handle, resolving on first call.
    pub fn handle(&self) -> std::result::Result<&BackendHandle, ResolveError> {
        self.handle
            .get_or_init(|| {
                tracing::debug!(
                    candidates = self.resolver.candidates().len(),
                    required_version = self.resolver.required_version(),
                    "resolving backend"
                );
                self.resolver.resolve()
            })
            .as_ref()
            .map_err(Clone::clone)
    }

    /// The handle if resolution already succeeded; never triggers resolution.
    pub fn try_handle(&self) -> Option<&BackendHandle> {
        self.handle.get().and_then(|r| r.as_ref().ok())
    }

    pub fn is_resolved(&self) -> bool {
        self.handle.get().is_some()
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    fn backend(&self) -> Result<&dyn Backend> {
        Ok(self.handle()?.backend.as_ref())
    }

    pub fn version(&self) -> Result<&str> {
        Ok(self.handle()?.version())
    }

    pub fn build_info(&self) -> Result<BuildInfo> {
        let handle = self.handle()?;
        let mut info = handle.backend.build_info();
        info.variant = Some(handle.variant.clone());
        Ok(info)
    }

    pub fn index_type(&self) -> Result<DataType> {
        Ok(self.backend()?.index_type())
    }

    pub fn construct(&self, name: &str, dtype: &DataType, values: Vec<Scalar>) -> Result<Series> {
        self.backend()?.construct(name, dtype, values)
    }

    pub fn read_frame(&self, reader: &mut dyn Read) -> Result<Frame> {
        self.backend()?.read_frame(reader)
    }

    pub fn write_frame(&self, frame: &Frame, writer: &mut dyn Write) -> Result<()> {
        self.backend()?.write_frame(frame, writer)
    }

    pub fn dispatch(&self, frame: &Frame, exprs: &[Expr]) -> Result<Frame> {
        self.backend()?.dispatch(frame, exprs)
    }
}
