use std::io::{Read, Write};
use std::sync::Arc;

use polyrt_backend::{Backend, BackendCandidate, BuildInfo};
use polyrt_core::error::{Error, Result};
use polyrt_core::prelude::{ColumnData, DataType, Expr, Frame, Scalar, Series};
use polyrt_ext::ExtensionRegistry;
use polyrt_plugin::{NativePluginLoader, PluginLoader};

use crate::codec;
use crate::eval::Evaluator;

/// Candidate id of the in-process engine.
pub const BUILTIN_ID: &str = "builtin";

/// Reference implementation of the backend primitive surface.
pub struct BuiltinBackend {
    plugins: Arc<dyn PluginLoader>,
    extensions: &'static ExtensionRegistry,
}

impl Default for BuiltinBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl BuiltinBackend {
    /// Engine using native plugin libraries and the process-wide extension
    /// registry. Served from a variant library, that registry is replaced by the
    /// host's before every request that can see extension types.
    pub fn new() -> Self {
        Self {
            plugins: Arc::new(NativePluginLoader::new()),
            extensions: polyrt_ext::global(),
        }
    }

    pub fn with_plugin_loader(mut self, loader: Arc<dyn PluginLoader>) -> Self {
        self.plugins = loader;
        self
    }

    pub fn with_extensions(mut self, extensions: &'static ExtensionRegistry) -> Self {
        self.extensions = extensions;
        self
    }
}

fn enabled_features() -> Vec<String> {
    let mut features = Vec::new();
    if cfg!(feature = "bigidx") {
        features.push("bigidx".to_string());
    }
    for (enabled, name) in [
        (cfg!(target_feature = "sse4.2"), "sse4.2"),
        (cfg!(target_feature = "avx2"), "avx2"),
        (cfg!(target_feature = "fma"), "fma"),
        (cfg!(target_feature = "neon"), "neon"),
    ] {
        if enabled {
            features.push(name.to_string());
        }
    }
    features
}

impl Backend for BuiltinBackend {
    fn version(&self) -> &str {
        polyrt_core::VERSION
    }

    fn build_info(&self) -> BuildInfo {
        BuildInfo {
            version: polyrt_core::VERSION.to_string(),
            variant: None,
            features: enabled_features(),
            target: format!("{}-{}", std::env::consts::ARCH, std::env::consts::OS),
        }
    }

    fn index_type(&self) -> DataType {
        if cfg!(feature = "bigidx") {
            DataType::UInt64
        } else {
            DataType::UInt32
        }
    }

    fn construct(&self, name: &str, dtype: &DataType, values: Vec<Scalar>) -> Result<Series> {
        if let DataType::Extension { name: ext, storage } = dtype {
            let descriptor = self.extensions.get(ext)?;
            if **storage != descriptor.storage_type {
                return Err(Error::Conversion(format!(
                    "extension type '{}' is stored as {}, not {}",
                    ext, descriptor.storage_type, storage
                )));
            }
        }
        let data = ColumnData::from_scalars(dtype, values)
            .map_err(|e| e.with_context(format!("constructing '{}'", name)))?;
        Series::new(name, dtype.clone(), data)
    }

    fn read_frame(&self, reader: &mut dyn Read) -> Result<Frame> {
        codec::read_frame(reader, self.extensions)
    }

    fn write_frame(&self, frame: &Frame, writer: &mut dyn Write) -> Result<()> {
        codec::write_frame(frame, writer)
    }

    fn dispatch(&self, frame: &Frame, exprs: &[Expr]) -> Result<Frame> {
        let mut evaluator = Evaluator::new(frame, self.extensions, self.plugins.as_ref());
        let columns = exprs
            .iter()
            .map(|expr| evaluator.column(expr))
            .collect::<Result<Vec<_>>>()?;
        Frame::new(columns)
    }
}

/// The `"builtin"` candidate: always loadable, no CPU requirements.
pub fn candidate() -> BackendCandidate {
    BackendCandidate::in_process(BUILTIN_ID, || Ok(Arc::new(BuiltinBackend::new()) as Arc<dyn Backend>))
}
