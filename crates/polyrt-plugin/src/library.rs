//! Plugin seams: a loader opens libraries, a library resolves functions.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use polyrt_core::prelude::{DataType, Field, Series};

use crate::error::{PluginError, Result};

pub type InvokeFn = dyn Fn(&[Series], Option<&str>) -> std::result::Result<Series, String> + Send + Sync;
pub type OutputFieldFn = dyn Fn(&[Field], Option<&str>) -> std::result::Result<Field, String> + Send + Sync;

/// A resolved entry point plus whatever it declares about its types.
#[derive(Clone)]
pub struct PluginFunction {
    name: String,
    invoke: Arc<InvokeFn>,
    signature: Option<Vec<DataType>>,
    output_field: Option<Arc<OutputFieldFn>>,
}

impl PluginFunction {
    pub fn new<F>(name: impl Into<String>, invoke: F) -> Self
    where
        F: Fn(&[Series], Option<&str>) -> std::result::Result<Series, String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            invoke: Arc::new(invoke),
            signature: None,
            output_field: None,
        }
    }

    /// Declared argument types, checked before invocation.
    pub fn with_signature(mut self, inputs: Vec<DataType>) -> Self {
        self.signature = Some(inputs);
        self
    }

    /// Schema callback: computes the output field from the input fields.
    pub fn with_output_field<F>(mut self, f: F) -> Self
    where
        F: Fn(&[Field], Option<&str>) -> std::result::Result<Field, String> + Send + Sync + 'static,
    {
        self.output_field = Some(Arc::new(f));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> Option<&[DataType]> {
        self.signature.as_deref()
    }

    pub fn output_field(&self, fields: &[Field], kwargs: Option<&str>) -> Option<std::result::Result<Field, String>> {
        self.output_field.as_ref().map(|f| f(fields, kwargs))
    }

    pub fn invoke(&self, inputs: &[Series], kwargs: Option<&str>) -> std::result::Result<Series, String> {
        (self.invoke)(inputs, kwargs)
    }
}

impl fmt::Debug for PluginFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginFunction")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .field("has_output_field", &self.output_field.is_some())
            .finish()
    }
}

pub trait PluginLibrary: Send + Sync {
    /// Look up `function_name`; `SymbolNotFound` when absent.
    fn function(&self, function_name: &str) -> Result<PluginFunction>;
}

pub trait PluginLoader: Send + Sync {
    /// Open the library at `path`; `LibraryNotFound` when absent.
    fn open(&self, path: &Path) -> Result<Arc<dyn PluginLibrary>>;
}

/// A library whose functions are Rust closures in this process.
#[derive(Debug, Clone, Default)]
pub struct StaticPluginLibrary {
    path: PathBuf,
    functions: HashMap<String, PluginFunction>,
}

impl StaticPluginLibrary {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            functions: HashMap::new(),
        }
    }

    pub fn with_function(mut self, function: PluginFunction) -> Self {
        self.functions.insert(function.name.clone(), function);
        self
    }
}

impl PluginLibrary for StaticPluginLibrary {
    fn function(&self, function_name: &str) -> Result<PluginFunction> {
        self.functions
            .get(function_name)
            .cloned()
            .ok_or_else(|| PluginError::SymbolNotFound {
                path: self.path.display().to_string(),
                symbol: function_name.to_string(),
            })
    }
}

/// Path → in-process library table.
#[derive(Default)]
pub struct StaticPluginLoader {
    libraries: HashMap<PathBuf, Arc<StaticPluginLibrary>>,
}

impl StaticPluginLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_library(mut self, library: StaticPluginLibrary) -> Self {
        self.libraries.insert(library.path.clone(), Arc::new(library));
        self
    }
}

impl PluginLoader for StaticPluginLoader {
    fn open(&self, path: &Path) -> Result<Arc<dyn PluginLibrary>> {
        self.libraries
            .get(path)
            .map(|lib| lib.clone() as Arc<dyn PluginLibrary>)
            .ok_or_else(|| PluginError::LibraryNotFound {
                path: path.display().to_string(),
                reason: "no such in-process library".to_string(),
            })
    }
}
