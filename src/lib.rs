//! polyrt: the host facade.
//!
//! Nothing is loaded until first use. The first call that needs the backend
//! reads `RuntimeConfig` from the environment, builds the default candidates
//! (native variants in the backend directory, then the in-process `builtin`
//! engine when the `builtin` feature is on) and installs exactly one of them.
//! Every later call, from any thread, sees that same backend, or the same
//! resolution error.
//!
//! ```rust,no_run
//! use polyrt::prelude::*;
//!
//! let info = polyrt::build_info()?;
//! println!("polyrt {} ({:?})", info.version, info.variant);
//!
//! polyrt::register_extension_type("meters", DataType::Float64, Default::default())?;
//! # Ok::<(), polyrt::Error>(())
//! ```

use std::sync::{Arc, OnceLock};

pub use polyrt_backend::{
    Backend, BackendCandidate, BackendHandle, BuildInfo, CpuFeatures, Facade, HostCpu, ResolveError, Resolver,
    SimulatedCpu, SkipReason,
};
pub use polyrt_core::error::{Error, ErrorKind, Result};
pub use polyrt_core::prelude;
pub use polyrt_core::VERSION;
pub use polyrt_ext::{ExtensionOptions, ExtensionTypeDescriptor};
pub use polyrt_plugin::{register_plugin_function, PluginFunctionBuilder};

use polyrt_core::prelude::{DataType, RuntimeConfig};

static FACADE: OnceLock<Result<Facade>> = OnceLock::new();

/// Candidates tried by the global facade, in default order.
pub fn default_candidates(config: &RuntimeConfig) -> Vec<BackendCandidate> {
    let dir = config
        .backend_dir
        .clone()
        .or_else(polyrt_backend::variants::default_backend_dir);

    #[allow(unused_mut)]
    let mut candidates = match dir {
        Some(dir) => polyrt_backend::variants::native_candidates(&dir),
        None => Vec::new(),
    };
    #[cfg(feature = "builtin")]
    candidates.push(polyrt_engine::candidate());
    candidates
}

/// Resolver the global facade uses, built from `config`.
pub fn default_resolver(config: &RuntimeConfig) -> Resolver {
    Resolver::from_config(default_candidates(config), VERSION, config)
}

fn init() -> Result<Facade> {
    let config = RuntimeConfig::from_env()?;
    tracing::debug!(?config, "read runtime configuration");
    polyrt_ext::global().set_unknown_type_behavior(config.unknown_extension);
    Ok(Facade::new(default_resolver(&config)))
}

/// The process-wide facade. Configuration is read on the first call only.
pub fn facade() -> Result<&'static Facade> {
    FACADE.get_or_init(init).as_ref().map_err(Clone::clone)
}

/// The installed backend, resolving it on first use.
pub fn handle() -> Result<BackendHandle> {
    Ok(facade()?.handle()?.clone())
}

/// Version of the installed backend.
pub fn version() -> Result<String> {
    Ok(facade()?.version()?.to_string())
}

pub fn build_info() -> Result<BuildInfo> {
    facade()?.build_info()
}

/// Row index type of the installed backend (`UInt32` or `UInt64`).
pub fn get_index_type() -> Result<DataType> {
    facade()?.index_type()
}

/// Register a user-defined logical type stored as `storage_type`.
///
/// Resolves the backend first so registration failures never mask a missing
/// backend.
pub fn register_extension_type(
    name: &str,
    storage_type: DataType,
    options: ExtensionOptions,
) -> Result<Arc<ExtensionTypeDescriptor>> {
    handle()?;
    Ok(polyrt_ext::global().register(name, storage_type, options)?)
}

pub fn unregister_extension_type(name: &str) -> Result<Arc<ExtensionTypeDescriptor>> {
    handle()?;
    Ok(polyrt_ext::global().unregister(name)?)
}

pub fn get_extension_type(name: &str) -> Result<Arc<ExtensionTypeDescriptor>> {
    Ok(polyrt_ext::global().get(name)?)
}
