//! polyrt-plugin: reference functions in external native libraries from expressions.
//!
//! - `call`: `register_plugin_function` builds an `Expr::Plugin` node. Pure data.
//! - `library`: `PluginLoader` / `PluginLibrary` / `PluginFunction` seams, plus
//!   the in-process `StaticPluginLoader`.
//! - `native`: shared-library plugins via `libloading` and the export macros.
//! - `resolver`: per-execution resolution, signature checks and invocation.
//!
//! # Safety contract
//!
//! Only argument marshalling and symbol lookup are checked. A plugin function
//! runs arbitrary native code: it can corrupt memory or abort the process, and
//! nothing here can catch that.

pub mod call;
pub mod error;
pub mod library;
pub mod native;
pub mod resolver;

pub use call::{register_plugin_function, PluginFunctionBuilder};
pub use error::{PluginError, Result};
pub use library::{PluginFunction, PluginLibrary, PluginLoader, StaticPluginLibrary, StaticPluginLoader};
pub use native::NativePluginLoader;
pub use resolver::PluginResolver;

// Used by the export macros.
pub use polyrt_core::prelude::{DataType, Field, Series};

pub const CORE_VERSION: &str = polyrt_core::VERSION;
