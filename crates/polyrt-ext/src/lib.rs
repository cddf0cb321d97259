//! polyrt-ext: user-defined logical types layered over physical storage types.
//!
//! - `registry`: the guarded name → descriptor table (one process-wide instance via `global()`).
//! - `convert`: value ↔ extension reinterpretation; never copies buffers.
//! - `error`: registration and conversion errors.

#![forbid(unsafe_code)]

pub mod convert;
pub mod error;
pub mod registry;

pub use convert::{storage, to_extension};
pub use error::{RegistryError, Result};
pub use registry::{global, ExtensionOptions, ExtensionRegistry, ExtensionTypeDescriptor, RegistrySnapshot};
