#![deny(unsafe_code)]
//! polyrt-core: shared kernel for the polyrt facade.
//!
//! This crate contains only *pure* types and small helpers that the other
//! crates build on. There is **no I/O** and **no dynamic loading** here;
//! `ffi` only defines the plain-C types the loaders exchange.
//!
//! Crates that use this:
//! - polyrt-backend: the `Backend` primitive surface speaks `Series`/`Frame`/`Expr`.
//! - polyrt-ext: extension descriptors layer over `DataType` storage types.
//! - polyrt-plugin: builds `Expr::Plugin` nodes and checks `Field` signatures.
//! - polyrt-engine: evaluates `Expr` against `Frame`s.

pub mod config;
pub mod error;
#[allow(unsafe_code)]
pub mod ffi;
pub mod expr;
pub mod prelude;
pub mod schema;
pub mod types;

/// Version every backend variant and plugin library must be built against.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
