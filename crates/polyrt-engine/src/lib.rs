//! polyrt-engine: the reference backend.
//!
//! Implements the `Backend` primitive surface in-process:
//! - `backend`: `BuiltinBackend` and its `"builtin"` candidate.
//! - `eval`: expression evaluation (columns, literals, casts, extension
//!   conversions, plugin calls).
//! - `codec`: JSON frame reading/writing.

#![forbid(unsafe_code)]

pub mod backend;
pub mod codec;
pub mod eval;

pub use backend::{candidate, BuiltinBackend, BUILTIN_ID};
