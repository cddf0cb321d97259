//! polyrt-backend: pick exactly one backend variant and install it behind a facade.
//!
//! - `traits`: the `Backend` primitive surface every variant implements.
//! - `cpu`: host CPU feature detection (checked *before* a variant is loaded).
//! - `candidate`: `BackendCandidate` + `BackendLoader` (how a variant is obtained).
//! - `native`: loading variants from shared libraries via `libloading`.
//! - `protocol`: the JSON requests a host sends to a variant library.
//! - `resolver`: force/prefer/version/CPU resolution algorithm.
//! - `facade`: lazily resolved, once-only `Facade` handing out the `BackendHandle`.
//! - `variants`: the default `compat` / `64` / `32` native candidates.

pub mod candidate;
pub mod cpu;
pub mod error;
pub mod facade;
pub mod native;
pub mod protocol;
pub mod resolver;
pub mod traits;
pub mod variants;

pub use candidate::{BackendCandidate, BackendLoader, FnLoader};
pub use cpu::{CpuFeatures, HostCpu, SimulatedCpu};
pub use error::{LoadError, ResolveError, SkipReason};
pub use facade::{BackendHandle, Facade};
pub use resolver::Resolver;
pub use traits::{Backend, BuildInfo};

/// Core version a native variant declares (used by `export_backend!`).
pub const CORE_VERSION: &str = polyrt_core::VERSION;
