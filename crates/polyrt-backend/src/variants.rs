//! Default native variants shipped alongside the facade.
//!
//! - `compat`: baseline target features; runs on any CPU of the architecture.
//! - `64`: optimized build with 64-bit row indices (big-index).
//! - `32`: optimized build with 32-bit row indices.
//!
//! Usually only one is installed; the default order tries `compat` first,
//! matching the packaging where the compat build is an explicit opt-in.

use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
use std::path::{Path, PathBuf};

use crate::candidate::BackendCandidate;
use crate::native::NativeLoader;

pub const VARIANT_IDS: [&str; 3] = ["compat", "64", "32"];

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
const COMPAT_FLAGS: &str = "+sse,+sse2,+sse3,+ssse3,+sse4.1,+sse4.2,+popcnt";
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
const OPTIMIZED_FLAGS: &str = "+sse,+sse2,+sse3,+ssse3,+sse4.1,+sse4.2,+popcnt,+avx,+avx2,+fma,+bmi1,+bmi2,+lzcnt,+pclmulqdq,+movbe";

#[cfg(target_arch = "aarch64")]
const COMPAT_FLAGS: &str = "+neon";
#[cfg(target_arch = "aarch64")]
const OPTIMIZED_FLAGS: &str = "+neon,+crc,+lse";

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64")))]
const COMPAT_FLAGS: &str = "";
#[cfg(not(any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64")))]
const OPTIMIZED_FLAGS: &str = "";

/// Build feature flags a variant is compiled with.
pub fn feature_flags(id: &str) -> &'static str {
    if id == "compat" {
        COMPAT_FLAGS
    } else {
        OPTIMIZED_FLAGS
    }
}

/// File name of a variant library, e.g. `libpolyrt_runtime_64.so`.
pub fn library_file_name(id: &str) -> String {
    format!("{}polyrt_runtime_{}{}", DLL_PREFIX, id, DLL_SUFFIX)
}

/// Directory searched when no backend directory is configured: next to the executable.
pub fn default_backend_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}

/// The three native candidates located in `dir`, in default preference order.
pub fn native_candidates(dir: &Path) -> Vec<BackendCandidate> {
    VARIANT_IDS
        .iter()
        .map(|id| {
            BackendCandidate::new(*id, NativeLoader::new(dir.join(library_file_name(id))))
                .with_feature_flags(feature_flags(id))
        })
        .collect()
}
