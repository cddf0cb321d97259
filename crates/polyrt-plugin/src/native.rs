//! Plugins compiled as shared libraries.
//!
//! A plugin library exports, all through [`export_plugin_abi!`] and
//! [`export_plugin_function!`]:
//! - `_polyrt_plugin_abi`: a `#[repr(C)]` [`PluginAbi`] header;
//! - `_polyrt_plugin_free`: releases buffers the library returned;
//! - `_polyrt_plugin_{name}`: the function itself;
//! - optionally `_polyrt_plugin_signature_{name}` and `_polyrt_plugin_output_{name}`.
//!
//! Every entry point is `extern "C"` and exchanges JSON buffers, so a plugin
//! may be built by a different compiler than the host. Libraries are opened
//! once and never unloaded, so resolved entry points stay valid for the life
//! of the process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::Library;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use polyrt_core::prelude::DataType;

use crate::error::{PluginError, Result};
use crate::library::{PluginFunction, PluginLibrary, PluginLoader};

pub use polyrt_core::ffi::{RawBuffer, VersionTag};

/// Bumped whenever the header or the entry point shapes change.
pub const PLUGIN_ABI_VERSION: u32 = 2;
pub const ABI_SYMBOL: &str = "_polyrt_plugin_abi";
pub const FREE_SYMBOL: &str = "_polyrt_plugin_free";
pub const FUNCTION_PREFIX: &str = "_polyrt_plugin_";
pub const SIGNATURE_PREFIX: &str = "_polyrt_plugin_signature_";
pub const OUTPUT_PREFIX: &str = "_polyrt_plugin_output_";

#[repr(C)]
pub struct PluginAbi {
    /// Must stay the first field.
    pub abi_version: u32,
    pub core_version: VersionTag,
}

/// `(inputs json, kwargs)` to `Result` json. A null kwargs pointer means none.
pub type ExportedFn =
    unsafe extern "C" fn(args: *const u8, args_len: usize, kwargs: *const u8, kwargs_len: usize) -> RawBuffer;
pub type ExportedSignature = unsafe extern "C" fn() -> RawBuffer;
pub type FreeFn = unsafe extern "C" fn(buffer: RawBuffer);

/// Declare the ABI header of a plugin library. Invoke once per cdylib.
#[macro_export]
macro_rules! export_plugin_abi {
    () => {
        #[allow(non_upper_case_globals)]
        #[no_mangle]
        pub static _polyrt_plugin_abi: $crate::native::PluginAbi = $crate::native::PluginAbi {
            abi_version: $crate::native::PLUGIN_ABI_VERSION,
            core_version: $crate::native::VersionTag::new($crate::CORE_VERSION),
        };

        #[no_mangle]
        pub unsafe extern "C" fn _polyrt_plugin_free(buffer: $crate::native::RawBuffer) {
            buffer.release()
        }
    };
}

/// Export `$func` under `$name`, optionally with a signature and an
/// output-field callback.
///
/// ```ignore
/// export_plugin_function!(double => double_impl, signature = [DataType::Int64]);
/// export_plugin_function!(pig_latin => pig_latin_impl, output = same_as_input);
/// ```
#[macro_export]
macro_rules! export_plugin_function {
    ($name:ident => $func:path
        $(, signature = [$($dt:expr),* $(,)?])?
        $(, output = $out:path)?
        $(,)?) => {
        const _: () = {
            #[export_name = concat!("_polyrt_plugin_", stringify!($name))]
            pub unsafe extern "C" fn __polyrt_invoke(
                args: *const u8,
                args_len: usize,
                kwargs: *const u8,
                kwargs_len: usize,
            ) -> $crate::native::RawBuffer {
                $crate::native::serve_exported::<$crate::Series, $crate::Series>(
                    $func, args, args_len, kwargs, kwargs_len,
                )
            }
            $(
                #[export_name = concat!("_polyrt_plugin_signature_", stringify!($name))]
                pub extern "C" fn __polyrt_signature() -> $crate::native::RawBuffer {
                    let inputs: ::std::vec::Vec<$crate::DataType> = vec![$($dt),*];
                    $crate::native::RawBuffer::encode(&inputs)
                }
            )?
            $(
                #[export_name = concat!("_polyrt_plugin_output_", stringify!($name))]
                pub unsafe extern "C" fn __polyrt_output(
                    fields: *const u8,
                    fields_len: usize,
                    kwargs: *const u8,
                    kwargs_len: usize,
                ) -> $crate::native::RawBuffer {
                    $crate::native::serve_exported::<$crate::Field, $crate::Field>(
                        $out, fields, fields_len, kwargs, kwargs_len,
                    )
                }
            )?
        };
    };
}

/// Library side of an [`ExportedFn`]: decode the arguments, run `f` and
/// encode its result. Panics are reported as errors.
///
/// # Safety
/// Both pointer/length pairs must describe readable memory (or be null).
pub unsafe fn serve_exported<I, O>(
    f: fn(&[I], Option<&str>) -> std::result::Result<O, String>,
    args: *const u8,
    args_len: usize,
    kwargs: *const u8,
    kwargs_len: usize,
) -> RawBuffer
where
    I: DeserializeOwned,
    O: Serialize,
{
    let args = polyrt_core::ffi::bytes(args, args_len);
    let kwargs = if kwargs.is_null() {
        None
    } else {
        Some(polyrt_core::ffi::bytes(kwargs, kwargs_len))
    };
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let inputs: Vec<I> = serde_json::from_slice(args).map_err(|e| format!("malformed arguments: {}", e))?;
        let kwargs = kwargs
            .map(std::str::from_utf8)
            .transpose()
            .map_err(|e| format!("kwargs are not UTF-8: {}", e))?;
        f(&inputs, kwargs)
    }))
    .unwrap_or_else(|_| Err("plugin function panicked".to_string()));
    RawBuffer::encode(&result)
}

/// Host side of an [`ExportedFn`].
///
/// # Safety
/// `f` and `free` must come from the same loaded library.
unsafe fn call_exported<I, O>(
    f: ExportedFn,
    free: FreeFn,
    inputs: &[I],
    kwargs: Option<&str>,
) -> std::result::Result<O, String>
where
    I: Serialize,
    O: DeserializeOwned,
{
    let payload = serde_json::to_vec(inputs).map_err(|e| e.to_string())?;
    let (kw_ptr, kw_len) = match kwargs {
        Some(k) => (k.as_ptr(), k.len()),
        None => (std::ptr::null(), 0),
    };
    let reply = f(payload.as_ptr(), payload.len(), kw_ptr, kw_len).take(free);
    serde_json::from_slice::<std::result::Result<O, String>>(&reply)
        .map_err(|e| format!("malformed plugin reply: {}", e))?
}

/// Check a library's header against this build.
pub fn verify_abi(abi: &PluginAbi) -> std::result::Result<(), String> {
    if abi.abi_version != PLUGIN_ABI_VERSION {
        return Err(format!(
            "plugin ABI {} != host ABI {}",
            abi.abi_version, PLUGIN_ABI_VERSION
        ));
    }
    if abi.core_version.as_str() != polyrt_core::VERSION {
        return Err(format!(
            "built against polyrt {} but host is {}",
            abi.core_version.as_str(),
            polyrt_core::VERSION
        ));
    }
    Ok(())
}

struct NativePluginLibrary {
    path: PathBuf,
    lib: Library,
    free: FreeFn,
}

impl NativePluginLibrary {
    fn open(path: &Path) -> Result<Self> {
        let display = path.display().to_string();
        if !path.exists() {
            return Err(PluginError::LibraryNotFound {
                path: display,
                reason: "no such file".to_string(),
            });
        }
        // SAFETY: loading a plugin runs its initializers; that is the contract
        // the caller accepted by naming the library.
        let lib = unsafe { Library::new(path) }.map_err(|e| PluginError::LibraryNotFound {
            path: display.clone(),
            reason: e.to_string(),
        })?;
        let incompatible = |reason: String| PluginError::LibraryIncompatible {
            path: display.clone(),
            reason,
        };

        // SAFETY: `_polyrt_plugin_abi` is a `#[repr(C)]` static whose first
        // field is the ABI number; it is checked before anything else is used.
        let abi: *const PluginAbi = unsafe { lib.get::<*const PluginAbi>(ABI_SYMBOL.as_bytes()) }
            .map(|sym| *sym)
            .map_err(|e| incompatible(format!("missing {}: {}", ABI_SYMBOL, e)))?;
        verify_abi(unsafe { &*abi }).map_err(incompatible)?;

        // SAFETY: declared by `export_plugin_abi!` with the `FreeFn` signature.
        let free: FreeFn = unsafe { lib.get::<FreeFn>(FREE_SYMBOL.as_bytes()) }
            .map(|sym| *sym)
            .map_err(|e| incompatible(format!("missing {}: {}", FREE_SYMBOL, e)))?;

        Ok(Self {
            path: path.to_path_buf(),
            lib,
            free,
        })
    }

    fn optional<T: Copy>(&self, symbol: &str) -> Option<T> {
        // SAFETY: symbol types are fixed by `export_plugin_function!`.
        unsafe { self.lib.get::<T>(symbol.as_bytes()) }.ok().map(|s| *s)
    }
}

impl PluginLibrary for NativePluginLibrary {
    fn function(&self, function_name: &str) -> Result<PluginFunction> {
        let symbol = format!("{}{}", FUNCTION_PREFIX, function_name);
        let invoke: ExportedFn = self
            .optional(&symbol)
            .ok_or_else(|| PluginError::SymbolNotFound {
                path: self.path.display().to_string(),
                symbol: symbol.clone(),
            })?;
        let free = self.free;

        // SAFETY (closures below): entry points and `free` come from this
        // library, which is never unloaded.
        let mut function = PluginFunction::new(function_name, move |inputs, kwargs| unsafe {
            call_exported(invoke, free, inputs, kwargs)
        });
        if let Some(signature) = self.optional::<ExportedSignature>(&format!("{}{}", SIGNATURE_PREFIX, function_name)) {
            let reply = unsafe { signature().take(free) };
            let inputs: Vec<DataType> =
                serde_json::from_slice(&reply).map_err(|e| PluginError::LibraryIncompatible {
                    path: self.path.display().to_string(),
                    reason: format!("malformed signature for '{}': {}", function_name, e),
                })?;
            function = function.with_signature(inputs);
        }
        if let Some(output) = self.optional::<ExportedFn>(&format!("{}{}", OUTPUT_PREFIX, function_name)) {
            function = function.with_output_field(move |fields, kwargs| unsafe {
                call_exported(output, free, fields, kwargs)
            });
        }
        tracing::debug!(library = %self.path.display(), function = function_name, "resolved plugin symbol");
        Ok(function)
    }
}

/// Opens plugin shared libraries, keeping each one loaded after first use.
#[derive(Default)]
pub struct NativePluginLoader {
    opened: Mutex<HashMap<PathBuf, Arc<NativePluginLibrary>>>,
}

impl NativePluginLoader {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PluginLoader for NativePluginLoader {
    fn open(&self, path: &Path) -> Result<Arc<dyn PluginLibrary>> {
        let mut opened = self.opened.lock();
        if let Some(lib) = opened.get(path) {
            return Ok(lib.clone());
        }
        let lib = Arc::new(NativePluginLibrary::open(path)?);
        tracing::info!(library = %path.display(), "loaded plugin library");
        opened.insert(path.to_path_buf(), lib.clone());
        Ok(lib)
    }
}
