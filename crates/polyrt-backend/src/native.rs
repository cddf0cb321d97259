//! Loading backend variants from shared libraries.
//!
//! A variant library exports a `#[repr(C)]` [`BackendDeclaration`] under
//! `POLYRT_BACKEND_DECLARATION` (see `export_backend!`). Only the ABI number is
//! trusted before anything else is read. After that the host talks to the
//! variant through two `extern "C"` functions exchanging JSON buffers, so the
//! variant may be built by a different compiler than the host. The declared
//! core version becomes the backend's version and goes through the resolver's
//! version gate like any other candidate.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use libloading::{Library, Symbol};

use polyrt_core::error::{Error, Result};
pub use polyrt_core::ffi::{RawBuffer, VersionTag};
use polyrt_core::prelude::{DataType, Expr, Frame, Scalar, Series};

use crate::candidate::BackendLoader;
use crate::error::LoadError;
use crate::protocol::{self, Reply, Request};
use crate::traits::{Backend, BuildInfo};

/// Bumped whenever `BackendDeclaration` or the request protocol changes shape.
pub const BACKEND_ABI_VERSION: u32 = 2;

pub const DECLARATION_SYMBOL: &str = "POLYRT_BACKEND_DECLARATION";

/// Serve one JSON request; the reply buffer belongs to the library.
pub type CallFn = unsafe extern "C" fn(request: *const u8, len: usize) -> RawBuffer;
/// Release a buffer returned by [`CallFn`].
pub type FreeFn = unsafe extern "C" fn(buffer: RawBuffer);

#[repr(C)]
pub struct BackendDeclaration {
    /// Must stay the first field.
    pub abi_version: u32,
    pub core_version: VersionTag,
    pub call: CallFn,
    pub free: FreeFn,
}

/// Export a backend constructor from a `cdylib`.
///
/// The backend is built on the first request and serves every later one.
///
/// ```rust,ignore
/// polyrt_backend::export_backend!(MyBackend::new);
/// ```
#[macro_export]
macro_rules! export_backend {
    ($ctor:expr) => {
        const _: () = {
            static BACKEND: ::std::sync::OnceLock<::std::boxed::Box<dyn $crate::Backend>> =
                ::std::sync::OnceLock::new();

            unsafe extern "C" fn __polyrt_backend_call(
                request: *const u8,
                len: usize,
            ) -> $crate::native::RawBuffer {
                let backend = BACKEND.get_or_init(|| ::std::boxed::Box::new(($ctor)()));
                let payload = $crate::native::request_bytes(request, len);
                $crate::native::RawBuffer::from_vec($crate::protocol::serve(backend.as_ref(), payload))
            }

            unsafe extern "C" fn __polyrt_backend_free(buffer: $crate::native::RawBuffer) {
                buffer.release()
            }

            #[no_mangle]
            pub static POLYRT_BACKEND_DECLARATION: $crate::native::BackendDeclaration =
                $crate::native::BackendDeclaration {
                    abi_version: $crate::native::BACKEND_ABI_VERSION,
                    core_version: $crate::native::VersionTag::new($crate::CORE_VERSION),
                    call: __polyrt_backend_call,
                    free: __polyrt_backend_free,
                };
        };
    };
}

/// View the request buffer passed to a [`CallFn`].
///
/// # Safety
/// `ptr` must point at `len` readable bytes for the duration of the call.
pub unsafe fn request_bytes<'a>(ptr: *const u8, len: usize) -> &'a [u8] {
    polyrt_core::ffi::bytes(ptr, len)
}

/// Wrap a declaration that is already linked into this process, e.g. a
/// variant built as a static library.
pub fn from_declaration(decl: &'static BackendDeclaration) -> std::result::Result<Arc<dyn Backend>, LoadError> {
    checked(decl, None)
}

fn checked(
    decl: &BackendDeclaration,
    lib: Option<Library>,
) -> std::result::Result<Arc<dyn Backend>, LoadError> {
    if decl.abi_version != BACKEND_ABI_VERSION {
        return Err(LoadError::Abi {
            expected: BACKEND_ABI_VERSION,
            found: decl.abi_version,
        });
    }
    Ok(Arc::new(NativeBackend {
        version: decl.core_version.as_str().to_string(),
        call: decl.call,
        free: decl.free,
        info: OnceLock::new(),
        index_type: OnceLock::new(),
        _lib: lib,
    }))
}

/// Loads a variant from a shared library on disk.
#[derive(Debug, Clone)]
pub struct NativeLoader {
    path: PathBuf,
}

impl NativeLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BackendLoader for NativeLoader {
    fn load(&self) -> std::result::Result<Arc<dyn Backend>, LoadError> {
        if !self.path.exists() {
            return Err(LoadError::NotFound(self.path.display().to_string()));
        }

        // SAFETY: loading runs the library's initializers. Variants are our own
        // builds; CPU compatibility was checked by the resolver before this call.
        let lib = unsafe { Library::new(&self.path) }.map_err(|e| LoadError::Open(e.to_string()))?;

        // SAFETY: the symbol is a `#[repr(C)]` static whose first field is the
        // ABI number; nothing past it is read until that number matches.
        let decl: *const BackendDeclaration = unsafe {
            let sym: Symbol<*const BackendDeclaration> = lib
                .get(DECLARATION_SYMBOL.as_bytes())
                .map_err(|_| LoadError::Symbol(DECLARATION_SYMBOL.to_string()))?;
            *sym
        };
        // SAFETY: non-null static that lives as long as `lib`, which the
        // returned backend owns.
        checked(unsafe { &*decl }, Some(lib))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Host-side proxy for a backend served through a declaration. Holds the
/// library so the function pointers stay valid.
struct NativeBackend {
    version: String,
    call: CallFn,
    free: FreeFn,
    info: OnceLock<BuildInfo>,
    index_type: OnceLock<DataType>,
    _lib: Option<Library>,
}

impl NativeBackend {
    fn request(&self, request: &Request) -> Result<Reply> {
        let payload = serde_json::to_vec(request)?;
        // SAFETY: `call` and `free` come from a declaration whose ABI number
        // matched; the reply buffer is handed back to the same library.
        let bytes = unsafe { (self.call)(payload.as_ptr(), payload.len()).take(self.free) };
        protocol::read_response(&bytes)
    }

    fn extensions() -> polyrt_ext::RegistrySnapshot {
        polyrt_ext::global().snapshot()
    }
}

impl Backend for NativeBackend {
    fn version(&self) -> &str {
        &self.version
    }

    fn build_info(&self) -> BuildInfo {
        self.info
            .get_or_init(|| match self.request(&Request::BuildInfo) {
                Ok(Reply::BuildInfo(info)) => info,
                other => {
                    tracing::warn!(result = ?other.err(), "backend variant did not report build info");
                    BuildInfo {
                        version: self.version.clone(),
                        variant: None,
                        features: Vec::new(),
                        target: "unknown".to_string(),
                    }
                }
            })
            .clone()
    }

    fn index_type(&self) -> DataType {
        self.index_type
            .get_or_init(|| match self.request(&Request::IndexType) {
                Ok(Reply::IndexType(dtype)) => dtype,
                other => {
                    tracing::warn!(result = ?other.err(), "backend variant did not report its index type");
                    DataType::UInt32
                }
            })
            .clone()
    }

    fn construct(&self, name: &str, dtype: &DataType, values: Vec<Scalar>) -> Result<Series> {
        let request = Request::Construct {
            name: name.to_string(),
            dtype: dtype.clone(),
            values,
            extensions: Self::extensions(),
        };
        match self.request(&request)? {
            Reply::Series(series) => Ok(series),
            other => Err(other.unexpected("construct")),
        }
    }

    fn read_frame(&self, reader: &mut dyn Read) -> Result<Frame> {
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(|e| Error::Compute(e.to_string()).with_context("reading frame"))?;
        let request = Request::ReadFrame {
            bytes,
            extensions: Self::extensions(),
        };
        match self.request(&request)? {
            Reply::Frame(frame) => Ok(frame),
            other => Err(other.unexpected("read_frame")),
        }
    }

    fn write_frame(&self, frame: &Frame, writer: &mut dyn Write) -> Result<()> {
        let request = Request::WriteFrame { frame: frame.clone() };
        match self.request(&request)? {
            Reply::Bytes(bytes) => writer
                .write_all(&bytes)
                .map_err(|e| Error::Compute(e.to_string()).with_context("writing frame")),
            other => Err(other.unexpected("write_frame")),
        }
    }

    fn dispatch(&self, frame: &Frame, exprs: &[Expr]) -> Result<Frame> {
        let request = Request::Dispatch {
            frame: frame.clone(),
            exprs: exprs.to_vec(),
            extensions: Self::extensions(),
        };
        match self.request(&request)? {
            Reply::Frame(frame) => Ok(frame),
            other => Err(other.unexpected("dispatch")),
        }
    }
}
