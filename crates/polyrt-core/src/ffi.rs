//! Plain-C types shared by every shared-library boundary.
//!
//! Variant and plugin libraries may be built by a different compiler than the
//! host, so nothing with a Rust layout crosses the boundary. Exported statics
//! are `#[repr(C)]` headers holding integers and fixed byte arrays, and calls
//! are `extern "C"` functions taking and returning JSON byte buffers. A buffer
//! returned by a library is always released by that library's own free
//! function.

use serde::de::DeserializeOwned;
use serde::Serialize;

const TAG_CAPACITY: usize = 64;

/// A short string stored inline, readable without trusting the other side's
/// string layout.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct VersionTag {
    len: u32,
    bytes: [u8; TAG_CAPACITY],
}

impl VersionTag {
    /// Truncates to 64 bytes.
    pub const fn new(value: &str) -> Self {
        let src = value.as_bytes();
        let mut bytes = [0u8; TAG_CAPACITY];
        let mut i = 0;
        while i < src.len() && i < TAG_CAPACITY {
            bytes[i] = src[i];
            i += 1;
        }
        Self { len: i as u32, bytes }
    }

    pub fn as_str(&self) -> &str {
        let len = (self.len as usize).min(TAG_CAPACITY);
        std::str::from_utf8(&self.bytes[..len]).unwrap_or("<invalid>")
    }
}

impl std::fmt::Debug for VersionTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

/// An owned byte buffer handed across the boundary.
#[repr(C)]
pub struct RawBuffer {
    ptr: *mut u8,
    len: usize,
    cap: usize,
}

impl RawBuffer {
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        let mut bytes = std::mem::ManuallyDrop::new(bytes);
        Self {
            ptr: bytes.as_mut_ptr(),
            len: bytes.len(),
            cap: bytes.capacity(),
        }
    }

    /// Serialize `value` as JSON into a new buffer.
    pub fn encode<T: Serialize>(value: &T) -> Self {
        // Serializing our own types to a Vec only fails on non-string map keys.
        Self::from_vec(serde_json::to_vec(value).unwrap_or_default())
    }

    /// Release a buffer created by [`RawBuffer::from_vec`] in this library.
    ///
    /// # Safety
    /// `self` must come from `from_vec` in the same binary and not be used again.
    pub unsafe fn release(self) {
        drop(Vec::from_raw_parts(self.ptr, self.len, self.cap));
    }

    /// Copy the contents out, then hand the buffer back to `free`.
    ///
    /// # Safety
    /// `self` must have been produced by the library that exported `free`.
    pub unsafe fn take(self, free: unsafe extern "C" fn(RawBuffer)) -> Vec<u8> {
        let bytes = bytes(self.ptr, self.len).to_vec();
        free(self);
        bytes
    }
}

/// View a `(ptr, len)` pair as a slice. A null pointer reads as empty.
///
/// # Safety
/// A non-null `ptr` must point at `len` readable bytes that outlive `'a`.
pub unsafe fn bytes<'a>(ptr: *const u8, len: usize) -> &'a [u8] {
    if ptr.is_null() || len == 0 {
        &[]
    } else {
        std::slice::from_raw_parts(ptr, len)
    }
}

/// Decode a JSON payload received from across the boundary.
pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> crate::error::Result<T> {
    serde_json::from_slice(payload).map_err(|e| crate::error::Error::from(e).with_context("decoding library payload"))
}

