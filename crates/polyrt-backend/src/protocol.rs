//! Requests a host sends to a backend living in another shared library.
//!
//! Every request and reply is JSON. Calls that can observe extension types
//! carry the host's registry, which the serving side installs into its own
//! process-wide registry before running the call.

use std::io::Cursor;

use serde::{Deserialize, Serialize};

use polyrt_core::error::{Error, Result};
use polyrt_core::prelude::{DataType, Expr, Frame, Scalar, Series};
use polyrt_ext::RegistrySnapshot;

use crate::traits::{Backend, BuildInfo};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    BuildInfo,
    IndexType,
    Construct {
        name: String,
        dtype: DataType,
        values: Vec<Scalar>,
        extensions: RegistrySnapshot,
    },
    ReadFrame {
        bytes: Vec<u8>,
        extensions: RegistrySnapshot,
    },
    WriteFrame {
        frame: Frame,
    },
    Dispatch {
        frame: Frame,
        exprs: Vec<Expr>,
        extensions: RegistrySnapshot,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Reply {
    BuildInfo(BuildInfo),
    IndexType(DataType),
    Series(Series),
    Frame(Frame),
    Bytes(Vec<u8>),
}

impl Reply {
    fn kind(&self) -> &'static str {
        match self {
            Reply::BuildInfo(_) => "BuildInfo",
            Reply::IndexType(_) => "IndexType",
            Reply::Series(_) => "Series",
            Reply::Frame(_) => "Frame",
            Reply::Bytes(_) => "Bytes",
        }
    }

    pub(crate) fn unexpected(self, wanted: &str) -> Error {
        Error::Invariant(format!("backend replied {} to a {} request", self.kind(), wanted))
    }
}

pub type Response = std::result::Result<Reply, Error>;

/// Run one encoded request against `backend`, returning the encoded response.
///
/// Panics inside the backend are reported as errors rather than unwinding
/// out of the library.
pub fn serve(backend: &dyn Backend, payload: &[u8]) -> Vec<u8> {
    let response = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let request: Request = polyrt_core::ffi::decode(payload)?;
        handle(backend, request)
    }))
    .unwrap_or_else(|_| Err(Error::Invariant("backend panicked while serving a request".into())));
    serde_json::to_vec(&response).unwrap_or_default()
}

fn handle(backend: &dyn Backend, request: Request) -> Response {
    match request {
        Request::BuildInfo => Ok(Reply::BuildInfo(backend.build_info())),
        Request::IndexType => Ok(Reply::IndexType(backend.index_type())),
        Request::Construct {
            name,
            dtype,
            values,
            extensions,
        } => {
            polyrt_ext::global().restore(&extensions);
            Ok(Reply::Series(backend.construct(&name, &dtype, values)?))
        }
        Request::ReadFrame { bytes, extensions } => {
            polyrt_ext::global().restore(&extensions);
            Ok(Reply::Frame(backend.read_frame(&mut Cursor::new(bytes))?))
        }
        Request::WriteFrame { frame } => {
            let mut out = Vec::new();
            backend.write_frame(&frame, &mut out)?;
            Ok(Reply::Bytes(out))
        }
        Request::Dispatch {
            frame,
            exprs,
            extensions,
        } => {
            polyrt_ext::global().restore(&extensions);
            Ok(Reply::Frame(backend.dispatch(&frame, &exprs)?))
        }
    }
}

/// Decode a response produced by [`serve`].
pub(crate) fn read_response(bytes: &[u8]) -> Result<Reply> {
    let response: Response = polyrt_core::ffi::decode(bytes)?;
    response
}
