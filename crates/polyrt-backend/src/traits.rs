//! The primitive operation surface a backend variant provides.
//!
//! Higher layers (frames, lazy plans, I/O, SQL) only ever call these entry
//! points, through the `Facade`. Their behavior must not depend on which
//! variant was resolved.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use polyrt_core::error::Result;
use polyrt_core::prelude::{DataType, Expr, Frame, Scalar, Series};

/// Build metadata reported by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInfo {
    pub version: String,
    /// Candidate id the facade resolved to; filled in by the facade.
    pub variant: Option<String>,
    /// Enabled build features (cargo features and target features).
    pub features: Vec<String>,
    pub target: String,
}

pub trait Backend: Send + Sync + 'static {
    /// Package version the variant was built as; compared against the facade's.
    fn version(&self) -> &str;

    fn build_info(&self) -> BuildInfo;

    /// Integer type used for row indices (`UInt32`, or `UInt64` for big-index builds).
    fn index_type(&self) -> DataType;

    /// Construct a series of `dtype` from scalar values.
    fn construct(&self, name: &str, dtype: &DataType, values: Vec<Scalar>) -> Result<Series>;

    fn read_frame(&self, reader: &mut dyn Read) -> Result<Frame>;

    fn write_frame(&self, frame: &Frame, writer: &mut dyn Write) -> Result<()>;

    /// Evaluate each expression against `frame`, one output column per expression.
    fn dispatch(&self, frame: &Frame, exprs: &[Expr]) -> Result<Frame>;
}
