//! JSON frame format.
//!
//! A frame is written as its serde representation. On read every column is
//! re-validated (buffer encoding vs. dtype, equal lengths) and extension dtypes
//! are mapped through the registry's unknown-type policy.

use std::io::{Read, Write};

use polyrt_core::error::{Error, Result};
use polyrt_core::prelude::{ColumnData, Frame, Series};
use polyrt_ext::ExtensionRegistry;

/// Longest all-null frame accepted on read. A null column stores only its
/// length, so without values in another column that length is unchecked.
pub const MAX_UNBACKED_NULL_ROWS: usize = 1 << 20;

pub fn read_frame(reader: &mut dyn Read, extensions: &ExtensionRegistry) -> Result<Frame> {
    let raw: Frame = serde_json::from_reader(reader)
        .map_err(|e| Error::from(e).with_context("reading frame"))?;
    check_null_lengths(&raw).map_err(|e| e.with_context("reading frame"))?;

    let columns = raw
        .columns
        .into_iter()
        .map(|column| {
            let dtype = extensions.resolve_loaded(&column.dtype)?;
            Series::from_arc(column.name, dtype, column.data)
        })
        .collect::<Result<Vec<_>>>()?;
    Frame::new(columns)
}

/// Null columns must match a column that holds values, or stay under
/// [`MAX_UNBACKED_NULL_ROWS`] when there is none.
fn check_null_lengths(frame: &Frame) -> Result<()> {
    let is_null = |c: &&Series| matches!(*c.data, ColumnData::Null(_));
    let limit = frame
        .columns
        .iter()
        .find(|c| !is_null(c))
        .map(Series::len)
        .unwrap_or(MAX_UNBACKED_NULL_ROWS);
    match frame.columns.iter().filter(is_null).find(|c| c.len() > limit) {
        Some(column) => Err(Error::Compute(format!(
            "null column '{}' claims {} rows but at most {} are allowed",
            column.name,
            column.len(),
            limit
        ))),
        None => Ok(()),
    }
}

pub fn write_frame(frame: &Frame, writer: &mut dyn Write) -> Result<()> {
    serde_json::to_writer(writer, frame).map_err(|e| Error::from(e).with_context("writing frame"))
}
