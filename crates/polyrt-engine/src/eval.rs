//! Expression evaluation against a frame.
//!
//! One `Evaluator` covers one dispatch call; its `PluginResolver` is what
//! bounds plugin resolution to once per `(library, function)` per pass.

use polyrt_core::error::{Error, Result};
use polyrt_core::prelude::{ColumnData, DataType, Expr, ExtensionFunction, Frame, Scalar, Series};
use polyrt_ext::ExtensionRegistry;
use polyrt_plugin::{PluginLoader, PluginResolver};

pub struct Evaluator<'a> {
    frame: &'a Frame,
    extensions: &'a ExtensionRegistry,
    plugins: PluginResolver<'a>,
}

impl<'a> Evaluator<'a> {
    pub fn new(frame: &'a Frame, extensions: &'a ExtensionRegistry, plugins: &'a dyn PluginLoader) -> Self {
        Self {
            frame,
            extensions,
            plugins: PluginResolver::new(plugins),
        }
    }

    /// Rows a broadcast literal or scalar result expands to.
    fn height(&self) -> usize {
        if self.frame.width() == 0 {
            1
        } else {
            self.frame.height()
        }
    }

    /// Evaluate `expr` as an output column: named after the expression and
    /// broadcast to the frame height when it produced a single value.
    pub fn column(&mut self, expr: &Expr) -> Result<Series> {
        let series = self.eval(expr)?;
        let series = if series.len() == 1 && self.height() != 1 {
            broadcast(&series, self.height())?
        } else {
            series
        };
        Ok(series.rename(expr.output_name()))
    }

    pub fn eval(&mut self, expr: &Expr) -> Result<Series> {
        match expr {
            Expr::Column(name) => self
                .frame
                .column(name)
                .cloned()
                .ok_or_else(|| Error::Compute(format!("column '{}' not found", name))),
            Expr::Literal(value) => literal(value, self.height()),
            Expr::Alias { expr, name } => Ok(self.eval(expr)?.rename(name.clone())),
            Expr::Cast { expr, dtype } => self.eval(expr)?.cast(dtype),
            Expr::Extension { function, input } => {
                let series = self.eval(input)?;
                match function {
                    ExtensionFunction::To(name) => Ok(self.extensions.to_extension(&series, name)?),
                    ExtensionFunction::Storage => Ok(polyrt_ext::storage(&series)),
                }
            }
            Expr::Plugin(call) => {
                let inputs = call
                    .arguments
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>>>()?;
                tracing::trace!(function = %call.function_name, args = inputs.len(), "invoking plugin function");
                Ok(self.plugins.invoke(call, inputs)?)
            }
        }
    }
}

fn scalar_type(value: &Scalar) -> DataType {
    match value {
        Scalar::Null => DataType::Null,
        Scalar::Bool(_) => DataType::Boolean,
        Scalar::I32(_) => DataType::Int32,
        Scalar::I64(_) => DataType::Int64,
        Scalar::U32(_) => DataType::UInt32,
        Scalar::U64(_) => DataType::UInt64,
        Scalar::F32(_) => DataType::Float32,
        Scalar::F64(_) => DataType::Float64,
        Scalar::Str(_) => DataType::String,
        Scalar::Bin(_) => DataType::Binary,
    }
}

fn literal(value: &Scalar, height: usize) -> Result<Series> {
    let data = repeat(&scalar_type(value), value.clone(), height)?;
    Ok(Series::from_data("literal", data))
}

/// Repeat the single value of `series` `height` times, keeping its dtype.
fn broadcast(series: &Series, height: usize) -> Result<Series> {
    let data = repeat(series.dtype.storage(), series.data.get(0), height)?;
    Series::new(series.name.clone(), series.dtype.clone(), data)
}

/// Null columns only record their length, so nothing is allocated for them.
fn repeat(dtype: &DataType, value: Scalar, height: usize) -> Result<ColumnData> {
    if *dtype == DataType::Null {
        return Ok(ColumnData::Null(height));
    }
    ColumnData::from_scalars(dtype, vec![value; height])
}
