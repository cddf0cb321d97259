//! Values: scalars, physical column buffers, series and frames.
//!
//! A `Series` pairs a logical `DataType` with a shared physical buffer. Changing
//! the logical type (extension conversions) clones the `Arc`, never the buffer.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::schema::{DataType, Field, Schema};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Null,
    Bool(bool),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Str(String),
    Bin(Vec<u8>),
}

/// Physical buffer of a column. One variant per physical encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnData {
    Null(usize),
    Boolean(Vec<Option<bool>>),
    Int32(Vec<Option<i32>>),
    Int64(Vec<Option<i64>>),
    UInt32(Vec<Option<u32>>),
    UInt64(Vec<Option<u64>>),
    Float32(Vec<Option<f32>>),
    Float64(Vec<Option<f64>>),
    String(Vec<Option<String>>),
    Binary(Vec<Option<Vec<u8>>>),
    Date(Vec<Option<i32>>),
}

impl ColumnData {
    /// The physical encoding of this buffer.
    pub fn physical_type(&self) -> DataType {
        match self {
            ColumnData::Null(_) => DataType::Null,
            ColumnData::Boolean(_) => DataType::Boolean,
            ColumnData::Int32(_) => DataType::Int32,
            ColumnData::Int64(_) => DataType::Int64,
            ColumnData::UInt32(_) => DataType::UInt32,
            ColumnData::UInt64(_) => DataType::UInt64,
            ColumnData::Float32(_) => DataType::Float32,
            ColumnData::Float64(_) => DataType::Float64,
            ColumnData::String(_) => DataType::String,
            ColumnData::Binary(_) => DataType::Binary,
            ColumnData::Date(_) => DataType::Date,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnData::Null(n) => *n,
            ColumnData::Boolean(v) => v.len(),
            ColumnData::Int32(v) | ColumnData::Date(v) => v.len(),
            ColumnData::Int64(v) => v.len(),
            ColumnData::UInt32(v) => v.len(),
            ColumnData::UInt64(v) => v.len(),
            ColumnData::Float32(v) => v.len(),
            ColumnData::Float64(v) => v.len(),
            ColumnData::String(v) => v.len(),
            ColumnData::Binary(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build a buffer of physical type `dtype` from scalars.
    ///
    /// Every non-null scalar must match the physical type exactly; integer
    /// literals are the only values widened (to keep literal handling simple).
    pub fn from_scalars(dtype: &DataType, values: Vec<Scalar>) -> Result<Self> {
        fn collect<T>(
            values: Vec<Scalar>,
            dtype: &DataType,
            f: impl Fn(Scalar) -> Option<T>,
        ) -> Result<Vec<Option<T>>> {
            values
                .into_iter()
                .map(|v| match v {
                    Scalar::Null => Ok(None),
                    other => {
                        let shown = format!("{:?}", other);
                        f(other).map(Some).ok_or_else(|| {
                            Error::Compute(format!("value {} does not fit {}", shown, dtype))
                        })
                    }
                })
                .collect()
        }

        Ok(match dtype.storage() {
            DataType::Null => ColumnData::Null(values.len()),
            DataType::Boolean => ColumnData::Boolean(collect(values, dtype, |v| match v {
                Scalar::Bool(b) => Some(b),
                _ => None,
            })?),
            DataType::Int32 => ColumnData::Int32(collect(values, dtype, |v| match v {
                Scalar::I32(x) => Some(x),
                _ => None,
            })?),
            DataType::Date => ColumnData::Date(collect(values, dtype, |v| match v {
                Scalar::I32(x) => Some(x),
                _ => None,
            })?),
            DataType::Int64 => ColumnData::Int64(collect(values, dtype, |v| match v {
                Scalar::I64(x) => Some(x),
                Scalar::I32(x) => Some(x as i64),
                _ => None,
            })?),
            DataType::UInt32 => ColumnData::UInt32(collect(values, dtype, |v| match v {
                Scalar::U32(x) => Some(x),
                _ => None,
            })?),
            DataType::UInt64 => ColumnData::UInt64(collect(values, dtype, |v| match v {
                Scalar::U64(x) => Some(x),
                Scalar::U32(x) => Some(x as u64),
                _ => None,
            })?),
            DataType::Float32 => ColumnData::Float32(collect(values, dtype, |v| match v {
                Scalar::F32(x) => Some(x),
                _ => None,
            })?),
            DataType::Float64 => ColumnData::Float64(collect(values, dtype, |v| match v {
                Scalar::F64(x) => Some(x),
                Scalar::F32(x) => Some(x as f64),
                _ => None,
            })?),
            DataType::String => ColumnData::String(collect(values, dtype, |v| match v {
                Scalar::Str(s) => Some(s),
                _ => None,
            })?),
            DataType::Binary => ColumnData::Binary(collect(values, dtype, |v| match v {
                Scalar::Bin(b) => Some(b),
                _ => None,
            })?),
            DataType::Extension { .. } => {
                return Err(Error::Invariant("storage() returned an extension type".into()))
            }
        })
    }

    /// Value at `idx` as a scalar (nulls and out-of-range give `Scalar::Null`).
    pub fn get(&self, idx: usize) -> Scalar {
        fn opt<T: Clone>(v: &[Option<T>], idx: usize, f: impl Fn(T) -> Scalar) -> Scalar {
            v.get(idx).cloned().flatten().map(f).unwrap_or(Scalar::Null)
        }
        match self {
            ColumnData::Null(_) => Scalar::Null,
            ColumnData::Boolean(v) => opt(v, idx, Scalar::Bool),
            ColumnData::Int32(v) | ColumnData::Date(v) => opt(v, idx, Scalar::I32),
            ColumnData::Int64(v) => opt(v, idx, Scalar::I64),
            ColumnData::UInt32(v) => opt(v, idx, Scalar::U32),
            ColumnData::UInt64(v) => opt(v, idx, Scalar::U64),
            ColumnData::Float32(v) => opt(v, idx, Scalar::F32),
            ColumnData::Float64(v) => opt(v, idx, Scalar::F64),
            ColumnData::String(v) => opt(v, idx, Scalar::Str),
            ColumnData::Binary(v) => opt(v, idx, Scalar::Bin),
        }
    }

    /// Numeric values in their widest exact form, used by casts.
    fn numeric_values(&self) -> Option<Vec<Option<Number>>> {
        fn int<T: Copy + Into<i128>>(v: &[Option<T>]) -> Vec<Option<Number>> {
            v.iter().map(|x| x.map(|x| Number::Int(x.into()))).collect()
        }
        Some(match self {
            ColumnData::Int32(v) => int(v),
            ColumnData::Int64(v) => int(v),
            ColumnData::UInt32(v) => int(v),
            ColumnData::UInt64(v) => int(v),
            ColumnData::Float32(v) => v.iter().map(|x| x.map(|x| Number::Float(x.into()))).collect(),
            ColumnData::Float64(v) => v.iter().map(|x| x.map(Number::Float)).collect(),
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i128),
    Float(f64),
}

impl Number {
    /// Exact integer value, if there is one. Floats must be integral and
    /// inside the i128 range.
    fn to_int(self) -> Option<i128> {
        match self {
            Number::Int(v) => Some(v),
            Number::Float(x) => {
                let bound = 2f64.powi(127);
                (x.fract() == 0.0 && x >= -bound && x < bound).then(|| x as i128)
            }
        }
    }

    fn to_float(self) -> f64 {
        match self {
            Number::Int(v) => v as f64,
            Number::Float(x) => x,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Series {
    pub name: String,
    pub dtype: DataType,
    pub data: Arc<ColumnData>,
}

impl PartialEq for Series {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.dtype == other.dtype && self.data == other.data
    }
}

impl Series {
    /// Create a series, checking that `dtype` is backed by the buffer's encoding.
    pub fn new(name: impl Into<String>, dtype: DataType, data: ColumnData) -> Result<Self> {
        Self::from_arc(name, dtype, Arc::new(data))
    }

    pub fn from_arc(name: impl Into<String>, dtype: DataType, data: Arc<ColumnData>) -> Result<Self> {
        let physical = data.physical_type();
        if *dtype.storage() != physical {
            return Err(Error::Conversion(format!(
                "data type {} cannot be backed by a {} buffer",
                dtype, physical
            )));
        }
        Ok(Self {
            name: name.into(),
            dtype,
            data,
        })
    }

    /// Series whose logical type equals its buffer's physical type.
    pub fn from_data(name: impl Into<String>, data: ColumnData) -> Self {
        Self {
            name: name.into(),
            dtype: data.physical_type(),
            data: Arc::new(data),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn field(&self) -> Field {
        Field::new(self.name.clone(), self.dtype.clone(), true)
    }

    pub fn rename(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// True when both series share one physical buffer.
    pub fn shares_buffer(&self, other: &Series) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// Cast to a physical numeric type. Values that do not fit become null.
    ///
    /// Casting to the current type is free (shares the buffer).
    pub fn cast(&self, to: &DataType) -> Result<Series> {
        if &self.dtype == to {
            return Ok(self.clone());
        }
        if self.dtype.is_extension() || to.is_extension() {
            return Err(Error::Conversion(format!(
                "cannot cast {} to {}; use the extension conversions instead",
                self.dtype, to
            )));
        }
        let values = match self.data.numeric_values() {
            Some(values) if to.is_numeric() => values,
            _ => {
                return Err(Error::Conversion(format!(
                    "unsupported cast from {} to {}",
                    self.dtype, to
                )))
            }
        };
        let data = match to {
            DataType::Int32 => ColumnData::Int32(cast_int(&values)),
            DataType::Int64 => ColumnData::Int64(cast_int(&values)),
            DataType::UInt32 => ColumnData::UInt32(cast_int(&values)),
            DataType::UInt64 => ColumnData::UInt64(cast_int(&values)),
            DataType::Float32 => ColumnData::Float32(values.iter().map(|x| x.map(|x| x.to_float() as f32)).collect()),
            DataType::Float64 => ColumnData::Float64(values.iter().map(|x| x.map(Number::to_float)).collect()),
            _ => unreachable!("is_numeric() covers the arms above"),
        };
        Series::new(self.name.clone(), to.clone(), data)
    }
}

fn cast_int<T: TryFrom<i128>>(values: &[Option<Number>]) -> Vec<Option<T>> {
    values
        .iter()
        .map(|x| x.and_then(Number::to_int).and_then(|v| T::try_from(v).ok()))
        .collect()
}

/// A set of equally long, named series.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Frame {
    pub columns: Vec<Series>,
}

impl Frame {
    pub fn new(columns: Vec<Series>) -> Result<Self> {
        if let Some(first) = columns.first() {
            if let Some(bad) = columns.iter().find(|c| c.len() != first.len()) {
                return Err(Error::Compute(format!(
                    "column '{}' has length {} but '{}' has length {}",
                    bad.name,
                    bad.len(),
                    first.name,
                    first.len()
                )));
            }
        }
        Ok(Self { columns })
    }

    pub fn height(&self) -> usize {
        self.columns.first().map(Series::len).unwrap_or(0)
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, name: &str) -> Option<&Series> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn schema(&self) -> Schema {
        Schema::new(self.columns.iter().map(Series::field).collect())
    }
}
