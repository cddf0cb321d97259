pub use crate::config::{AllocatorConfig, RuntimeConfig, UnknownExtensionTypeBehavior};
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::expr::{col, lit, Expr, ExtensionFunction, PluginFunctionCall};
pub use crate::schema::{DataType, Field, Schema};
pub use crate::types::{ColumnData, Frame, Scalar, Series};
