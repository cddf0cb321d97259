//! Expression nodes handed to the backend's compute-dispatch primitive.
//!
//! Nodes are pure data. Building one never touches the backend, the extension
//! registry or any plugin library; all of that happens during evaluation.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::schema::DataType;
use crate::types::Scalar;

/// Extension-type functions (`ext.to` / `ext.storage`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExtensionFunction {
    /// Reinterpret the input as the named, registered extension type.
    To(String),
    /// View the storage of an extension-typed input (identity otherwise).
    Storage,
}

/// Deferred call of a function living in an external native library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginFunctionCall {
    pub library_path: PathBuf,
    pub function_name: String,
    pub arguments: Vec<Expr>,
    /// The function maps each row independently (safe to run per chunk).
    pub elementwise: bool,
    /// Output dtype known ahead of time; otherwise the plugin's schema callback decides.
    pub output_type: Option<DataType>,
    /// Cast arguments to the declared signature instead of rejecting them.
    pub cast_inputs: bool,
    /// Serialized (JSON) keyword arguments passed through to the function.
    pub kwargs: Option<String>,
    pub returns_scalar: bool,
    pub changes_length: bool,
}

/// Expression AST.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Column reference: "column_name"
    Column(String),
    /// Literal value, broadcast to the frame height.
    Literal(Scalar),
    Alias {
        expr: Box<Expr>,
        name: String,
    },
    /// Numeric cast between physical types.
    Cast {
        expr: Box<Expr>,
        dtype: DataType,
    },
    Extension {
        function: ExtensionFunction,
        input: Box<Expr>,
    },
    Plugin(Box<PluginFunctionCall>),
}

pub fn col(name: impl Into<String>) -> Expr {
    Expr::Column(name.into())
}

pub fn lit(value: Scalar) -> Expr {
    Expr::Literal(value)
}

impl Expr {
    pub fn alias(self, name: impl Into<String>) -> Expr {
        Expr::Alias {
            expr: Box::new(self),
            name: name.into(),
        }
    }

    pub fn cast(self, dtype: DataType) -> Expr {
        Expr::Cast {
            expr: Box::new(self),
            dtype,
        }
    }

    pub fn ext_to(self, extension_name: impl Into<String>) -> Expr {
        Expr::Extension {
            function: ExtensionFunction::To(extension_name.into()),
            input: Box::new(self),
        }
    }

    pub fn ext_storage(self) -> Expr {
        Expr::Extension {
            function: ExtensionFunction::Storage,
            input: Box::new(self),
        }
    }

    /// Direct children of this node.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Column(_) | Expr::Literal(_) => vec![],
            Expr::Alias { expr, .. } | Expr::Cast { expr, .. } => vec![expr.as_ref()],
            Expr::Extension { input, .. } => vec![input.as_ref()],
            Expr::Plugin(call) => call.arguments.iter().collect(),
        }
    }

    /// All plugin call nodes in this tree, in depth-first (pre-order) order.
    pub fn plugin_calls(&self) -> Vec<&PluginFunctionCall> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(e) = stack.pop() {
            if let Expr::Plugin(call) = e {
                out.push(call.as_ref());
            }
            stack.extend(e.children().into_iter().rev());
        }
        out
    }

    /// Output name of this expression (first column reference, or the alias).
    pub fn output_name(&self) -> String {
        match self {
            Expr::Column(name) => name.clone(),
            Expr::Literal(_) => "literal".to_string(),
            Expr::Alias { name, .. } => name.clone(),
            Expr::Cast { expr, .. } => expr.output_name(),
            Expr::Extension { input, .. } => input.output_name(),
            Expr::Plugin(call) => call
                .arguments
                .first()
                .map(Expr::output_name)
                .unwrap_or_else(|| call.function_name.clone()),
        }
    }
}
