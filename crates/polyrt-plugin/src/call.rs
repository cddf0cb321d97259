//! Building plugin call nodes. Nothing in this module opens a library or
//! looks up a symbol.

use std::path::PathBuf;

use polyrt_core::expr::{Expr, PluginFunctionCall};
use polyrt_core::schema::DataType;

/// Reference `function_name` in the library at `library_path`, applied to `arguments`.
///
/// Returns an expression node usable anywhere an expression is accepted. The
/// library is opened and the symbol resolved only when the node is evaluated.
pub fn register_plugin_function(
    library_path: impl Into<PathBuf>,
    function_name: impl Into<String>,
    arguments: Vec<Expr>,
    elementwise: bool,
    output_type: Option<DataType>,
    cast_inputs: bool,
) -> Expr {
    PluginFunctionBuilder::new(library_path, function_name, arguments)
        .elementwise(elementwise)
        .output_type(output_type)
        .cast_inputs(cast_inputs)
        .build()
}

/// Builder for plugin calls that need more than the common options.
#[derive(Debug, Clone)]
pub struct PluginFunctionBuilder {
    call: PluginFunctionCall,
}

impl PluginFunctionBuilder {
    pub fn new(
        library_path: impl Into<PathBuf>,
        function_name: impl Into<String>,
        arguments: Vec<Expr>,
    ) -> Self {
        Self {
            call: PluginFunctionCall {
                library_path: library_path.into(),
                function_name: function_name.into(),
                arguments,
                elementwise: false,
                output_type: None,
                cast_inputs: false,
                kwargs: None,
                returns_scalar: false,
                changes_length: false,
            },
        }
    }

    pub fn elementwise(mut self, elementwise: bool) -> Self {
        self.call.elementwise = elementwise;
        self
    }

    pub fn output_type(mut self, dtype: Option<DataType>) -> Self {
        self.call.output_type = dtype;
        self
    }

    pub fn cast_inputs(mut self, cast: bool) -> Self {
        self.call.cast_inputs = cast;
        self
    }

    /// Keyword arguments, already serialized as JSON.
    pub fn kwargs(mut self, kwargs: impl Into<String>) -> Self {
        self.call.kwargs = Some(kwargs.into());
        self
    }

    pub fn returns_scalar(mut self, returns_scalar: bool) -> Self {
        self.call.returns_scalar = returns_scalar;
        self
    }

    pub fn changes_length(mut self, changes_length: bool) -> Self {
        self.call.changes_length = changes_length;
        self
    }

    pub fn build(self) -> Expr {
        Expr::Plugin(Box::new(self.call))
    }
}
