//! Per-execution plugin resolution.
//!
//! One `PluginResolver` lives for one evaluation pass. Each library path is
//! opened at most once and each `(library, function)` pair is resolved at most
//! once within that pass, however many times the call appears.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use polyrt_core::expr::PluginFunctionCall;
use polyrt_core::prelude::{Field, Series};

use crate::error::{PluginError, Result};
use crate::library::{PluginFunction, PluginLibrary, PluginLoader};

pub struct PluginResolver<'a> {
    loader: &'a dyn PluginLoader,
    libraries: HashMap<PathBuf, Arc<dyn PluginLibrary>>,
    functions: HashMap<(PathBuf, String), Arc<PluginFunction>>,
}

impl<'a> PluginResolver<'a> {
    pub fn new(loader: &'a dyn PluginLoader) -> Self {
        Self {
            loader,
            libraries: HashMap::new(),
            functions: HashMap::new(),
        }
    }

    /// Number of distinct functions resolved so far.
    pub fn resolved_count(&self) -> usize {
        self.functions.len()
    }

    pub fn resolve(&mut self, call: &PluginFunctionCall) -> Result<Arc<PluginFunction>> {
        let key = (call.library_path.clone(), call.function_name.clone());
        if let Some(f) = self.functions.get(&key) {
            return Ok(f.clone());
        }

        let library = match self.libraries.get(&call.library_path) {
            Some(lib) => lib.clone(),
            None => {
                let lib = self.loader.open(&call.library_path)?;
                self.libraries.insert(call.library_path.clone(), lib.clone());
                lib
            }
        };
        let function = Arc::new(library.function(&call.function_name)?);
        self.functions.insert(key, function.clone());
        Ok(function)
    }

    /// Output field of `call` for the given input fields, without invoking it.
    ///
    /// An explicit output type on the call wins; otherwise the plugin's schema
    /// callback decides.
    pub fn output_field(&mut self, call: &PluginFunctionCall, inputs: &[Field]) -> Result<Field> {
        let function = self.resolve(call)?;
        let checked = check_fields(&function, call, inputs)?;
        output_field(&function, call, &checked)
    }

    /// Check and cast `inputs`, invoke the function and validate its result.
    pub fn invoke(&mut self, call: &PluginFunctionCall, inputs: Vec<Series>) -> Result<Series> {
        let function = self.resolve(call)?;
        let inputs = prepare_inputs(&function, call, inputs)?;
        let fields: Vec<Field> = inputs.iter().map(Series::field).collect();
        let expected = output_field(&function, call, &fields)?;

        let result = function
            .invoke(&inputs, call.kwargs.as_deref())
            .map_err(|message| PluginError::Execution {
                function: call.function_name.clone(),
                message,
            })?;

        if result.dtype != expected.data_type {
            return Err(PluginError::SignatureMismatch {
                function: call.function_name.clone(),
                detail: format!(
                    "declared output type {} but the function returned {}",
                    expected.data_type, result.dtype
                ),
            });
        }
        if call.elementwise && !call.changes_length && !call.returns_scalar {
            if let Some(first) = inputs.first() {
                if result.len() != first.len() {
                    return Err(PluginError::SignatureMismatch {
                        function: call.function_name.clone(),
                        detail: format!(
                            "elementwise function returned {} rows for {} input rows",
                            result.len(),
                            first.len()
                        ),
                    });
                }
            }
        }
        if call.returns_scalar && result.len() != 1 {
            return Err(PluginError::SignatureMismatch {
                function: call.function_name.clone(),
                detail: format!("expected a single value, got {} rows", result.len()),
            });
        }
        Ok(result.rename(expected.name))
    }
}

fn check_arity(function: &PluginFunction, call: &PluginFunctionCall, found: usize) -> Result<()> {
    if let Some(signature) = function.signature() {
        if signature.len() != found {
            return Err(PluginError::SignatureMismatch {
                function: call.function_name.clone(),
                detail: format!("expected {} arguments, got {}", signature.len(), found),
            });
        }
    }
    Ok(())
}

fn check_fields(function: &PluginFunction, call: &PluginFunctionCall, inputs: &[Field]) -> Result<Vec<Field>> {
    let Some(signature) = function.signature() else {
        return Ok(inputs.to_vec());
    };
    check_arity(function, call, inputs.len())?;
    inputs
        .iter()
        .zip(signature)
        .enumerate()
        .map(|(i, (field, expected))| {
            if field.data_type == *expected || (call.cast_inputs && field.data_type.is_numeric() && expected.is_numeric()) {
                Ok(Field::new(field.name.clone(), expected.clone(), field.nullable))
            } else {
                Err(argument_mismatch(call, i, expected, &field.data_type))
            }
        })
        .collect()
}

fn prepare_inputs(function: &PluginFunction, call: &PluginFunctionCall, inputs: Vec<Series>) -> Result<Vec<Series>> {
    let Some(signature) = function.signature() else {
        return Ok(inputs);
    };
    check_arity(function, call, inputs.len())?;
    inputs
        .into_iter()
        .zip(signature)
        .enumerate()
        .map(|(i, (series, expected))| {
            if series.dtype == *expected {
                Ok(series)
            } else if call.cast_inputs {
                series.cast(expected).map_err(|e| PluginError::SignatureMismatch {
                    function: call.function_name.clone(),
                    detail: format!("argument {} cannot be cast: {}", i, e),
                })
            } else {
                Err(argument_mismatch(call, i, expected, &series.dtype))
            }
        })
        .collect()
}

fn argument_mismatch(
    call: &PluginFunctionCall,
    index: usize,
    expected: &polyrt_core::schema::DataType,
    found: &polyrt_core::schema::DataType,
) -> PluginError {
    PluginError::SignatureMismatch {
        function: call.function_name.clone(),
        detail: format!("argument {} expected {}, found {}", index, expected, found),
    }
}

fn output_field(function: &PluginFunction, call: &PluginFunctionCall, inputs: &[Field]) -> Result<Field> {
    let name = inputs
        .first()
        .map(|f| f.name.clone())
        .unwrap_or_else(|| call.function_name.clone());

    if let Some(dtype) = &call.output_type {
        return Ok(Field::new(name, dtype.clone(), true));
    }
    match function.output_field(inputs, call.kwargs.as_deref()) {
        Some(Ok(field)) => Ok(field),
        Some(Err(detail)) => Err(PluginError::SignatureMismatch {
            function: call.function_name.clone(),
            detail,
        }),
        None => Err(PluginError::OutputTypeUnresolvable(call.function_name.clone())),
    }
}
