//! Native backend variant.
//!
//! Build once per variant (`compat` with baseline target features, `32`, and
//! `64` with `--features bigidx`) and install the artifacts next to the host
//! as `{prefix}polyrt_runtime_{id}{suffix}`.
//!
//! The library also exports a few plugin functions so the plugin bridge can be
//! exercised against a real shared library.

use polyrt_core::prelude::{ColumnData, DataType, Field, Series};
use polyrt_engine::BuiltinBackend;

polyrt_backend::export_backend!(BuiltinBackend::new);

polyrt_plugin::export_plugin_abi!();

polyrt_plugin::export_plugin_function!(add_one => add_one, signature = [DataType::Int64]);
polyrt_plugin::export_plugin_function!(str_len => str_len, output = str_len_field);

fn add_one(inputs: &[Series], _kwargs: Option<&str>) -> Result<Series, String> {
    match inputs.first().map(|s| (s, s.data.as_ref())) {
        Some((s, ColumnData::Int64(values))) => Ok(Series::from_data(
            s.name.clone(),
            ColumnData::Int64(values.iter().map(|v| v.map(|x| x.wrapping_add(1))).collect()),
        )),
        _ => Err("add_one expects one Int64 argument".to_string()),
    }
}

fn str_len(inputs: &[Series], _kwargs: Option<&str>) -> Result<Series, String> {
    match inputs.first().map(|s| (s, s.data.as_ref())) {
        Some((s, ColumnData::String(values))) => Ok(Series::from_data(
            s.name.clone(),
            ColumnData::UInt32(
                values
                    .iter()
                    .map(|v| v.as_ref().map(|x| x.chars().count() as u32))
                    .collect(),
            ),
        )),
        _ => Err("str_len expects one String argument".to_string()),
    }
}

fn str_len_field(fields: &[Field], _kwargs: Option<&str>) -> Result<Field, String> {
    match fields {
        [field] if field.data_type == DataType::String => {
            Ok(Field::new(field.name.clone(), DataType::UInt32, field.nullable))
        }
        _ => Err("str_len expects one String argument".to_string()),
    }
}
