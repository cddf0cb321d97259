//! Value ↔ extension conversions. Both directions reinterpret the same
//! physical buffer; neither copies.

use std::sync::Arc;

use polyrt_core::types::Series;

use crate::error::{RegistryError, Result};
use crate::registry::ExtensionTypeDescriptor;

/// View `series` as the extension type described by `descriptor`.
///
/// The series' dtype must equal the descriptor's storage type exactly; there is
/// no implicit cast.
pub fn to_extension(series: &Series, descriptor: &ExtensionTypeDescriptor) -> Result<Series> {
    if series.dtype != descriptor.storage_type {
        return Err(RegistryError::Conversion {
            name: descriptor.name.clone(),
            expected: descriptor.storage_type.clone(),
            found: series.dtype.clone(),
        });
    }
    Ok(Series {
        name: series.name.clone(),
        dtype: descriptor.dtype(),
        data: Arc::clone(&series.data),
    })
}

/// Storage view of `series`; non-extension series are returned as-is.
pub fn storage(series: &Series) -> Series {
    Series {
        name: series.name.clone(),
        dtype: series.dtype.storage().clone(),
        data: Arc::clone(&series.data),
    }
}
