use std::sync::Arc;

use arrow::datatypes::{DataType, Field, Schema};
use recdecode_core::{DType, TypeSpec, TypeSpecs};

use crate::error::ArrowConvertError;

// ---------------------------------------------------------------------------
// DType / TypeSpec to Arrow types
// ---------------------------------------------------------------------------

/// Arrow type of a single tensor element. Strings are opaque bytes.
pub fn dtype_to_arrow(dtype: DType, large: bool) -> DataType {
    match dtype {
        DType::Bool => DataType::Boolean,
        DType::Int32 => DataType::Int32,
        DType::Int64 => DataType::Int64,
        DType::Float32 => DataType::Float32,
        DType::Float64 => DataType::Float64,
        DType::String if large => DataType::LargeBinary,
        DType::String => DataType::Binary,
    }
}

/// Column type for a batched value described by `spec`.
///
/// The outer (batch) dimension becomes the rows of the column:
/// - dense rank 1: the element type
/// - dense rank >= 2: nested `FixedSizeList`, every inner dimension known
/// - ragged: `List` / `LargeList` of the element type
/// - sparse rank 2: `Struct { indices: List<Int64>, values: List<T> }` holding
///   the column indices and values of each row
pub fn type_spec_to_arrow_type(spec: &TypeSpec, large: bool) -> Result<DataType, ArrowConvertError> {
    let unsupported = |reason: &str| ArrowConvertError::UnsupportedSpec {
        spec: spec.clone(),
        reason: reason.to_string(),
    };
    let element = dtype_to_arrow(spec.dtype(), large);
    match spec {
        TypeSpec::Tensor { shape, .. } => {
            let Some((_, inner)) = shape.dims().split_first() else {
                return Err(unsupported("scalars have no batch dimension"));
            };
            inner.iter().rev().try_fold(element, |child, dim| {
                let size = dim.ok_or_else(|| unsupported("inner dimensions must be known"))?;
                let size = i32::try_from(size).map_err(|_| unsupported("dimension too large"))?;
                Ok(DataType::FixedSizeList(Arc::new(list_item(child)), size))
            })
        }
        TypeSpec::Ragged { .. } => Ok(list_type(element, large)),
        TypeSpec::Sparse { shape, .. } => {
            if shape.rank() != 2 {
                return Err(unsupported("only rank-2 sparse tensors are supported"));
            }
            Ok(sparse_struct_type(element, large))
        }
    }
}

pub fn type_spec_to_arrow_field(
    name: &str,
    spec: &TypeSpec,
    large: bool,
) -> Result<Field, ArrowConvertError> {
    Ok(Field::new(name, type_spec_to_arrow_type(spec, large)?, false))
}

/// Schema with one column per spec, in name order.
pub fn type_specs_to_arrow_schema(specs: &TypeSpecs, large: bool) -> Result<Schema, ArrowConvertError> {
    let fields = specs
        .iter()
        .map(|(name, spec)| type_spec_to_arrow_field(name, spec, large))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Schema::new(fields))
}

/// Field of the raw record passthrough column: one single-element list of
/// bytes per row.
pub fn raw_record_column_field(name: &str, large: bool) -> Field {
    Field::new(name, list_type(dtype_to_arrow(DType::String, large), large), false)
}

// ---------------------------------------------------------------------------
// Shared shapes
// ---------------------------------------------------------------------------

pub(crate) fn list_item(data_type: DataType) -> Field {
    Field::new("item", data_type, true)
}

pub(crate) fn list_type(item: DataType, large: bool) -> DataType {
    let item = Arc::new(list_item(item));
    if large {
        DataType::LargeList(item)
    } else {
        DataType::List(item)
    }
}

pub(crate) fn sparse_struct_fields(element: DataType, large: bool) -> Vec<Field> {
    vec![
        Field::new("indices", list_type(DataType::Int64, large), false),
        Field::new("values", list_type(element, large), false),
    ]
}

fn sparse_struct_type(element: DataType, large: bool) -> DataType {
    DataType::Struct(sparse_struct_fields(element, large).into())
}
