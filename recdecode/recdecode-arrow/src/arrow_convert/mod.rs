//! Conversion from decoded tensors to Arrow arrays and `RecordBatch`es.
//!
//! Every tensor becomes one column whose rows are the tensor's outer
//! dimension. Column types follow [`type_spec_to_arrow_type`].

mod sparse;

use std::sync::Arc;

use arrow::{
    array::{
        ArrayRef, BinaryArray, BooleanArray, FixedSizeListArray, Float32Array, Float64Array,
        Int32Array, Int64Array, LargeBinaryArray, LargeListArray, ListArray,
    },
    buffer::{OffsetBuffer, ScalarBuffer},
    record_batch::{RecordBatch, RecordBatchOptions},
};
use recdecode_core::{DenseTensor, NamedTensors, Tensor, TensorData, TypeSpecs, type_spec_from_value};

use crate::{
    error::ArrowConvertError,
    schema_convert::{list_item, type_spec_to_arrow_type, type_specs_to_arrow_schema},
};

/// Convert one batched tensor to an Arrow array.
pub fn tensor_to_array(tensor: &Tensor, large: bool) -> Result<ArrayRef, ArrowConvertError> {
    // Validates rank and inner dimensions the same way the schema does.
    type_spec_to_arrow_type(&type_spec_from_value(tensor), large)?;
    match tensor {
        Tensor::Dense(dense) => dense_to_array(dense, large),
        Tensor::Ragged(ragged) => list_array(
            values_to_array(ragged.values(), large),
            ragged.row_splits(),
            large,
        ),
        Tensor::Sparse(sparse) => sparse::sparse_to_struct(sparse, large),
    }
}

/// Convert decoded outputs into a `RecordBatch` laid out by `specs`.
///
/// Only the tensors named in `specs` are converted, so passing a subset of the
/// decoder's output specs projects the batch.
pub fn named_tensors_to_record_batch(
    tensors: &NamedTensors,
    specs: &TypeSpecs,
    large: bool,
) -> Result<RecordBatch, ArrowConvertError> {
    let schema = Arc::new(type_specs_to_arrow_schema(specs, large)?);
    let columns = specs
        .iter()
        .map(|(name, spec)| {
            let tensor = tensors.get(name).ok_or_else(|| ArrowConvertError::MissingTensor {
                name: name.clone(),
                available: tensors.names().map(str::to_string).collect(),
            })?;
            if !spec.is_compatible_with(tensor) {
                return Err(ArrowConvertError::SpecMismatch {
                    name: name.clone(),
                    spec: spec.clone(),
                    got: type_spec_from_value(tensor),
                });
            }
            tensor_to_array(tensor, large)
        })
        .collect::<Result<Vec<_>, _>>()?;
    let options = RecordBatchOptions::new().with_row_count(Some(tensors.batch_size().unwrap_or(0)));
    Ok(RecordBatch::try_new_with_options(schema, columns, &options)?)
}

pub(crate) fn values_to_array(data: &TensorData, large: bool) -> ArrayRef {
    match data {
        TensorData::Bool(v) => Arc::new(BooleanArray::from(v.clone())),
        TensorData::Int32(v) => Arc::new(Int32Array::from(v.clone())),
        TensorData::Int64(v) => Arc::new(Int64Array::from(v.clone())),
        TensorData::Float32(v) => Arc::new(Float32Array::from(v.clone())),
        TensorData::Float64(v) => Arc::new(Float64Array::from(v.clone())),
        TensorData::String(v) if large => Arc::new(LargeBinaryArray::from_iter_values(v.iter())),
        TensorData::String(v) => Arc::new(BinaryArray::from_iter_values(v.iter())),
    }
}

fn dense_to_array(dense: &DenseTensor, large: bool) -> Result<ArrayRef, ArrowConvertError> {
    let mut array = values_to_array(dense.data(), large);
    // Wrap from the innermost dimension outwards; the outer one becomes rows.
    for &size in dense.shape().iter().skip(1).rev() {
        let size = i32::try_from(size).map_err(|_| ArrowConvertError::OffsetOverflow)?;
        let field = Arc::new(list_item(array.data_type().clone()));
        array = Arc::new(FixedSizeListArray::try_new(field, size, array, None)?);
    }
    Ok(array)
}

/// `List` (or `LargeList`) array over `values` with the given row offsets.
pub(crate) fn list_array(
    values: ArrayRef,
    offsets: &[i64],
    large: bool,
) -> Result<ArrayRef, ArrowConvertError> {
    let field = Arc::new(list_item(values.data_type().clone()));
    if large {
        let offsets = OffsetBuffer::new(ScalarBuffer::from(offsets.to_vec()));
        return Ok(Arc::new(LargeListArray::try_new(field, offsets, values, None)?));
    }
    let offsets = offsets
        .iter()
        .map(|&o| i32::try_from(o))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| ArrowConvertError::OffsetOverflow)?;
    let offsets = OffsetBuffer::new(ScalarBuffer::from(offsets));
    Ok(Arc::new(ListArray::try_new(field, offsets, values, None)?))
}
