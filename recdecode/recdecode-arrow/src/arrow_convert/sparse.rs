use std::sync::Arc;

use arrow::array::{ArrayRef, Int64Array, StructArray};
use recdecode_core::SparseTensor;

use super::{list_array, values_to_array};
use crate::{error::ArrowConvertError, schema_convert::sparse_struct_fields};

/// Rank-2 sparse tensor to `Struct { indices: List<Int64>, values: List<T> }`.
///
/// Entries are grouped by row and ordered by column within a row, whatever
/// order the tensor stores them in.
pub(super) fn sparse_to_struct(sparse: &SparseTensor, large: bool) -> Result<ArrayRef, ArrowConvertError> {
    let nrows = sparse.dense_shape()[0] as usize;
    let mut order: Vec<usize> = (0..sparse.nnz()).collect();
    order.sort_by_key(|&i| (sparse.index(i)[0], sparse.index(i)[1]));

    let mut offsets = vec![0i64; nrows + 1];
    for &i in &order {
        offsets[sparse.index(i)[0] as usize + 1] += 1;
    }
    for row in 0..nrows {
        offsets[row + 1] += offsets[row];
    }

    let columns = Int64Array::from(order.iter().map(|&i| sparse.index(i)[1]).collect::<Vec<_>>());
    let values = values_to_array(&sparse.values().take(&order), large);
    let element = values.data_type().clone();

    let indices = list_array(Arc::new(columns), &offsets, large)?;
    let values = list_array(values, &offsets, large)?;
    let fields = sparse_struct_fields(element, large);
    Ok(Arc::new(StructArray::try_new(
        fields.into(),
        vec![indices, values],
        None,
    )?))
}
