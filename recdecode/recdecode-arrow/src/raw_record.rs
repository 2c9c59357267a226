//! The raw record passthrough column.

use std::sync::Arc;

use arrow::{
    array::{ArrayRef, BinaryArray, LargeBinaryArray},
    datatypes::Schema,
    record_batch::RecordBatch,
};

use crate::{
    arrow_convert::list_array, error::ArrowConvertError, schema_convert::raw_record_column_field,
};

/// Append `raw_records` to `batch` as column `name`.
///
/// Row `i` of the new column is a one-element list holding `raw_records[i]`.
/// `large` must match the width decision used for the rest of the batch.
pub fn append_raw_record_column<B: AsRef<[u8]>>(
    batch: &RecordBatch,
    name: &str,
    raw_records: &[B],
    large: bool,
) -> Result<RecordBatch, ArrowConvertError> {
    if batch.schema().column_with_name(name).is_some() {
        return Err(ArrowConvertError::DuplicateColumn(name.to_string()));
    }
    if raw_records.len() != batch.num_rows() {
        return Err(ArrowConvertError::RowCountMismatch {
            name: name.to_string(),
            expected: batch.num_rows(),
            got: raw_records.len(),
        });
    }

    let values: ArrayRef = if large {
        Arc::new(LargeBinaryArray::from_iter_values(raw_records.iter()))
    } else {
        Arc::new(BinaryArray::from_iter_values(raw_records.iter()))
    };
    let offsets: Vec<i64> = (0..=raw_records.len() as i64).collect();
    let column = list_array(values, &offsets, large)?;

    let mut fields: Vec<_> = batch.schema().fields().iter().cloned().collect();
    fields.push(Arc::new(raw_record_column_field(name, large)));
    let mut columns = batch.columns().to_vec();
    columns.push(column);
    let schema = Schema::new_with_metadata(fields, batch.schema().metadata().clone());
    Ok(RecordBatch::try_new(Arc::new(schema), columns)?)
}
