use std::sync::Arc;

use anyhow::{Result, bail};
use arrow::{
    array::{Array, ArrayRef, AsArray, Int64Array},
    compute::take,
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use clap::ValueEnum;

#[derive(Clone, Copy, Debug, ValueEnum)]
#[value(rename_all = "kebab-case")]
pub enum OutputFormat {
    Jsonl,
    Csv,
    Parquet,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum CsvColumn {
    Keep,
    Unwrap,
    Drop,
}

/// Reshapes batches into columns the output format can hold.
///
/// CSV holds only flat values: list columns with at most one value per row
/// are unwrapped, other nested columns are dropped. The column layout is fixed
/// by the first batch, since the header is written once.
pub struct BatchShaper {
    format: OutputFormat,
    csv_layout: Option<Vec<(String, CsvColumn)>>,
}

impl BatchShaper {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            csv_layout: None,
        }
    }

    /// Returns the reshaped batch and the names of columns dropped by the
    /// layout. Dropped names are only reported for the first batch.
    pub fn prepare(&mut self, batch: RecordBatch) -> Result<(RecordBatch, Vec<String>)> {
        match self.format {
            OutputFormat::Jsonl | OutputFormat::Parquet => Ok((batch, Vec::new())),
            OutputFormat::Csv => self.flatten_for_csv(&batch),
        }
    }

    fn flatten_for_csv(&mut self, batch: &RecordBatch) -> Result<(RecordBatch, Vec<String>)> {
        let first = self.csv_layout.is_none();
        let layout = match self.csv_layout.take() {
            Some(layout) => layout,
            None => plan_csv_layout(batch)?,
        };
        let layout = self.csv_layout.insert(layout);

        let schema = batch.schema();
        let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        if names.len() != layout.len() || names.iter().zip(layout.iter()).any(|(n, (l, _))| n != l) {
            bail!(
                "CSV columns changed between batches: expected [{}], got [{}]",
                layout.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>().join(", "),
                names.join(", ")
            );
        }

        let mut fields = Vec::new();
        let mut columns = Vec::new();
        let mut dropped = Vec::new();
        for ((name, plan), column) in layout.iter().zip(batch.columns()) {
            let array = match plan {
                CsvColumn::Keep => Arc::clone(column),
                CsvColumn::Drop => {
                    dropped.push(name.clone());
                    continue;
                }
                CsvColumn::Unwrap => match unwrap_singletons(column)? {
                    Some(array) => array,
                    None => bail!(
                        "CSV column '{name}' holds more than one value per row in a later batch"
                    ),
                },
            };
            fields.push(Field::new(name, array.data_type().clone(), true));
            columns.push(array);
        }

        let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?;
        Ok((batch, if first { dropped } else { Vec::new() }))
    }
}

fn plan_csv_layout(batch: &RecordBatch) -> Result<Vec<(String, CsvColumn)>> {
    let schema = batch.schema();
    let mut layout = Vec::new();
    for (field, column) in schema.fields().iter().zip(batch.columns()) {
        let plan = match field.data_type() {
            DataType::List(_) | DataType::LargeList(_) => match unwrap_singletons(column)? {
                Some(_) => CsvColumn::Unwrap,
                None => CsvColumn::Drop,
            },
            DataType::FixedSizeList(_, _) | DataType::Struct(_) | DataType::Map(_, _) => {
                CsvColumn::Drop
            }
            _ => CsvColumn::Keep,
        };
        layout.push((field.name().clone(), plan));
    }
    Ok(layout)
}

/// The single value of every row of a list column, or `None` when some row
/// holds more than one.
fn unwrap_singletons(column: &ArrayRef) -> Result<Option<ArrayRef>> {
    let (offsets, values): (Vec<i64>, &ArrayRef) = match column.data_type() {
        DataType::List(_) => {
            let list = column.as_list::<i32>();
            (list.offsets().iter().map(|&o| o as i64).collect(), list.values())
        }
        DataType::LargeList(_) => {
            let list = column.as_list::<i64>();
            (list.offsets().to_vec(), list.values())
        }
        other => bail!("expected a list column, got {other}"),
    };
    let mut indices = Vec::with_capacity(column.len());
    for (row, bounds) in offsets.windows(2).enumerate() {
        match bounds[1] - bounds[0] {
            0 => indices.push(None),
            1 if column.is_valid(row) => indices.push(Some(bounds[0])),
            1 => indices.push(None),
            _ => return Ok(None),
        }
    }
    Ok(Some(take(values.as_ref(), &Int64Array::from(indices), None)?))
}

#[cfg(test)]
mod tests {
    use arrow::{
        array::{Int64Builder, ListBuilder},
        datatypes::Int64Type,
    };

    use super::*;

    fn list_column(rows: &[&[i64]]) -> ArrayRef {
        let mut builder = ListBuilder::new(Int64Builder::new());
        for row in rows {
            builder.values().append_slice(row);
            builder.append(true);
        }
        Arc::new(builder.finish())
    }

    fn batch(columns: Vec<(&str, ArrayRef)>) -> RecordBatch {
        RecordBatch::try_from_iter(columns).unwrap()
    }

    #[test]
    fn csv_unwraps_single_value_lists_and_drops_the_rest() {
        let mut shaper = BatchShaper::new(OutputFormat::Csv);
        let (flat, dropped) = shaper
            .prepare(batch(vec![
                ("id", list_column(&[&[7], &[], &[9]])),
                ("tags", list_column(&[&[1, 2], &[], &[3]])),
            ]))
            .unwrap();
        assert_eq!(dropped, ["tags"]);
        let id = flat.column(0).as_primitive::<Int64Type>();
        assert_eq!(id.len(), 3);
        assert_eq!(id.value(0), 7);
        assert!(id.is_null(1));
        assert_eq!(id.value(2), 9);
    }

    #[test]
    fn csv_layout_is_fixed_by_the_first_batch() {
        let mut shaper = BatchShaper::new(OutputFormat::Csv);
        let (first, _) = shaper
            .prepare(batch(vec![
                ("id", list_column(&[&[1], &[2]])),
                ("tags", list_column(&[&[1, 2], &[]])),
            ]))
            .unwrap();
        assert_eq!(first.num_columns(), 1);

        // A later batch where "tags" fits is still shaped like the first.
        let (second, dropped) = shaper
            .prepare(batch(vec![
                ("id", list_column(&[&[3]])),
                ("tags", list_column(&[&[4]])),
            ]))
            .unwrap();
        assert_eq!(second.schema(), first.schema());
        assert!(dropped.is_empty());

        // A later batch where "id" no longer fits is rejected.
        let err = shaper
            .prepare(batch(vec![
                ("id", list_column(&[&[1, 2]])),
                ("tags", list_column(&[&[4]])),
            ]))
            .unwrap_err();
        assert!(err.to_string().contains("'id'"));
    }

    #[test]
    fn csv_rejects_batches_with_different_columns() {
        let mut shaper = BatchShaper::new(OutputFormat::Csv);
        shaper.prepare(batch(vec![("id", list_column(&[&[1]]))])).unwrap();
        let err = shaper
            .prepare(batch(vec![("other", list_column(&[&[1]]))]))
            .unwrap_err();
        assert!(err.to_string().contains("changed between batches"));
    }

    #[test]
    fn other_formats_pass_batches_through() {
        let mut shaper = BatchShaper::new(OutputFormat::Jsonl);
        let input = batch(vec![("tags", list_column(&[&[1, 2]]))]);
        let (out, dropped) = shaper.prepare(input.clone()).unwrap();
        assert_eq!(out, input);
        assert!(dropped.is_empty());
    }
}
