//! Batch decoding of serialized tf.Examples into Arrow `RecordBatch`es.

use std::sync::Arc;

use arrow::{
    array::{
        Array, ArrayRef, BinaryArray, Float32Array, Int64Array, LargeBinaryArray, LargeListArray,
        ListArray, NullArray,
    },
    buffer::{NullBuffer, OffsetBuffer, ScalarBuffer},
    datatypes::{DataType, Field, Schema as ArrowSchema, SchemaRef},
    record_batch::{RecordBatch, RecordBatchOptions},
};
use prost::Message;
use recdecode_arrow::dtype_to_arrow;
use tracing::trace;

use crate::{
    error::ExampleCodecError,
    proto::{Example, Feature, feature::Kind},
    schema::{FeatureType, Schema},
};

/// Decodes batches of serialized tf.Examples.
///
/// With a schema every batch has the same columns: one per schema feature, in
/// schema order, typed `List<T>` (or `LargeList<T>`). Without one, columns are
/// inferred from each batch and sorted by name; a feature whose kind is never
/// set in the batch becomes a `Null` column.
#[derive(Debug, Clone)]
pub struct ExamplesToRecordBatchDecoder {
    features: Option<Vec<(String, FeatureType)>>,
    arrow_schema: Option<SchemaRef>,
    large: bool,
}

impl ExamplesToRecordBatchDecoder {
    pub fn new(schema: Option<&Schema>, large: bool) -> Result<Self, ExampleCodecError> {
        let Some(schema) = schema else {
            return Ok(Self {
                features: None,
                arrow_schema: None,
                large,
            });
        };
        schema.validate()?;
        let features: Vec<_> = schema
            .feature
            .iter()
            .map(|f| (f.name.clone(), f.feature_type))
            .collect();
        let fields: Vec<Field> = features
            .iter()
            .map(|(name, ty)| feature_field(name, Some(*ty), large))
            .collect();
        Ok(Self {
            features: Some(features),
            arrow_schema: Some(Arc::new(ArrowSchema::new(fields))),
            large,
        })
    }

    pub fn produces_large_types(&self) -> bool {
        self.large
    }

    /// The Arrow schema of every batch this decoder produces.
    pub fn arrow_schema(&self) -> Result<SchemaRef, ExampleCodecError> {
        self.arrow_schema
            .clone()
            .ok_or(ExampleCodecError::SchemaRequired)
    }

    pub fn decode_batch<B: AsRef<[u8]>>(
        &self,
        records: &[B],
    ) -> Result<RecordBatch, ExampleCodecError> {
        let examples = records
            .iter()
            .enumerate()
            .map(|(index, record)| {
                Example::decode(record.as_ref())
                    .map_err(|source| ExampleCodecError::Decode { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;
        trace!(records = examples.len(), "decoding tf.Example batch");

        let (schema, columns) = match (&self.features, &self.arrow_schema) {
            (Some(features), Some(schema)) => {
                let columns = features
                    .iter()
                    .map(|(name, ty)| self.build_column(name, *ty, &examples))
                    .collect::<Result<Vec<_>, _>>()?;
                (schema.clone(), columns)
            }
            _ => self.decode_inferred(&examples)?,
        };
        let options = RecordBatchOptions::new().with_row_count(Some(examples.len()));
        Ok(RecordBatch::try_new_with_options(schema, columns, &options)?)
    }

    fn decode_inferred(
        &self,
        examples: &[Example],
    ) -> Result<(SchemaRef, Vec<ArrayRef>), ExampleCodecError> {
        let features = infer_feature_types(examples);
        let mut fields = Vec::with_capacity(features.len());
        let mut columns = Vec::with_capacity(features.len());
        for (name, ty) in features {
            fields.push(feature_field(&name, ty, self.large));
            columns.push(match ty {
                Some(ty) => self.build_column(&name, ty, examples)?,
                None => Arc::new(NullArray::new(examples.len())) as ArrayRef,
            });
        }
        Ok((Arc::new(ArrowSchema::new(fields)), columns))
    }

    fn build_column(
        &self,
        name: &str,
        ty: FeatureType,
        examples: &[Example],
    ) -> Result<ArrayRef, ExampleCodecError> {
        let mut column = ColumnBuilder::new(ty, examples.len());
        for (index, example) in examples.iter().enumerate() {
            match example.feature(name) {
                Some(feature) => column.append(name, feature, index)?,
                None => column.append_null(),
            }
        }
        column.finish(name, self.large)
    }
}

fn feature_field(name: &str, ty: Option<FeatureType>, large: bool) -> Field {
    let Some(ty) = ty else {
        return Field::new(name, DataType::Null, true);
    };
    let item = Arc::new(Field::new("item", dtype_to_arrow(ty.dtype(), large), true));
    let data_type = if large {
        DataType::LargeList(item)
    } else {
        DataType::List(item)
    };
    Field::new(name, data_type, true)
}

/// Feature names seen in the batch, sorted, with the first kind set for each.
fn infer_feature_types(examples: &[Example]) -> Vec<(String, Option<FeatureType>)> {
    let mut seen = std::collections::BTreeMap::<String, Option<FeatureType>>::new();
    for (name, feature) in examples.iter().flat_map(Example::iter) {
        let slot = seen.entry(name.clone()).or_default();
        if slot.is_none() {
            *slot = feature.feature_type();
        }
    }
    seen.into_iter().collect()
}

enum ColumnValues {
    Int(Vec<i64>),
    Float(Vec<f32>),
    Bytes(Vec<Vec<u8>>),
}

struct ColumnBuilder {
    ty: FeatureType,
    values: ColumnValues,
    offsets: Vec<i64>,
    validity: Vec<bool>,
}

impl ColumnBuilder {
    fn new(ty: FeatureType, rows: usize) -> Self {
        let values = match ty {
            FeatureType::Int => ColumnValues::Int(Vec::new()),
            FeatureType::Float => ColumnValues::Float(Vec::new()),
            FeatureType::Bytes => ColumnValues::Bytes(Vec::new()),
        };
        let mut offsets = Vec::with_capacity(rows + 1);
        offsets.push(0);
        Self {
            ty,
            values,
            offsets,
            validity: Vec::with_capacity(rows),
        }
    }

    fn len(&self) -> usize {
        match &self.values {
            ColumnValues::Int(v) => v.len(),
            ColumnValues::Float(v) => v.len(),
            ColumnValues::Bytes(v) => v.len(),
        }
    }

    fn append(&mut self, name: &str, feature: &Feature, index: usize) -> Result<(), ExampleCodecError> {
        let Some(kind) = &feature.kind else {
            // A feature with no kind set carries no value.
            self.append_null();
            return Ok(());
        };
        match (&mut self.values, kind) {
            (ColumnValues::Int(out), Kind::Int64List(list)) => out.extend_from_slice(&list.value),
            (ColumnValues::Float(out), Kind::FloatList(list)) => out.extend_from_slice(&list.value),
            (ColumnValues::Bytes(out), Kind::BytesList(list)) => {
                out.extend(list.value.iter().cloned())
            }
            _ => {
                return Err(ExampleCodecError::FeatureTypeMismatch {
                    feature: name.to_string(),
                    expected: self.ty,
                    got: feature.feature_type().unwrap_or(self.ty),
                    index,
                });
            }
        }
        self.offsets.push(self.len() as i64);
        self.validity.push(true);
        Ok(())
    }

    fn append_null(&mut self) {
        self.offsets.push(self.len() as i64);
        self.validity.push(false);
    }

    fn finish(self, name: &str, large: bool) -> Result<ArrayRef, ExampleCodecError> {
        let values: ArrayRef = match self.values {
            ColumnValues::Int(v) => Arc::new(Int64Array::from(v)),
            ColumnValues::Float(v) => Arc::new(Float32Array::from(v)),
            ColumnValues::Bytes(v) if large => Arc::new(LargeBinaryArray::from_iter_values(v)),
            ColumnValues::Bytes(v) => Arc::new(BinaryArray::from_iter_values(v)),
        };
        let item = Arc::new(Field::new("item", values.data_type().clone(), true));
        let nulls = Some(NullBuffer::from(self.validity));
        if large {
            let offsets = OffsetBuffer::new(ScalarBuffer::from(self.offsets));
            return Ok(Arc::new(LargeListArray::try_new(item, offsets, values, nulls)?));
        }
        let offsets = self
            .offsets
            .into_iter()
            .map(i32::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| ExampleCodecError::OffsetOverflow {
                column: name.to_string(),
            })?;
        let offsets = OffsetBuffer::new(ScalarBuffer::from(offsets));
        Ok(Arc::new(ListArray::try_new(item, offsets, values, nulls)?))
    }
}
