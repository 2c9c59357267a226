//! Record fixtures and sample decoders shared by the integration tests.

#![allow(dead_code)]

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use prost::Message;
use recdecode::{
    example::{
        FeatureType, Schema, SchemaFeature,
        proto::{Example, Feature},
    },
    write_tfrecords,
};
use recdecode_core::{DType, GraphError, GraphRecordDecoder, Symbol};

pub fn example(id: i64, tags: &[&str]) -> Vec<u8> {
    Example::from_features([
        ("id", Feature::int64s([id])),
        ("tags", Feature::bytes(tags)),
    ])
    .encode_to_vec()
}

pub fn example_schema() -> Schema {
    Schema::new(vec![
        SchemaFeature::new("id", FeatureType::Int).with_shape([1]),
        SchemaFeature::new("tags", FeatureType::Bytes),
    ])
}

/// Write `records` to `dir/name` and return the path.
pub fn write_file<B: AsRef<[u8]>>(dir: &Path, name: &str, records: &[B]) -> PathBuf {
    let path = dir.join(name);
    write_tfrecords(&path, records).unwrap();
    path
}

pub fn pattern(dir: &Path, file_pattern: &str) -> String {
    dir.join(file_pattern).to_string_lossy().into_owned()
}

/// `{"len": len(record)}`, row-aligned with the input.
pub struct LengthDecoder;

impl GraphRecordDecoder for LengthDecoder {
    fn decode_record<'g>(
        &self,
        records: &Symbol<'g>,
    ) -> Result<BTreeMap<String, Symbol<'g>>, GraphError> {
        let len = records.string_length()?.cast(DType::Int64)?;
        Ok(BTreeMap::from([("len".to_string(), len)]))
    }
}

/// One output row per whitespace-separated number; `idx` maps rows back to
/// their record when `record_index` is set.
pub struct ExplodeDecoder {
    pub record_index: Option<&'static str>,
}

impl GraphRecordDecoder for ExplodeDecoder {
    fn decode_record<'g>(
        &self,
        records: &Symbol<'g>,
    ) -> Result<BTreeMap<String, Symbol<'g>>, GraphError> {
        let pieces = records.string_split("")?;
        let value = pieces.ragged_values()?.string_to_number(DType::Int64)?;
        let idx = pieces
            .ragged_value_rowids()?
            .expand_dims(1)?
            .ragged_from_tensor()?;
        Ok(BTreeMap::from([
            ("value".to_string(), value),
            ("idx".to_string(), idx),
        ]))
    }

    fn record_index_tensor_name(&self) -> Option<&str> {
        self.record_index
    }
}

/// [`ExplodeDecoder`] whose `idx` is a `[rows, 1]` sparse tensor.
pub struct SparseExplodeDecoder;

impl GraphRecordDecoder for SparseExplodeDecoder {
    fn decode_record<'g>(
        &self,
        records: &Symbol<'g>,
    ) -> Result<BTreeMap<String, Symbol<'g>>, GraphError> {
        let mut outputs = ExplodeDecoder {
            record_index: Some("idx"),
        }
        .decode_record(records)?;
        if let Some(idx) = outputs.remove("idx") {
            outputs.insert("idx".to_string(), idx.ragged_to_sparse()?);
        }
        Ok(outputs)
    }

    fn record_index_tensor_name(&self) -> Option<&str> {
        Some("idx")
    }
}
