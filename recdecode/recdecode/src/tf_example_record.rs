//! Record-batch adapter for tf.Example records stored in TFRecord files.

use std::{path::PathBuf, sync::Arc};

use arrow::{
    datatypes::{Schema as ArrowSchema, SchemaRef},
    record_batch::RecordBatch,
};
use rayon::prelude::*;
use recdecode_arrow::{append_raw_record_column, raw_record_column_field};
use recdecode_example::{
    ExamplesToRecordBatchDecoder, Schema, TensorRepresentations, project_schema,
    tensor_representations_for_schema,
};
use tracing::{debug, info};

use crate::{
    batch_util::{BatchConfig, batch_elements},
    error::RecordIoError,
    file_pattern,
    tfrecord::read_tfrecord_files,
};

const LOGICAL_FORMAT: &str = "tf_example";
const DEFAULT_PHYSICAL_FORMAT: &str = "tfrecord";

/// Reads tf.Examples from TFRecord files matching a pattern and decodes them
/// into Arrow record batches.
#[derive(Debug, Clone)]
pub struct TfExampleRecord {
    file_pattern: String,
    files: Vec<PathBuf>,
    validate: bool,
    schema: Option<Schema>,
    schema_for_decoding: Option<Schema>,
    raw_record_column_name: Option<String>,
    telemetry_descriptors: Vec<String>,
    physical_format: String,
    large_types: bool,
}

/// Builder for [`TfExampleRecord`].
///
/// Defaults: validation on, no schema, no raw record column, physical format
/// `"tfrecord"`, regular (32-bit offset) Arrow types.
#[derive(Debug, Clone)]
pub struct TfExampleRecordBuilder {
    file_pattern: String,
    validate: bool,
    schema: Option<Schema>,
    schema_for_decoding: Option<Schema>,
    raw_record_column_name: Option<String>,
    telemetry_descriptors: Vec<String>,
    physical_format: Option<String>,
    large_types: bool,
}

impl TfExampleRecordBuilder {
    /// Fail at build time when the pattern matches no file (default: true).
    pub fn with_validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Decode with a different schema than the one used for tensor
    /// representations. Requires [`with_schema`](Self::with_schema).
    pub fn with_schema_for_decoding(mut self, schema: Schema) -> Self {
        self.schema_for_decoding = Some(schema);
        self
    }

    /// Attach the serialized records as an extra column of this name.
    pub fn with_raw_record_column_name(mut self, name: impl Into<String>) -> Self {
        self.raw_record_column_name = Some(name.into());
        self
    }

    pub fn with_telemetry_descriptors<I, S>(mut self, descriptors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.telemetry_descriptors = descriptors.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_physical_format(mut self, format: impl Into<String>) -> Self {
        self.physical_format = Some(format.into());
        self
    }

    /// Produce `LargeList` / `LargeBinary` columns.
    pub fn with_large_types(mut self, large: bool) -> Self {
        self.large_types = large;
        self
    }

    pub fn build(self) -> Result<TfExampleRecord, RecordIoError> {
        if self.schema_for_decoding.is_some() && self.schema.is_none() {
            return Err(RecordIoError::SchemaForDecodingWithoutSchema);
        }
        let files = file_pattern::resolve(&self.file_pattern, self.validate)?;
        if self.large_types {
            info!("producing LargeList and LargeBinary types");
        }
        debug!(pattern = %self.file_pattern, files = files.len(), "resolved tf.Example files");
        Ok(TfExampleRecord {
            file_pattern: self.file_pattern,
            files,
            validate: self.validate,
            schema: self.schema,
            schema_for_decoding: self.schema_for_decoding,
            raw_record_column_name: self.raw_record_column_name,
            telemetry_descriptors: self.telemetry_descriptors,
            physical_format: self
                .physical_format
                .unwrap_or_else(|| DEFAULT_PHYSICAL_FORMAT.to_string()),
            large_types: self.large_types,
        })
    }
}

impl TfExampleRecord {
    pub fn builder(file_pattern: impl Into<String>) -> TfExampleRecordBuilder {
        TfExampleRecordBuilder {
            file_pattern: file_pattern.into(),
            validate: true,
            schema: None,
            schema_for_decoding: None,
            raw_record_column_name: None,
            telemetry_descriptors: Vec::new(),
            physical_format: None,
            large_types: false,
        }
    }

    pub fn file_pattern(&self) -> &str {
        &self.file_pattern
    }

    /// Files the pattern resolved to when this reader was built.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }

    pub fn raw_record_column_name(&self) -> Option<&str> {
        self.raw_record_column_name.as_deref()
    }

    pub fn telemetry_descriptors(&self) -> &[String] {
        &self.telemetry_descriptors
    }

    pub fn logical_format(&self) -> &str {
        LOGICAL_FORMAT
    }

    pub fn physical_format(&self) -> &str {
        &self.physical_format
    }

    pub fn produces_large_types(&self) -> bool {
        self.large_types
    }

    pub fn supports_attaching_raw_records(&self) -> bool {
        true
    }

    fn schema_for_decoding(&self) -> Option<&Schema> {
        self.schema_for_decoding.as_ref().or(self.schema.as_ref())
    }

    /// Every serialized record, file by file in path order.
    pub fn raw_records(&self) -> Result<Vec<Vec<u8>>, RecordIoError> {
        read_tfrecord_files(&self.files)
    }

    /// Decode `records` into record batches of the configured batch size.
    ///
    /// Batches are decoded in parallel and returned in input order.
    pub fn raw_records_to_record_batches<B: AsRef<[u8]> + Sync>(
        &self,
        records: &[B],
        batch_size: Option<usize>,
    ) -> Result<Vec<RecordBatch>, RecordIoError> {
        let config = BatchConfig::from_batch_size(batch_size)?;
        let batches = batch_elements(records, &config);
        debug!(
            records = records.len(),
            batches = batches.len(),
            "decoding tf.Example batches"
        );
        batches
            .par_iter()
            .map_init(
                || {
                    DecodeBatchExamplesFn::new(
                        self.schema_for_decoding().cloned(),
                        self.raw_record_column_name.clone(),
                        self.large_types,
                    )
                },
                |decode, batch| decode.process(*batch),
            )
            .collect()
    }

    /// Read every file and decode it.
    pub fn record_batches(&self, batch_size: Option<usize>) -> Result<Vec<RecordBatch>, RecordIoError> {
        let records = self.raw_records()?;
        self.raw_records_to_record_batches(&records, batch_size)
    }

    /// Arrow schema of the batches, including the raw record column if any.
    pub fn arrow_schema(&self) -> Result<SchemaRef, RecordIoError> {
        let schema = self.schema_for_decoding().ok_or(RecordIoError::SchemaRequired {
            operation: "deriving an Arrow schema",
        })?;
        let decoded = ExamplesToRecordBatchDecoder::new(Some(schema), self.large_types)?.arrow_schema()?;
        let Some(name) = &self.raw_record_column_name else {
            return Ok(decoded);
        };
        if decoded.column_with_name(name).is_some() {
            return Err(RecordIoError::RawRecordColumnClash(name.clone()));
        }
        let mut fields: Vec<_> = decoded.fields().iter().cloned().collect();
        fields.push(Arc::new(raw_record_column_field(name, self.large_types)));
        Ok(Arc::new(ArrowSchema::new(fields)))
    }

    /// Tensor representations of the schema: the explicit default group when
    /// present, otherwise inferred from the features.
    pub fn tensor_representations(&self) -> Result<TensorRepresentations, RecordIoError> {
        let schema = self.schema.as_ref().ok_or(RecordIoError::SchemaRequired {
            operation: "tensor representations",
        })?;
        Ok(tensor_representations_for_schema(schema))
    }

    /// A reader over the same files whose schema only covers `tensor_names`.
    pub fn project<S: AsRef<str>>(&self, tensor_names: &[S]) -> Result<Self, RecordIoError> {
        let schema = self.schema.as_ref().ok_or(RecordIoError::SchemaRequired {
            operation: "projection",
        })?;
        let projected = project_schema(schema, tensor_names)?;
        Ok(Self {
            schema: Some(projected),
            schema_for_decoding: None,
            ..self.clone()
        })
    }

    pub fn validate(&self) -> bool {
        self.validate
    }
}

/// Stateful decode step. The underlying decoder is built on first use and
/// reused for every later batch passed to the same instance; the parallel
/// reader creates one instance per rayon work split.
pub struct DecodeBatchExamplesFn {
    schema: Option<Schema>,
    raw_record_column_name: Option<String>,
    large_types: bool,
    decoder: Option<ExamplesToRecordBatchDecoder>,
}

impl DecodeBatchExamplesFn {
    pub fn new(
        schema: Option<Schema>,
        raw_record_column_name: Option<String>,
        large_types: bool,
    ) -> Self {
        Self {
            schema,
            raw_record_column_name,
            large_types,
            decoder: None,
        }
    }

    pub fn setup(&mut self) -> Result<&ExamplesToRecordBatchDecoder, RecordIoError> {
        let decoder = match self.decoder.take() {
            Some(decoder) => decoder,
            None => ExamplesToRecordBatchDecoder::new(self.schema.as_ref(), self.large_types)?,
        };
        Ok(self.decoder.insert(decoder))
    }

    pub fn process<B: AsRef<[u8]>>(&mut self, records: &[B]) -> Result<RecordBatch, RecordIoError> {
        let large_types = self.large_types;
        let decoded = self.setup()?.decode_batch(records)?;
        match &self.raw_record_column_name {
            None => Ok(decoded),
            Some(name) => Ok(append_raw_record_column(&decoded, name, records, large_types)?),
        }
    }
}
