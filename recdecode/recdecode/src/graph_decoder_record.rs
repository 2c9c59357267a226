//! Record-batch adapter driven by a graph decoder, typically one loaded from a
//! saved artifact.

use std::{collections::BTreeSet, fmt, path::PathBuf, sync::Arc};

use arrow::{
    datatypes::{Schema as ArrowSchema, SchemaRef},
    record_batch::RecordBatch,
};
use rayon::prelude::*;
use recdecode_arrow::{
    append_raw_record_column, named_tensors_to_record_batch, raw_record_column_field,
    type_specs_to_arrow_schema,
};
use recdecode_core::{LoadedDecoder, RecordDecoder, TypeSpecs};
use tracing::{debug, info};

use crate::{
    batch_util::{BatchConfig, batch_elements},
    error::RecordIoError,
    file_pattern,
    tfrecord::read_tfrecord_files,
};

/// Decodes TFRecord files with a [`RecordDecoder`] into Arrow record batches.
///
/// Every decoder output becomes one column. When the decoder declares a record
/// index tensor, the raw record column follows it: row `i` holds the bytes of
/// the record that produced output row `i`.
pub struct GraphDecoderRecord<D = LoadedDecoder> {
    file_pattern: String,
    files: Vec<PathBuf>,
    decoder: Arc<D>,
    output_specs: TypeSpecs,
    raw_record_column_name: Option<String>,
    large_types: bool,
}

impl<D> Clone for GraphDecoderRecord<D> {
    fn clone(&self) -> Self {
        Self {
            file_pattern: self.file_pattern.clone(),
            files: self.files.clone(),
            decoder: Arc::clone(&self.decoder),
            output_specs: self.output_specs.clone(),
            raw_record_column_name: self.raw_record_column_name.clone(),
            large_types: self.large_types,
        }
    }
}

impl<D> fmt::Debug for GraphDecoderRecord<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphDecoderRecord")
            .field("file_pattern", &self.file_pattern)
            .field("files", &self.files)
            .field("outputs", &self.output_specs.keys().collect::<Vec<_>>())
            .field("raw_record_column_name", &self.raw_record_column_name)
            .field("large_types", &self.large_types)
            .finish_non_exhaustive()
    }
}

/// Builder for [`GraphDecoderRecord`].
pub struct GraphDecoderRecordBuilder<D> {
    file_pattern: String,
    decoder: D,
    validate: bool,
    raw_record_column_name: Option<String>,
    large_types: bool,
}

impl<D: RecordDecoder> GraphDecoderRecordBuilder<D> {
    pub fn with_validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    pub fn with_raw_record_column_name(mut self, name: impl Into<String>) -> Self {
        self.raw_record_column_name = Some(name.into());
        self
    }

    pub fn with_large_types(mut self, large: bool) -> Self {
        self.large_types = large;
        self
    }

    pub fn build(self) -> Result<GraphDecoderRecord<D>, RecordIoError> {
        let output_specs = self.decoder.output_type_specs()?.clone();
        if let Some(name) = &self.raw_record_column_name
            && output_specs.contains_key(name)
        {
            return Err(RecordIoError::RawRecordColumnClash(name.clone()));
        }
        // Fails early on outputs Arrow cannot represent.
        type_specs_to_arrow_schema(&output_specs, self.large_types)?;
        let files = file_pattern::resolve(&self.file_pattern, self.validate)?;
        info!(
            pattern = %self.file_pattern,
            files = files.len(),
            outputs = output_specs.len(),
            record_index = self.decoder.record_index_tensor_name(),
            "graph decoder record source ready"
        );
        Ok(GraphDecoderRecord {
            file_pattern: self.file_pattern,
            files,
            decoder: Arc::new(self.decoder),
            output_specs,
            raw_record_column_name: self.raw_record_column_name,
            large_types: self.large_types,
        })
    }
}

impl<D: RecordDecoder + Send + Sync> GraphDecoderRecord<D> {
    pub fn builder(file_pattern: impl Into<String>, decoder: D) -> GraphDecoderRecordBuilder<D> {
        GraphDecoderRecordBuilder {
            file_pattern: file_pattern.into(),
            decoder,
            validate: true,
            raw_record_column_name: None,
            large_types: false,
        }
    }

    pub fn file_pattern(&self) -> &str {
        &self.file_pattern
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    /// Specs of the outputs this source emits, after projection.
    pub fn output_type_specs(&self) -> &TypeSpecs {
        &self.output_specs
    }

    pub fn raw_record_column_name(&self) -> Option<&str> {
        self.raw_record_column_name.as_deref()
    }

    pub fn supports_attaching_raw_records(&self) -> bool {
        true
    }

    pub fn arrow_schema(&self) -> Result<SchemaRef, RecordIoError> {
        let decoded = type_specs_to_arrow_schema(&self.output_specs, self.large_types)?;
        let Some(name) = &self.raw_record_column_name else {
            return Ok(Arc::new(decoded));
        };
        let mut fields: Vec<_> = decoded.fields().iter().cloned().collect();
        fields.push(Arc::new(raw_record_column_field(name, self.large_types)));
        Ok(Arc::new(ArrowSchema::new(fields)))
    }

    /// Keep only the named outputs.
    pub fn project<S: AsRef<str>>(&self, tensor_names: &[S]) -> Result<Self, RecordIoError> {
        let requested: BTreeSet<&str> = tensor_names.iter().map(|s| s.as_ref()).collect();
        let unknown: Vec<String> = requested
            .iter()
            .copied()
            .filter(|name| !self.output_specs.contains_key(*name))
            .map(|name| name.to_string())
            .collect();
        if !unknown.is_empty() {
            return Err(RecordIoError::UnknownTensors {
                unknown,
                available: self.output_specs.keys().cloned().collect(),
            });
        }
        let mut projected = self.clone();
        projected
            .output_specs
            .retain(|name, _| requested.contains(name.as_str()));
        Ok(projected)
    }

    pub fn raw_records(&self) -> Result<Vec<Vec<u8>>, RecordIoError> {
        read_tfrecord_files(&self.files)
    }

    /// Decode `records` batch by batch, in parallel, keeping input order.
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
            "decoding graph decoder batches"
        );
        batches
            .par_iter()
            .map(|batch| self.decode_batch(*batch))
            .collect()
    }

    pub fn record_batches(&self, batch_size: Option<usize>) -> Result<Vec<RecordBatch>, RecordIoError> {
        let records = self.raw_records()?;
        self.raw_records_to_record_batches(&records, batch_size)
    }

    fn decode_batch<B: AsRef<[u8]>>(&self, records: &[B]) -> Result<RecordBatch, RecordIoError> {
        let tensors = self.decoder.decode(records)?;
        let record_index = match self.decoder.record_index_tensor_name() {
            Some(name) => Some(tensors.record_index(name, records.len())?),
            None => {
                tensors.check_aligned(records.len())?;
                None
            }
        };
        let decoded = named_tensors_to_record_batch(&tensors, &self.output_specs, self.large_types)?;
        let Some(name) = &self.raw_record_column_name else {
            return Ok(decoded);
        };
        let batch = match record_index {
            Some(index) => {
                let raw: Vec<&[u8]> = index.iter().map(|&i| records[i].as_ref()).collect();
                append_raw_record_column(&decoded, name, &raw, self.large_types)?
            }
            None => append_raw_record_column(&decoded, name, records, self.large_types)?,
        };
        Ok(batch)
    }
}
