use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use arrow::{datatypes::SchemaRef, record_batch::RecordBatch};
use clap::Args;
use recdecode::{
    GraphDecoderRecord, TfExampleRecord, core::load_decoder, example::Schema, read_tfrecords,
};

/// Where records come from and how they are decoded.
#[derive(Args)]
pub struct SourceArgs {
    /// File pattern; `*` and `?` are allowed in the file name
    pattern: String,

    /// Schema JSON for tf.Example records
    #[arg(short, long, conflicts_with = "decoder")]
    schema: Option<PathBuf>,

    /// Saved decoder directory; records are decoded with it instead of as tf.Example
    #[arg(short, long)]
    decoder: Option<PathBuf>,

    /// Comma-separated tensor names to keep
    #[arg(long, value_delimiter = ',')]
    tensors: Vec<String>,

    /// Attach the serialized records as a column with this name
    #[arg(long)]
    raw_record_column: Option<String>,

    /// Use LargeList/LargeBinary Arrow types
    #[arg(long)]
    large_types: bool,
}

pub enum Source {
    Example(TfExampleRecord),
    Graph(GraphDecoderRecord),
}

impl SourceArgs {
    pub fn build(&self) -> Result<Source> {
        let source = match &self.decoder {
            Some(dir) => Source::Graph(self.graph_source(dir)?),
            None => Source::Example(self.example_source()?),
        };
        if self.tensors.is_empty() {
            return Ok(source);
        }
        Ok(match source {
            Source::Example(s) => Source::Example(s.project(self.tensors.as_slice())?),
            Source::Graph(s) => Source::Graph(s.project(self.tensors.as_slice())?),
        })
    }

    fn example_source(&self) -> Result<TfExampleRecord> {
        let mut builder =
            TfExampleRecord::builder(&self.pattern).with_large_types(self.large_types);
        if let Some(path) = &self.schema {
            builder = builder.with_schema(Schema::from_json_file(path)?);
        }
        if let Some(name) = &self.raw_record_column {
            builder = builder.with_raw_record_column_name(name);
        }
        Ok(builder.build()?)
    }

    fn graph_source(&self, dir: &Path) -> Result<GraphDecoderRecord> {
        let decoder = load_decoder(dir)
            .with_context(|| format!("failed to load decoder from {}", dir.display()))?;
        let mut builder =
            GraphDecoderRecord::builder(&self.pattern, decoder).with_large_types(self.large_types);
        if let Some(name) = &self.raw_record_column {
            builder = builder.with_raw_record_column_name(name);
        }
        Ok(builder.build()?)
    }
}

impl Source {
    pub fn files(&self) -> &[PathBuf] {
        match self {
            Source::Example(s) => s.files(),
            Source::Graph(s) => s.files(),
        }
    }

    pub fn arrow_schema(&self) -> Result<SchemaRef> {
        Ok(match self {
            Source::Example(s) => s.arrow_schema()?,
            Source::Graph(s) => s.arrow_schema()?,
        })
    }

    /// Decode every record of one file.
    pub fn decode_file(&self, path: &Path, batch_size: Option<usize>) -> Result<Vec<RecordBatch>> {
        let records = read_tfrecords(path)?;
        let batches = match self {
            Source::Example(s) => s.raw_records_to_record_batches(&records, batch_size)?,
            Source::Graph(s) => s.raw_records_to_record_batches(&records, batch_size)?,
        };
        Ok(batches)
    }
}
