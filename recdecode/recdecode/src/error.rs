//! Error types for record I/O and the record-batch adapters.

use std::path::PathBuf;

use recdecode_arrow::ArrowConvertError;
use recdecode_core::{ContractError, DecoderError};
#[cfg(feature = "example")]
use recdecode_example::ExampleCodecError;

/// Errors produced while reading records or turning them into record batches.
#[derive(Debug, thiserror::Error)]
pub enum RecordIoError {
    /// I/O error while opening or memory-mapping a file.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file pattern matched nothing and validation was requested.
    #[error("no files match pattern '{pattern}'")]
    NoMatchingFiles { pattern: String },

    /// Wildcards are only supported in the last path component.
    #[error("invalid file pattern '{pattern}': {detail}")]
    InvalidPattern { pattern: String, detail: String },

    /// A TFRecord file ended in the middle of a record.
    #[error("truncated record at offset {offset} in {path}")]
    Truncated { path: PathBuf, offset: usize },

    #[error("corrupted {part} checksum at offset {offset} in {path}")]
    Checksum {
        path: PathBuf,
        offset: usize,
        part: &'static str,
    },

    #[error("batch size must be at least 1")]
    InvalidBatchSize,

    #[error("schema_for_decoding requires a schema")]
    SchemaForDecodingWithoutSchema,

    #[error("no schema provided; {operation} requires one")]
    SchemaRequired { operation: &'static str },

    /// Projection asked for outputs the decoder does not produce.
    #[error("unable to project {unknown:?}; available tensors: {available:?}")]
    UnknownTensors {
        unknown: Vec<String>,
        available: Vec<String>,
    },

    #[error("raw record column '{0}' clashes with a decoded column")]
    RawRecordColumnClash(String),

    #[cfg(feature = "example")]
    #[error(transparent)]
    Example(#[from] ExampleCodecError),

    #[error(transparent)]
    Decoder(#[from] DecoderError),

    #[error(transparent)]
    Contract(#[from] ContractError),

    #[error(transparent)]
    Arrow(#[from] ArrowConvertError),
}
