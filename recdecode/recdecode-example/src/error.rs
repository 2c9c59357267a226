//! Error types for the tf.Example codec and schema helpers.

use std::path::PathBuf;

use arrow::error::ArrowError;

use crate::schema::FeatureType;

#[derive(Debug, thiserror::Error)]
pub enum ExampleCodecError {
    /// Record `index` of the batch is not a valid serialized tf.Example.
    #[error("failed to decode tf.Example at index {index}: {source}")]
    Decode {
        index: usize,
        #[source]
        source: prost::DecodeError,
    },

    #[error("schema not provided; unable to derive an Arrow schema")]
    SchemaRequired,

    #[error("feature '{feature}' should be {expected}, but got {got} in example {index}")]
    FeatureTypeMismatch {
        feature: String,
        expected: FeatureType,
        got: FeatureType,
        index: usize,
    },

    #[error("duplicate feature '{0}' in schema")]
    DuplicateFeature(String),

    #[error("schema features must have a non-empty name")]
    EmptyFeatureName,

    /// Projection asked for tensors the schema does not describe.
    #[error(
        "unable to project {unknown:?} because they were not in the original tensor representations: {available:?}"
    )]
    UnknownTensors {
        unknown: Vec<String>,
        available: Vec<String>,
    },

    #[error("failed to read schema file {path}: {source}")]
    SchemaFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid schema JSON{}: {source}", .path.as_ref().map(|p| format!(" in {}", p.display())).unwrap_or_default())]
    SchemaJson {
        path: Option<PathBuf>,
        #[source]
        source: serde_json::Error,
    },

    /// A column outgrew 32-bit list offsets; use large types.
    #[error("column '{column}' has more than i32::MAX values; enable large types")]
    OffsetOverflow { column: String },

    #[error(transparent)]
    Arrow(#[from] ArrowError),
}
