use arrow::error::ArrowError;
use recdecode_core::TypeSpec;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArrowConvertError {
    #[error("cannot represent {spec} as an Arrow column: {reason}")]
    UnsupportedSpec { spec: TypeSpec, reason: String },
    #[error("tensor '{name}' not found among decoded outputs: {available:?}")]
    MissingTensor {
        name: String,
        available: Vec<String>,
    },
    #[error("tensor '{name}' does not match {spec}: got {got}")]
    SpecMismatch {
        name: String,
        spec: TypeSpec,
        got: TypeSpec,
    },
    #[error("column '{0}' already exists in the record batch")]
    DuplicateColumn(String),
    #[error("column '{name}' has {got} rows, expected {expected}")]
    RowCountMismatch {
        name: String,
        expected: usize,
        got: usize,
    },
    #[error("list offsets exceed i32::MAX; use large types")]
    OffsetOverflow,
    #[error(transparent)]
    Arrow(#[from] ArrowError),
}
