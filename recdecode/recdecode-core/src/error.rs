//! Error types for tensors, graphs and decoders.

use std::path::PathBuf;

use crate::spec::TypeSpec;

/// A tensor value violates its own structural invariants.
#[derive(Debug, thiserror::Error)]
pub enum TensorError {
    #[error("shape {shape:?} does not match {len} elements")]
    ShapeMismatch { shape: Vec<usize>, len: usize },

    #[error("invalid ragged row_splits: {0}")]
    InvalidRowSplits(String),

    #[error("invalid sparse tensor: {0}")]
    InvalidSparse(String),
}

/// Trace-time error: the decode program is ill-typed or malformed.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// An op was applied to operands it does not accept.
    #[error("{op}: {detail}")]
    InvalidOperand { op: &'static str, detail: String },

    /// A symbol from another tracer (or a stale node id) was used.
    #[error("node {node} does not belong to this graph")]
    UnknownNode { node: usize },

    /// An output name was empty.
    #[error("decoder output names must not be empty")]
    EmptyOutputName,

    #[error("decoder output '{name}' is traced as {spec}; outputs must be at least rank 1")]
    ScalarOutput { name: String, spec: TypeSpec },

    /// The protobuf descriptor attached to `DecodeProtoField` is unusable.
    #[error("invalid descriptor for message '{message_name}': {detail}")]
    Descriptor {
        message_name: String,
        detail: String,
    },

    #[error(transparent)]
    Tensor(#[from] TensorError),
}

/// Runtime error raised while evaluating a traced function.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("function '{function}' expects {expected} argument(s), got {got}")]
    ArgumentCount {
        function: String,
        expected: usize,
        got: usize,
    },

    #[error("argument {index} of '{function}' does not match {expected}: got {got}")]
    ArgumentMismatch {
        function: String,
        index: usize,
        expected: TypeSpec,
        got: String,
    },

    /// A kernel rejected its concrete inputs (e.g. a malformed number).
    #[error("{op} failed: {detail}")]
    Kernel { op: &'static str, detail: String },

    /// Record bytes could not be parsed by the protobuf codec.
    #[error("failed to decode '{message_name}' record: {source}")]
    ProtoDecode {
        message_name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A kernel produced a value that contradicts its traced type spec.
    #[error("node {node} produced {got}, traced as {expected}")]
    SpecViolation {
        node: usize,
        expected: TypeSpec,
        got: String,
    },

    /// The function refers to nodes its graph does not hold.
    #[error("malformed function: {0}")]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Tensor(#[from] TensorError),
}

/// The decoded output violates the tensor output contract.
#[derive(Debug, thiserror::Error)]
pub enum ContractError {
    #[error("output '{name}' is a scalar; decoded outputs must be at least rank 1")]
    ScalarOutput { name: String },

    #[error(
        "output '{name}' has outer dimension {got}, but '{reference}' has {expected}; outputs must be batch-aligned"
    )]
    BatchMisaligned {
        name: String,
        reference: String,
        expected: usize,
        got: usize,
    },

    #[error(
        "outputs have {rows} rows but there are {records} input records and no record index tensor was declared"
    )]
    NotRecordAligned { rows: usize, records: usize },

    #[error("record index tensor '{name}' not among outputs: {available:?}")]
    RecordIndexMissing {
        name: String,
        available: Vec<String>,
    },

    #[error("invalid record index tensor '{name}': {detail}")]
    RecordIndexInvalid { name: String, detail: String },
}

/// Errors surfaced through [`RecordDecoder`](crate::RecordDecoder).
#[derive(Debug, thiserror::Error)]
pub enum DecoderError {
    #[error("failed to trace decoder: {0}")]
    Trace(#[from] GraphError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Contract(#[from] ContractError),

    /// The decode function does not return a name -> tensor mapping.
    #[error("function '{function}' does not return a dict of tensors")]
    NotADict { function: String },
}

/// Errors raised by [`save_decoder`](crate::save_decoder).
#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("invalid decoder: record_index_tensor_name must not be an empty string")]
    EmptyRecordIndexName,

    #[error("invalid decoder: record_index_tensor_name: {name} not in output tensors: {available:?}")]
    RecordIndexNotInOutputs {
        name: String,
        available: Vec<String>,
    },

    #[error(
        "invalid decoder: record index tensor '{name}' must be a 2-D integral ragged or sparse tensor, got {spec}"
    )]
    RecordIndexSpec { name: String, spec: TypeSpec },

    #[error(transparent)]
    Decoder(#[from] DecoderError),

    #[error("failed to write saved decoder to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize saved decoder: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors raised by [`load_decoder`](crate::load_decoder).
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read saved decoder from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse saved module {path}: {source}")]
    Deserialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unsupported saved module format version {found} (supported: {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("the saved module at {path} is not a GraphRecordDecoder (missing '{slot}')")]
    NotADecoder { path: PathBuf, slot: &'static str },

    #[error("saved function '{function}' is malformed: {source}")]
    InvalidFunction {
        function: String,
        #[source]
        source: GraphError,
    },

    #[error(transparent)]
    Decoder(#[from] DecoderError),

    #[error("failed to evaluate the record index tensor name: {0}")]
    RecordIndexName(String),
}
