//! Core types for graph record decoders.
//!
//! A decoder turns a batch of serialized records into named tensors. It is
//! written once against a [`Tracer`], frozen into a serializable
//! [`ConcreteFunction`], and can be saved to and loaded from disk without the
//! Rust type that defined it.
//!
//! ```
//! use std::collections::BTreeMap;
//!
//! use recdecode_core::{
//!     DType, GraphError, GraphRecordDecoder, RecordDecoder, Symbol, TracedDecoder,
//! };
//!
//! struct Lengths;
//!
//! impl GraphRecordDecoder for Lengths {
//!     fn decode_record<'g>(
//!         &self,
//!         records: &Symbol<'g>,
//!     ) -> Result<BTreeMap<String, Symbol<'g>>, GraphError> {
//!         let len = records.string_length()?.cast(DType::Int64)?;
//!         Ok(BTreeMap::from([("len".to_string(), len)]))
//!     }
//! }
//!
//! let decoder = TracedDecoder::new(Lengths);
//! let out = decoder.decode(&["a", "bcd"]).unwrap();
//! assert_eq!(out.batch_size(), Some(2));
//! ```

pub mod bundle;
pub mod decoder;
pub mod dtype;
pub mod error;
pub mod execution;
pub mod function;
pub mod graph;
pub mod saved;
pub mod spec;
pub mod tensor;

pub use bundle::NamedTensors;
pub use decoder::{
    GraphRecordDecoder, RecordDecoder, TracedDecoder, make_concrete_decode_function,
    records_type_spec,
};
pub use dtype::DType;
pub use error::{
    ContractError, DecoderError, ExecutionError, GraphError, LoadError, SaveError, TensorError,
};
pub use execution::{
    Deferred, EvaluationStrategy, ExecutionMode, Immediate, Session, execution_mode,
    executing_eagerly, with_execution_mode,
};
pub use function::{ConcreteFunction, OutputStructure, Structured};
pub use graph::{Graph, Node, NodeId, Op, ProtoField, Symbol, Tracer};
pub use saved::{
    DECODE_FUN, FORMAT_VERSION, LoadOptions, LoadedDecoder, RECORD_INDEX_TENSOR_NAME_FUN,
    SAVED_MODULE_FILE, load_decoder, load_decoder_with_options, save_decoder,
};
pub use spec::{TensorShape, TypeSpec, TypeSpecs, format_type_specs, type_spec_from_value};
pub use tensor::{DenseTensor, RaggedTensor, SparseTensor, Tensor, TensorData, TensorKind};
