//! The decoder interface.
//!
//! Authors implement [`GraphRecordDecoder`]; consumers program against
//! [`RecordDecoder`], which is implemented both by [`TracedDecoder`] (a live
//! decoder traced on first use) and by [`LoadedDecoder`](crate::LoadedDecoder)
//! (a decoder read back from disk).

use std::{collections::BTreeMap, sync::OnceLock};

use tracing::debug;

use crate::{
    bundle::NamedTensors,
    dtype::DType,
    error::{DecoderError, GraphError},
    function::{ConcreteFunction, Structured},
    graph::Symbol,
    saved::DECODE_FUN,
    spec::{TensorShape, TypeSpec, TypeSpecs},
    tensor::Tensor,
};

/// A decoder expressed as graph operations over a batch of serialized records.
pub trait GraphRecordDecoder {
    /// Decode `records`, a 1-D string tensor of unknown length.
    ///
    /// Only graph ops are available here. Any branching on Rust values happens
    /// once, at trace time, and is frozen into the graph.
    fn decode_record<'g>(
        &self,
        records: &Symbol<'g>,
    ) -> Result<BTreeMap<String, Symbol<'g>>, GraphError>;

    /// Name of the output mapping each output row to its source record.
    ///
    /// `None` means outputs are row-aligned with the input records.
    fn record_index_tensor_name(&self) -> Option<&str> {
        None
    }
}

/// The consumer-facing decoder surface.
pub trait RecordDecoder {
    /// The decode function, traced at most once per decoder.
    fn concrete_decode_function(&self) -> Result<&ConcreteFunction, DecoderError>;

    /// Output specs, cached with the traced function. Errs only if tracing fails.
    fn output_type_specs(&self) -> Result<&TypeSpecs, DecoderError>;

    /// Name of the output mapping each output row to its source record, if any.
    fn record_index_tensor_name(&self) -> Option<&str>;

    /// Decode a 1-D string tensor of records.
    fn decode_tensor(&self, records: &Tensor) -> Result<NamedTensors, DecoderError> {
        let function = self.concrete_decode_function()?;
        let outputs = function
            .call(std::slice::from_ref(records))?
            .into_dict()
            .ok_or_else(|| DecoderError::NotADict {
                function: function.name().to_string(),
            })?;
        Ok(NamedTensors::try_new(outputs)?)
    }

    fn decode<B: AsRef<[u8]>>(&self, records: &[B]) -> Result<NamedTensors, DecoderError>
    where
        Self: Sized,
    {
        self.decode_tensor(&Tensor::records(records))
    }
}

/// Spec of the canonical decoder input: a string vector of unknown length.
pub fn records_type_spec() -> TypeSpec {
    TypeSpec::dense(DType::String, TensorShape::unknown_vector())
}

/// Trace `decoder` against the canonical input signature.
pub fn make_concrete_decode_function(
    decoder: &dyn GraphRecordDecoder,
) -> Result<ConcreteFunction, GraphError> {
    ConcreteFunction::trace(DECODE_FUN, &[records_type_spec()], |_, args| {
        let outputs = decoder.decode_record(&args[0])?;
        for (name, symbol) in &outputs {
            if name.is_empty() {
                return Err(GraphError::EmptyOutputName);
            }
            let spec = symbol.spec();
            if spec.rank() == 0 {
                return Err(GraphError::ScalarOutput {
                    name: name.clone(),
                    spec,
                });
            }
        }
        Ok(Structured::Dict(outputs))
    })
}

/// Read dict-structured output specs off a decode function.
pub(crate) fn dict_output_specs(function: &ConcreteFunction) -> Result<TypeSpecs, DecoderError> {
    function
        .output_specs()?
        .into_dict()
        .ok_or_else(|| DecoderError::NotADict {
            function: function.name().to_string(),
        })
}

#[derive(Debug)]
struct Traced {
    function: ConcreteFunction,
    specs: TypeSpecs,
}

/// A [`GraphRecordDecoder`] traced once, on first use.
#[derive(Debug)]
pub struct TracedDecoder<D> {
    decoder: D,
    traced: OnceLock<Traced>,
}

impl<D: GraphRecordDecoder> TracedDecoder<D> {
    pub fn new(decoder: D) -> Self {
        Self {
            decoder,
            traced: OnceLock::new(),
        }
    }

    pub fn inner(&self) -> &D {
        &self.decoder
    }

    fn traced(&self) -> Result<&Traced, DecoderError> {
        if let Some(traced) = self.traced.get() {
            return Ok(traced);
        }
        // Tracing is deterministic, so a racing duplicate is simply dropped.
        let function = make_concrete_decode_function(&self.decoder)?;
        let specs = dict_output_specs(&function)?;
        debug!(
            outputs = specs.len(),
            nodes = function.graph().len(),
            "traced decoder"
        );
        Ok(self.traced.get_or_init(|| Traced { function, specs }))
    }
}

impl<D: GraphRecordDecoder> RecordDecoder for TracedDecoder<D> {
    fn concrete_decode_function(&self) -> Result<&ConcreteFunction, DecoderError> {
        self.traced().map(|t| &t.function)
    }

    fn output_type_specs(&self) -> Result<&TypeSpecs, DecoderError> {
        self.traced().map(|t| &t.specs)
    }

    fn record_index_tensor_name(&self) -> Option<&str> {
        self.decoder.record_index_tensor_name()
    }
}

impl<D: GraphRecordDecoder> From<D> for TracedDecoder<D> {
    fn from(decoder: D) -> Self {
        Self::new(decoder)
    }
}
