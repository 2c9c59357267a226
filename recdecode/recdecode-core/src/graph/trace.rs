use std::{cell::RefCell, fmt, ptr};

use super::{Graph, NodeId, op::Op, proto::ProtoField};
use crate::{dtype::DType, error::GraphError, spec::TypeSpec, tensor::Tensor};

/// Records ops into a [`Graph`] while a function is being traced.
///
/// Decoder code never sees concrete values: it manipulates [`Symbol`]s, and
/// every method call appends one node after inferring its [`TypeSpec`].
#[derive(Debug, Default)]
pub struct Tracer {
    graph: RefCell<Graph>,
}

impl Tracer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn into_graph(self) -> Graph {
        self.graph.into_inner()
    }

    pub(crate) fn placeholder(&self, spec: TypeSpec) -> Result<Symbol<'_>, GraphError> {
        self.push(Op::Placeholder { spec }, Vec::new())
    }

    /// Embed a constant value in the graph.
    pub fn constant(&self, value: impl Into<Tensor>) -> Result<Symbol<'_>, GraphError> {
        let value = value.into();
        value.validate()?;
        self.push(Op::Const { value }, Vec::new())
    }

    /// `[0, n)` as int64 for an integral scalar `n`.
    pub fn range<'g>(&'g self, n: &Symbol<'g>) -> Result<Symbol<'g>, GraphError> {
        self.apply(Op::Range, &[n])
    }

    /// Elementwise `a` where `cond` is true, else `b`.
    pub fn select<'g>(
        &'g self,
        cond: &Symbol<'g>,
        a: &Symbol<'g>,
        b: &Symbol<'g>,
    ) -> Result<Symbol<'g>, GraphError> {
        self.apply(Op::Select, &[cond, a, b])
    }

    fn apply<'g>(&'g self, op: Op, inputs: &[&Symbol<'g>]) -> Result<Symbol<'g>, GraphError> {
        let ids = inputs
            .iter()
            .map(|s| {
                if ptr::eq(s.tracer, self) {
                    Ok(s.id)
                } else {
                    Err(GraphError::UnknownNode { node: s.id.0 })
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.push(op, ids)
    }

    fn push(&self, op: Op, inputs: Vec<NodeId>) -> Result<Symbol<'_>, GraphError> {
        let id = self.graph.borrow_mut().add_node(op, inputs)?;
        Ok(Symbol { tracer: self, id })
    }

    pub(crate) fn owns(&self, symbol: &Symbol<'_>) -> bool {
        ptr::eq(symbol.tracer, self)
    }
}

/// A symbolic tensor: a handle to one node of the graph being traced.
#[derive(Clone, Copy)]
pub struct Symbol<'g> {
    tracer: &'g Tracer,
    id: NodeId,
}

impl<'g> Symbol<'g> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The type spec inferred for this node.
    pub fn spec(&self) -> TypeSpec {
        self.tracer.graph.borrow().nodes()[self.id.0].spec.clone()
    }

    pub fn tracer(&self) -> &'g Tracer {
        self.tracer
    }

    fn unary(&self, op: Op) -> Result<Symbol<'g>, GraphError> {
        self.tracer.apply(op, &[self])
    }

    fn binary(&self, op: Op, other: &Symbol<'g>) -> Result<Symbol<'g>, GraphError> {
        self.tracer.apply(op, &[self, other])
    }

    pub fn identity(&self) -> Result<Symbol<'g>, GraphError> {
        self.unary(Op::Identity)
    }

    /// Outer dimension as an int64 scalar.
    pub fn size(&self) -> Result<Symbol<'g>, GraphError> {
        self.unary(Op::Size)
    }

    pub fn cast(&self, dtype: DType) -> Result<Symbol<'g>, GraphError> {
        self.unary(Op::Cast { dtype })
    }

    pub fn expand_dims(&self, axis: usize) -> Result<Symbol<'g>, GraphError> {
        self.unary(Op::ExpandDims { axis })
    }

    pub fn string_to_number(&self, dtype: DType) -> Result<Symbol<'g>, GraphError> {
        self.unary(Op::StringToNumber { dtype })
    }

    pub fn string_length(&self) -> Result<Symbol<'g>, GraphError> {
        self.unary(Op::StringLength)
    }

    /// Split every string; an empty `sep` splits on whitespace.
    pub fn string_split(&self, sep: impl Into<String>) -> Result<Symbol<'g>, GraphError> {
        self.unary(Op::StringSplit { sep: sep.into() })
    }

    pub fn ragged_values(&self) -> Result<Symbol<'g>, GraphError> {
        self.unary(Op::RaggedValues)
    }

    pub fn ragged_value_rowids(&self) -> Result<Symbol<'g>, GraphError> {
        self.unary(Op::RaggedValueRowIds)
    }

    pub fn ragged_row_lengths(&self) -> Result<Symbol<'g>, GraphError> {
        self.unary(Op::RaggedRowLengths)
    }

    pub fn ragged_from_tensor(&self) -> Result<Symbol<'g>, GraphError> {
        self.unary(Op::RaggedFromTensor)
    }

    pub fn ragged_to_sparse(&self) -> Result<Symbol<'g>, GraphError> {
        self.unary(Op::RaggedToSparse)
    }

    pub fn equal(&self, other: &Symbol<'g>) -> Result<Symbol<'g>, GraphError> {
        self.binary(Op::Equal, other)
    }

    pub fn add(&self, other: &Symbol<'g>) -> Result<Symbol<'g>, GraphError> {
        self.binary(Op::Add, other)
    }

    /// Rows of `self` at `indices`.
    pub fn gather(&self, indices: &Symbol<'g>) -> Result<Symbol<'g>, GraphError> {
        self.binary(Op::Gather, indices)
    }

    pub fn boolean_mask(&self, mask: &Symbol<'g>) -> Result<Symbol<'g>, GraphError> {
        self.binary(Op::BooleanMask, mask)
    }

    /// Decode `field` out of every serialized message in `self`.
    pub fn decode_proto_field(&self, field: ProtoField) -> Result<Symbol<'g>, GraphError> {
        self.unary(Op::DecodeProtoField { field })
    }
}

impl fmt::Debug for Symbol<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Symbol")
            .field("id", &self.id)
            .field("spec", &self.spec())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::TensorShape;

    #[test]
    fn symbols_from_another_tracer_are_rejected() {
        let a = Tracer::new();
        let b = Tracer::new();
        let x = a.constant(crate::tensor::DenseTensor::scalar_i64(3)).unwrap();
        let y = b.constant(crate::tensor::DenseTensor::scalar_i64(3)).unwrap();
        assert!(matches!(
            x.add(&y),
            Err(GraphError::UnknownNode { node: 0 })
        ));
    }

    #[test]
    fn ill_typed_calls_fail_at_trace_time() {
        let tracer = Tracer::new();
        let records = tracer
            .placeholder(TypeSpec::dense(DType::String, TensorShape::unknown_vector()))
            .unwrap();
        assert!(records.ragged_values().is_err());
        assert!(records.cast(DType::Int64).is_err());
        assert_eq!(tracer.into_graph().len(), 1);
    }
}
