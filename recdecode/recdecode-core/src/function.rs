//! Traced, input-signature-fixed functions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    error::{ExecutionError, GraphError},
    execution::{Deferred, EvaluationStrategy, Immediate, executing_eagerly},
    graph::{Graph, NodeId, Op, Symbol, Tracer},
    spec::{TypeSpec, type_spec_from_value},
    tensor::Tensor,
};

/// Output structure of a function: a single tensor or a name -> tensor dict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "structure", content = "outputs", rename_all = "snake_case")]
pub enum Structured<T> {
    Tensor(T),
    Dict(BTreeMap<String, T>),
}

/// Output structure of a [`ConcreteFunction`], as node ids.
pub type OutputStructure = Structured<NodeId>;

impl<T> Structured<T> {
    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> Structured<U> {
        match self {
            Structured::Tensor(t) => Structured::Tensor(f(t)),
            Structured::Dict(d) => Structured::Dict(d.into_iter().map(|(k, v)| (k, f(v))).collect()),
        }
    }

    pub fn try_map<U, E>(self, mut f: impl FnMut(T) -> Result<U, E>) -> Result<Structured<U>, E> {
        Ok(match self {
            Structured::Tensor(t) => Structured::Tensor(f(t)?),
            Structured::Dict(d) => Structured::Dict(
                d.into_iter()
                    .map(|(k, v)| Ok((k, f(v)?)))
                    .collect::<Result<_, E>>()?,
            ),
        })
    }

    pub fn as_ref(&self) -> Structured<&T> {
        match self {
            Structured::Tensor(t) => Structured::Tensor(t),
            Structured::Dict(d) => Structured::Dict(d.iter().map(|(k, v)| (k.clone(), v)).collect()),
        }
    }

    pub fn values(&self) -> Vec<&T> {
        match self {
            Structured::Tensor(t) => vec![t],
            Structured::Dict(d) => d.values().collect(),
        }
    }

    pub fn into_dict(self) -> Option<BTreeMap<String, T>> {
        match self {
            Structured::Dict(d) => Some(d),
            Structured::Tensor(_) => None,
        }
    }

    pub fn is_dict(&self) -> bool {
        matches!(self, Structured::Dict(_))
    }
}

/// A function traced once against a fixed input signature.
///
/// The graph is frozen: calling the function never re-runs the Rust code that
/// built it, so a `ConcreteFunction` read back from disk behaves exactly like
/// the one that was saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcreteFunction {
    name: String,
    graph: Graph,
    inputs: Vec<NodeId>,
    outputs: OutputStructure,
}

impl ConcreteFunction {
    /// Trace `f` with one placeholder per entry of `input_specs`.
    pub fn trace<F>(
        name: impl Into<String>,
        input_specs: &[TypeSpec],
        f: F,
    ) -> Result<Self, GraphError>
    where
        F: for<'g> FnOnce(&'g Tracer, &[Symbol<'g>]) -> Result<Structured<Symbol<'g>>, GraphError>,
    {
        let tracer = Tracer::new();
        let (inputs, outputs) = {
            let args = input_specs
                .iter()
                .map(|spec| tracer.placeholder(spec.clone()))
                .collect::<Result<Vec<_>, _>>()?;
            let outputs = f(&tracer, &args)?.try_map(|symbol| {
                if tracer.owns(&symbol) {
                    Ok(symbol.id())
                } else {
                    Err(GraphError::UnknownNode {
                        node: symbol.id().0,
                    })
                }
            })?;
            (args.iter().map(Symbol::id).collect(), outputs)
        };
        Ok(Self {
            name: name.into(),
            graph: tracer.into_graph(),
            inputs,
            outputs,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn inputs(&self) -> &[NodeId] {
        &self.inputs
    }

    pub fn input_specs(&self) -> Result<Vec<TypeSpec>, GraphError> {
        self.inputs
            .iter()
            .map(|&id| self.graph.node(id).map(|node| node.spec.clone()))
            .collect()
    }

    pub fn structured_outputs(&self) -> &OutputStructure {
        &self.outputs
    }

    /// Output specs as recorded at trace time.
    pub fn output_specs(&self) -> Result<Structured<TypeSpec>, GraphError> {
        self.outputs
            .as_ref()
            .try_map(|&id| self.graph.node(id).map(|node| node.spec.clone()))
    }

    /// Call with the strategy matching the ambient execution mode.
    pub fn call(&self, args: &[Tensor]) -> Result<Structured<Tensor>, ExecutionError> {
        if executing_eagerly() {
            self.call_with(&Immediate, args)
        } else {
            self.call_with(&Deferred, args)
        }
    }

    pub fn call_with(
        &self,
        strategy: &dyn EvaluationStrategy,
        args: &[Tensor],
    ) -> Result<Structured<Tensor>, ExecutionError> {
        self.check_args(args)?;
        strategy.evaluate(self, args)
    }

    fn check_args(&self, args: &[Tensor]) -> Result<(), ExecutionError> {
        if args.len() != self.inputs.len() {
            return Err(ExecutionError::ArgumentCount {
                function: self.name.clone(),
                expected: self.inputs.len(),
                got: args.len(),
            });
        }
        for (index, (spec, arg)) in self.input_specs()?.into_iter().zip(args).enumerate() {
            if !spec.is_compatible_with(arg) {
                return Err(ExecutionError::ArgumentMismatch {
                    function: self.name.clone(),
                    index,
                    got: type_spec_from_value(arg).to_string(),
                    expected: spec,
                });
            }
        }
        Ok(())
    }

    /// Check that every node id the function refers to exists, that inputs
    /// are placeholders and that nodes only read from earlier nodes.
    ///
    /// Recorded specs are trusted; see [`validate`](Self::validate).
    pub fn check_structure(&self) -> Result<(), GraphError> {
        self.graph.check_references()?;
        for &id in &self.inputs {
            let node = self.graph.node(id)?;
            if !matches!(node.op, Op::Placeholder { .. }) {
                return Err(GraphError::InvalidOperand {
                    op: node.op.name(),
                    detail: format!("function input {} is not a placeholder", id.0),
                });
            }
        }
        self.outputs
            .as_ref()
            .try_map(|&id| self.graph.node(id).map(drop))?;
        Ok(())
    }

    /// [`check_structure`](Self::check_structure), then re-infer every node
    /// and compare with the recorded specs.
    pub fn validate(&self) -> Result<(), GraphError> {
        self.check_structure()?;
        self.graph.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dtype::DType,
        spec::TensorShape,
        tensor::{DenseTensor, TensorData},
    };

    fn strings() -> TypeSpec {
        TypeSpec::dense(DType::String, TensorShape::unknown_vector())
    }

    fn words() -> Tensor {
        DenseTensor::vector(TensorData::strings(["ab", "c"])).into()
    }

    #[test]
    fn call_rejects_wrong_arguments() {
        let f = ConcreteFunction::trace("f", &[strings()], |_, args| {
            Ok(Structured::Tensor(args[0].string_length()?))
        })
        .unwrap();

        let err = f.call(&[]).unwrap_err();
        assert!(matches!(err, ExecutionError::ArgumentCount { expected: 1, got: 0, .. }));

        let err = f.call(&[DenseTensor::scalar_i64(1).into()]).unwrap_err();
        assert!(matches!(err, ExecutionError::ArgumentMismatch { index: 0, .. }));
    }

    #[test]
    fn output_specs_come_from_the_trace() {
        let f = ConcreteFunction::trace("f", &[strings()], |_, args| {
            let words = args[0].string_split(" ")?;
            Ok(Structured::Dict(BTreeMap::from([("words".to_string(), words)])))
        })
        .unwrap();
        let specs = f.output_specs().unwrap().into_dict().unwrap();
        assert_eq!(specs["words"], TypeSpec::ragged(DType::String, None));
        f.validate().unwrap();
    }

    #[test]
    fn dangling_output_ids_are_errors() {
        let mut f = ConcreteFunction::trace("f", &[strings()], |_, args| {
            Ok(Structured::Tensor(args[0].string_length()?))
        })
        .unwrap();
        f.outputs = Structured::Tensor(NodeId(999));

        assert!(matches!(
            f.check_structure(),
            Err(GraphError::UnknownNode { node: 999 })
        ));
        assert!(matches!(f.output_specs(), Err(GraphError::UnknownNode { node: 999 })));

        let err = f
            .call_with(&Deferred, &[words()])
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Graph(GraphError::UnknownNode { node: 999 })));
    }

    #[test]
    fn dangling_input_ids_are_errors() {
        let mut f = ConcreteFunction::trace("f", &[strings()], |_, args| {
            Ok(Structured::Tensor(args[0].string_length()?))
        })
        .unwrap();
        f.inputs = vec![NodeId(7)];

        assert!(matches!(f.input_specs(), Err(GraphError::UnknownNode { node: 7 })));
        let err = f.call(&[words()]).unwrap_err();
        assert!(matches!(err, ExecutionError::Graph(GraphError::UnknownNode { node: 7 })));
    }
}
