//! Evaluation strategies and the ambient execution mode.
//!
//! [`Immediate`] walks the whole graph and reads values straight out of a
//! local table. [`Deferred`] stages the call into a fresh [`Session`] that is
//! pruned to the fetched outputs and dropped when the call returns. Neither
//! strategy touches state shared with other callers.

use std::cell::Cell;

use tracing::trace;

use crate::{
    error::{ExecutionError, GraphError},
    function::{ConcreteFunction, Structured},
    graph::{NodeId, Op, evaluate},
    spec::type_spec_from_value,
    tensor::Tensor,
};

/// How [`ConcreteFunction::call`] evaluates when no strategy is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    #[default]
    Eager,
    Graph,
}

thread_local! {
    static MODE: Cell<ExecutionMode> = const { Cell::new(ExecutionMode::Eager) };
}

/// The execution mode of the current thread.
pub fn execution_mode() -> ExecutionMode {
    MODE.with(Cell::get)
}

pub fn executing_eagerly() -> bool {
    execution_mode() == ExecutionMode::Eager
}

/// Run `f` with `mode` as the ambient execution mode of this thread.
///
/// The previous mode is restored when `f` returns or unwinds.
pub fn with_execution_mode<R>(mode: ExecutionMode, f: impl FnOnce() -> R) -> R {
    struct Restore(ExecutionMode);

    impl Drop for Restore {
        fn drop(&mut self) {
            MODE.with(|m| m.set(self.0));
        }
    }

    let _restore = Restore(MODE.with(|m| m.replace(mode)));
    f()
}

/// Evaluates a [`ConcreteFunction`] on arguments already checked against its
/// input signature.
pub trait EvaluationStrategy {
    fn evaluate(
        &self,
        function: &ConcreteFunction,
        args: &[Tensor],
    ) -> Result<Structured<Tensor>, ExecutionError>;
}

/// Evaluate every node in graph order.
#[derive(Debug, Clone, Copy, Default)]
pub struct Immediate;

impl EvaluationStrategy for Immediate {
    fn evaluate(
        &self,
        function: &ConcreteFunction,
        args: &[Tensor],
    ) -> Result<Structured<Tensor>, ExecutionError> {
        let mut values: Vec<Option<Tensor>> = vec![None; function.graph().len()];
        for index in 0..values.len() {
            values[index] = Some(run_node(function, NodeId(index), &values, args)?);
        }
        fetch(function, &values)
    }
}

/// Evaluate inside an isolated, scoped [`Session`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Deferred;

impl EvaluationStrategy for Deferred {
    fn evaluate(
        &self,
        function: &ConcreteFunction,
        args: &[Tensor],
    ) -> Result<Structured<Tensor>, ExecutionError> {
        Session::new(function)?.run(args)
    }
}

/// A single-use evaluation context.
///
/// Only nodes the fetched outputs depend on are evaluated, and the value table
/// lives exactly as long as the session.
#[derive(Debug)]
pub struct Session<'f> {
    function: &'f ConcreteFunction,
    needed: Vec<bool>,
    values: Vec<Option<Tensor>>,
}

impl<'f> Session<'f> {
    /// Fails when the function refers to nodes its graph does not hold.
    pub fn new(function: &'f ConcreteFunction) -> Result<Self, ExecutionError> {
        let graph = function.graph();
        let mut needed = vec![false; graph.len()];
        for &id in function.structured_outputs().values() {
            graph.node(id)?;
            needed[id.0] = true;
        }
        for index in (0..graph.len()).rev() {
            if needed[index] {
                for &input in &graph.nodes()[index].inputs {
                    if input.0 >= index {
                        return Err(GraphError::UnknownNode { node: input.0 }.into());
                    }
                    needed[input.0] = true;
                }
            }
        }
        Ok(Self {
            function,
            needed,
            values: vec![None; graph.len()],
        })
    }

    /// Number of nodes this session will evaluate.
    pub fn pruned_len(&self) -> usize {
        self.needed.iter().filter(|&&n| n).count()
    }

    pub fn run(mut self, args: &[Tensor]) -> Result<Structured<Tensor>, ExecutionError> {
        trace!(
            function = self.function.name(),
            nodes = self.pruned_len(),
            total = self.values.len(),
            "running deferred session"
        );
        for index in 0..self.values.len() {
            if self.needed[index] {
                self.values[index] = Some(run_node(self.function, NodeId(index), &self.values, args)?);
            }
        }
        fetch(self.function, &self.values)
    }
}

fn run_node(
    function: &ConcreteFunction,
    id: NodeId,
    values: &[Option<Tensor>],
    args: &[Tensor],
) -> Result<Tensor, ExecutionError> {
    let node = function.graph().node(id)?;
    let value = match &node.op {
        Op::Placeholder { .. } => {
            let position = function
                .inputs()
                .iter()
                .position(|&input| input == id)
                .ok_or_else(|| ExecutionError::Kernel {
                    op: node.op.name(),
                    detail: format!("node {} is not a function input", id.0),
                })?;
            args.get(position)
                .cloned()
                .ok_or_else(|| ExecutionError::ArgumentCount {
                    function: function.name().to_string(),
                    expected: function.inputs().len(),
                    got: args.len(),
                })?
        }
        op => {
            let inputs = node
                .inputs
                .iter()
                .map(|input| {
                    values.get(input.0).and_then(Option::as_ref).ok_or_else(|| ExecutionError::Kernel {
                        op: op.name(),
                        detail: format!("input node {} was not evaluated", input.0),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            evaluate(op, &inputs)?
        }
    };
    if !node.spec.is_compatible_with(&value) {
        return Err(ExecutionError::SpecViolation {
            node: id.0,
            expected: node.spec.clone(),
            got: type_spec_from_value(&value).to_string(),
        });
    }
    Ok(value)
}

fn fetch(
    function: &ConcreteFunction,
    values: &[Option<Tensor>],
) -> Result<Structured<Tensor>, ExecutionError> {
    function.structured_outputs().clone().try_map(|id| {
        values.get(id.0).cloned().flatten().ok_or_else(|| ExecutionError::Kernel {
            op: "Fetch",
            detail: format!("output node {} was not evaluated", id.0),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_is_restored_after_scope() {
        assert!(executing_eagerly());
        let inner = with_execution_mode(ExecutionMode::Graph, || {
            with_execution_mode(ExecutionMode::Eager, executing_eagerly)
                && !executing_eagerly()
        });
        assert!(inner);
        assert!(executing_eagerly());
    }

    #[test]
    fn mode_is_restored_after_panic() {
        let result = std::panic::catch_unwind(|| {
            with_execution_mode(ExecutionMode::Graph, || panic!("boom"))
        });
        assert!(result.is_err());
        assert_eq!(execution_mode(), ExecutionMode::Eager);
    }
}
