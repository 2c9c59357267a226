//! Serializable decode graphs.
//!
//! A [`Graph`] is a list of nodes in topological order. Every node records the
//! [`TypeSpec`] inferred when it was traced, so consumers of a persisted graph
//! can read output specs without evaluating anything.

mod kernels;
mod op;
mod proto;
mod trace;

use serde::{Deserialize, Serialize};

pub use op::Op;
pub use proto::ProtoField;
pub use trace::{Symbol, Tracer};

pub(crate) use kernels::evaluate;

use crate::{error::GraphError, spec::TypeSpec};

/// Index of a node inside its [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub op: Op,
    pub inputs: Vec<NodeId>,
    pub spec: TypeSpec,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Graph {
    nodes: Vec<Node>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Result<&Node, GraphError> {
        self.nodes
            .get(id.0)
            .ok_or(GraphError::UnknownNode { node: id.0 })
    }

    /// Append `op` applied to `inputs`, inferring its spec.
    pub fn add_node(&mut self, op: Op, inputs: Vec<NodeId>) -> Result<NodeId, GraphError> {
        let input_specs = inputs
            .iter()
            .map(|&id| self.node(id).map(|n| &n.spec))
            .collect::<Result<Vec<_>, _>>()?;
        let spec = op.infer(&input_specs)?;
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node { op, inputs, spec });
        Ok(id)
    }

    /// Check that every node reads only from earlier nodes.
    pub fn check_references(&self) -> Result<(), GraphError> {
        for (index, node) in self.nodes.iter().enumerate() {
            if let Some(id) = node.inputs.iter().find(|id| id.0 >= index) {
                return Err(GraphError::UnknownNode { node: id.0 });
            }
        }
        Ok(())
    }

    /// Re-infer every node and compare with the recorded specs.
    ///
    /// Used on graphs read from disk: each input must refer to an earlier node
    /// and each recorded spec must be exactly what inference produces.
    pub fn validate(&self) -> Result<(), GraphError> {
        for (index, node) in self.nodes.iter().enumerate() {
            let input_specs = node
                .inputs
                .iter()
                .map(|&id| {
                    if id.0 >= index {
                        Err(GraphError::UnknownNode { node: id.0 })
                    } else {
                        Ok(&self.nodes[id.0].spec)
                    }
                })
                .collect::<Result<Vec<_>, _>>()?;
            if let Op::Const { value } = &node.op {
                value.validate()?;
            }
            let inferred = node.op.infer(&input_specs)?;
            if inferred != node.spec {
                return Err(GraphError::InvalidOperand {
                    op: node.op.name(),
                    detail: format!(
                        "node {index} records {} but its inputs imply {inferred}",
                        node.spec
                    ),
                });
            }
        }
        Ok(())
    }
}
