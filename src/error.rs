use thiserror::Error;

use crate::NodeId;

#[derive(Error, Debug)]
pub enum PlanError {
    #[error("DAG would cycle on edge {0}->{1}")]
    WouldCycle(NodeId, NodeId),
    #[error("parent node {0} not found")]
    ParentNodeNotFound(NodeId),
    #[error("sink root {0} has {1} inputs, expect exactly one")]
    MalformedSinkRoot(NodeId, usize),
    #[error("parallelism of node {node} fixed to both {existing} and {proposed}")]
    ConstraintConflict {
        node: NodeId,
        existing: u16,
        proposed: u16,
    },
    #[error("parallelism {value} of node {node} out of range [1, {max}]")]
    InvalidParallelism { node: NodeId, value: u16, max: u16 },
    #[error("`{0}` field not found")]
    PropertyNotFound(String),
    #[error("`{0}` field is not a valid number")]
    PropertyMalformed(String),
}
