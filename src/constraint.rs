use std::collections::{HashMap, HashSet};

use daggy::NodeIndex;

use crate::error::PlanError;
use crate::graph::{ExchangeMode, PlanGraph, PlanNode};
use crate::NodeId;

/// capability query deciding whether a node's parallelism is mandated from
/// outside, supplied by the surrounding planner
pub trait ParallelismConstraint {
    fn fixed_parallelism(&self, node: &PlanNode) -> Option<u16>;
}

/// default constraint: a source bound to a fixed number of external
/// partitions must run with exactly that many instances
pub struct SourcePartitionConstraint;

impl ParallelismConstraint for SourcePartitionConstraint {
    fn fixed_parallelism(&self, node: &PlanNode) -> Option<u16> {
        if node.kind().is_source() {
            node.source_partitions()
        } else {
            None
        }
    }
}

/// determines the nodes whose parallelism cannot be changed
///
/// a node is fixed when the external constraint binds it, when a `Singleton`
/// inbound edge collapses it to 1, or when a `Forward` neighbor is already
/// fixed. `Forward` coupling is symmetric, so values propagate both up and
/// down until no new fixed node appears.
pub(crate) struct ConstraintResolver<'a> {
    graph: &'a PlanGraph,
    constraint: &'a dyn ParallelismConstraint,
}

impl<'a> ConstraintResolver<'a> {
    pub fn new(graph: &'a PlanGraph, constraint: &'a dyn ParallelismConstraint) -> Self {
        ConstraintResolver { graph, constraint }
    }

    pub fn resolve(&self, roots: &[NodeIndex]) -> Result<HashMap<NodeId, u16>, PlanError> {
        let reachable = self.graph.reachable(roots);
        let members: HashSet<NodeIndex> = reachable.iter().map(|x| *x).collect();

        let mut fixed: HashMap<NodeIndex, u16> = HashMap::new();
        let mut worklist: Vec<NodeIndex> = Vec::new();

        for node_index in &reachable {
            if let Some(value) = self.constraint.fixed_parallelism(self.graph.node(*node_index)) {
                self.assign(*node_index, value, &mut fixed, &mut worklist)?;
            }

            for (edge_index, _parent_index) in self.graph.parents(*node_index) {
                if self.graph.edge(edge_index).exchange() == ExchangeMode::Singleton {
                    self.assign(*node_index, 1, &mut fixed, &mut worklist)?;
                }
            }
        }

        while let Some(node_index) = worklist.pop() {
            let value = fixed[&node_index];

            for neighbor_index in self.forward_neighbors(node_index, &members) {
                self.assign(neighbor_index, value, &mut fixed, &mut worklist)?;
            }
        }

        Ok(fixed
            .into_iter()
            .map(|(node_index, value)| (self.graph.node(node_index).id(), value))
            .collect())
    }

    fn assign(
        &self,
        node_index: NodeIndex,
        value: u16,
        fixed: &mut HashMap<NodeIndex, u16>,
        worklist: &mut Vec<NodeIndex>,
    ) -> Result<(), PlanError> {
        match fixed.get(&node_index) {
            Some(existing) if *existing != value => Err(PlanError::ConstraintConflict {
                node: self.graph.node(node_index).id(),
                existing: *existing,
                proposed: value,
            }),
            Some(_existing) => Ok(()),
            None => {
                fixed.insert(node_index, value);
                worklist.push(node_index);
                Ok(())
            }
        }
    }

    fn forward_neighbors(
        &self,
        node_index: NodeIndex,
        members: &HashSet<NodeIndex>,
    ) -> Vec<NodeIndex> {
        let mut neighbors = Vec::new();

        for (edge_index, parent_index) in self.graph.parents(node_index) {
            if self.graph.edge(edge_index).exchange() == ExchangeMode::Forward
                && members.contains(&parent_index)
            {
                neighbors.push(parent_index);
            }
        }
        for (edge_index, child_index) in self.graph.children(node_index) {
            if self.graph.edge(edge_index).exchange() == ExchangeMode::Forward
                && members.contains(&child_index)
            {
                neighbors.push(child_index);
            }
        }

        neighbors
    }
}
