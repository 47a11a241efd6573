use daggy::NodeIndex;

use crate::config::PlannerConfig;
use crate::constraint::{ConstraintResolver, ParallelismConstraint, SourcePartitionConstraint};
use crate::error::PlanError;
use crate::graph::PlanGraph;
use crate::metadata::PlanMetadata;
use crate::resolve::resolve_parallelism;
use crate::stage::StageSet;

/// processor calculating the parallelism of every node of a plan DAG
///
/// runs once per plan compilation: fixed constraints are resolved first,
/// coupled nodes are clustered into shuffle stages, every stage gets one
/// value, and only then are the node resource descriptors written. any
/// failure before the commit leaves the graph untouched.
pub struct ParallelismProcessor {
    config: PlannerConfig,
    constraint: Box<dyn ParallelismConstraint>,
}

impl ParallelismProcessor {
    pub fn new(config: PlannerConfig) -> Self {
        ParallelismProcessor {
            config,
            constraint: Box::new(SourcePartitionConstraint),
        }
    }

    pub fn with_constraint(
        config: PlannerConfig,
        constraint: Box<dyn ParallelismConstraint>,
    ) -> Self {
        ParallelismProcessor { config, constraint }
    }

    /// assign a parallelism to every node reachable from `roots`, the root
    /// list itself is handed back unchanged
    pub fn process(
        &self,
        graph: &mut PlanGraph,
        roots: Vec<NodeIndex>,
    ) -> Result<Vec<NodeIndex>, PlanError> {
        let work_roots = strip_sink_roots(graph, &roots)?;

        let resolver = ConstraintResolver::new(graph, self.constraint.as_ref());
        let fixed = resolver.resolve(&work_roots)?;
        debug!("{} nodes with fixed parallelism", fixed.len());

        let reachable = graph.reachable(&work_roots);
        let mut stage_set = StageSet::build(graph, &reachable, &fixed)?;

        resolve_parallelism(graph, &mut stage_set, &self.config)?;

        commit(graph, &reachable, &stage_set);
        info!(
            "parallelism committed, {} nodes in {} stages",
            reachable.len(),
            stage_set.stages().len()
        );

        if log_enabled!(log::Level::Debug) {
            let metadata = PlanMetadata::from(&*graph);
            debug!(
                "parallelism plan: {}",
                serde_json::to_string(&metadata).unwrap_or_default()
            );
        }

        Ok(roots)
    }
}

/// sink parallelism is assigned after physical translation, so a sink
/// wrapper root stands in for its single input here
fn strip_sink_roots(
    graph: &PlanGraph,
    roots: &[NodeIndex],
) -> Result<Vec<NodeIndex>, PlanError> {
    let mut work_roots = Vec::with_capacity(roots.len());
    for root in roots {
        if graph.node(*root).kind().is_sink() {
            let parents = graph.parents(*root);
            if parents.len() != 1 {
                return Err(PlanError::MalformedSinkRoot(
                    graph.node(*root).id(),
                    parents.len(),
                ));
            }
            work_roots.push(parents[0].1);
        } else {
            work_roots.push(*root);
        }
    }
    Ok(work_roots)
}

/// write-back of the resolved values, runs strictly after full resolution
///
/// a reachable node without a resolved stage is a bug in the pass itself,
/// not a recoverable condition
fn commit(graph: &mut PlanGraph, reachable: &[NodeIndex], stage_set: &StageSet) {
    for node_index in reachable {
        let node_id = graph.node(*node_index).id();
        let stage = stage_set
            .stage_of(node_id)
            .unwrap_or_else(|| panic!("node {} has no shuffle stage", node_id));
        let parallelism = stage
            .parallelism()
            .unwrap_or_else(|| panic!("stage of node {} is unresolved", node_id));

        graph
            .node_mut(*node_index)
            .resource_mut()
            .set_parallelism(parallelism);
    }
}
