use crate::config::PlannerConfig;
use crate::error::PlanError;
use crate::graph::PlanGraph;
use crate::stage::{ShuffleStage, StageSet};
use crate::NodeId;

/// compute one parallelism per stage
///
/// a final stage keeps its fixed value after range validation, the rest
/// derive a candidate from statistics or the configured default and clamp it.
/// clamping is the sole tie-break, the result only depends on membership,
/// statistics and config.
pub(crate) fn resolve_parallelism(
    graph: &PlanGraph,
    stage_set: &mut StageSet,
    config: &PlannerConfig,
) -> Result<(), PlanError> {
    let mut resolved = Vec::with_capacity(stage_set.stages().len());
    for stage in stage_set.stages() {
        resolved.push(resolve_stage(graph, stage, config)?);
    }

    for (stage, value) in stage_set.stages_mut().iter_mut().zip(resolved) {
        stage.set_parallelism(value);
    }

    Ok(())
}

fn resolve_stage(
    graph: &PlanGraph,
    stage: &ShuffleStage,
    config: &PlannerConfig,
) -> Result<u16, PlanError> {
    let narrowest_cap = narrowest_member_cap(graph, stage);

    match stage.fixed() {
        Some(value) => {
            if value == 0 || value > config.max_parallelism {
                return Err(PlanError::InvalidParallelism {
                    node: stage.members()[0],
                    value,
                    max: config.max_parallelism,
                });
            }
            if let Some((member, cap)) = narrowest_cap {
                if value > cap {
                    return Err(PlanError::InvalidParallelism {
                        node: member,
                        value,
                        max: cap,
                    });
                }
            }
            Ok(value)
        }
        None => {
            let candidate = match stats_candidate(graph, stage, config) {
                Some(candidate) => candidate,
                None => config.default_parallelism as u64,
            };

            let mut value = candidate.max(1).min(config.max_parallelism as u64) as u16;
            if let Some((member, cap)) = narrowest_cap {
                if cap < 1 {
                    return Err(PlanError::InvalidParallelism {
                        node: member,
                        value: cap,
                        max: config.max_parallelism,
                    });
                }
                value = value.min(cap);
            }

            Ok(value)
        }
    }
}

/// `ceil(total estimated bytes / target bytes per instance)`, `None` when no
/// member carries statistics or sizing is not configured
fn stats_candidate(graph: &PlanGraph, stage: &ShuffleStage, config: &PlannerConfig) -> Option<u64> {
    let bytes_per_instance = match config.bytes_per_instance {
        Some(n) if n > 0 => n,
        _ => return None,
    };

    let mut total_bytes = 0u64;
    let mut usable = false;
    for member in stage.members() {
        if let Some(stats) = member_node(graph, *member).stats() {
            total_bytes += stats.bytes;
            usable = true;
        }
    }

    if usable {
        Some(total_bytes.div_ceil(bytes_per_instance))
    } else {
        None
    }
}

fn narrowest_member_cap(graph: &PlanGraph, stage: &ShuffleStage) -> Option<(NodeId, u16)> {
    let mut narrowest: Option<(NodeId, u16)> = None;
    for member in stage.members() {
        if let Some(cap) = member_node(graph, *member).resource().max_parallelism() {
            match narrowest {
                Some((_member, narrow)) if narrow <= cap => {}
                _ => narrowest = Some((*member, cap)),
            }
        }
    }
    narrowest
}

fn member_node<'a>(graph: &'a PlanGraph, member: NodeId) -> &'a crate::graph::PlanNode {
    let node_index = graph
        .node_index(member)
        .unwrap_or_else(|| panic!("stage member {} not in plan graph", member));
    graph.node(node_index)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use crate::config::PlannerConfig;
    use crate::error::PlanError;
    use crate::graph::{ExchangeMode, NodeKind, NodeStats, PlanGraph, PlanNode};
    use crate::resolve::resolve_parallelism;
    use crate::stage::StageSet;
    use crate::NodeId;

    fn single_stage(graph: &PlanGraph, root: NodeId, fixed: &HashMap<NodeId, u16>) -> StageSet {
        let reachable = graph.reachable(&[graph.node_index(root).unwrap()]);
        StageSet::build(graph, &reachable, fixed).unwrap()
    }

    #[test]
    pub fn default_parallelism_test() {
        let mut graph = PlanGraph::new();
        graph
            .add_node(PlanNode::new(NodeId(0), "source", NodeKind::Source), &[])
            .unwrap();

        let mut stage_set = single_stage(&graph, NodeId(0), &HashMap::new());
        resolve_parallelism(&graph, &mut stage_set, &PlannerConfig::new(8, 16)).unwrap();

        assert_eq!(stage_set.stages()[0].parallelism(), Some(8));
    }

    #[test]
    pub fn stats_sizing_test() {
        let mut graph = PlanGraph::new();
        graph
            .add_node(
                PlanNode::new(NodeId(0), "source", NodeKind::Source).with_stats(NodeStats {
                    rows: 10_000,
                    bytes: 1_000_000,
                }),
                &[],
            )
            .unwrap();

        let config = PlannerConfig::new(8, 64).with_bytes_per_instance(100_000);
        let mut stage_set = single_stage(&graph, NodeId(0), &HashMap::new());
        resolve_parallelism(&graph, &mut stage_set, &config).unwrap();

        assert_eq!(stage_set.stages()[0].parallelism(), Some(10));
    }

    #[test]
    pub fn stats_clamped_by_max_test() {
        let mut graph = PlanGraph::new();
        graph
            .add_node(
                PlanNode::new(NodeId(0), "source", NodeKind::Source).with_stats(NodeStats {
                    rows: 10_000,
                    bytes: 1_000_000,
                }),
                &[],
            )
            .unwrap();

        let config = PlannerConfig::new(8, 6).with_bytes_per_instance(100_000);
        let mut stage_set = single_stage(&graph, NodeId(0), &HashMap::new());
        resolve_parallelism(&graph, &mut stage_set, &config).unwrap();

        // the ceiling wins over the statistic
        assert_eq!(stage_set.stages()[0].parallelism(), Some(6));
    }

    #[test]
    pub fn huge_stats_test() {
        let mut graph = PlanGraph::new();
        graph
            .add_node(
                PlanNode::new(NodeId(0), "source", NodeKind::Source).with_stats(NodeStats {
                    rows: u64::MAX,
                    bytes: u64::MAX,
                }),
                &[],
            )
            .unwrap();

        let config = PlannerConfig::new(8, 16).with_bytes_per_instance(3);
        let mut stage_set = single_stage(&graph, NodeId(0), &HashMap::new());
        resolve_parallelism(&graph, &mut stage_set, &config).unwrap();

        assert_eq!(stage_set.stages()[0].parallelism(), Some(16));
    }

    #[test]
    pub fn stats_clamped_by_member_cap_test() {
        let mut graph = PlanGraph::new();
        graph
            .add_node(
                PlanNode::new(NodeId(0), "source", NodeKind::Source).with_stats(NodeStats {
                    rows: 10_000,
                    bytes: 1_000_000,
                }),
                &[],
            )
            .unwrap();
        graph
            .add_node(
                PlanNode::new(NodeId(1), "map", NodeKind::Map).with_max_parallelism(4),
                &[(NodeId(0), ExchangeMode::Forward)],
            )
            .unwrap();

        // statistics ask for 10 instances, the narrowest member cap wins
        let config = PlannerConfig::new(8, 64).with_bytes_per_instance(100_000);
        let mut stage_set = single_stage(&graph, NodeId(1), &HashMap::new());
        resolve_parallelism(&graph, &mut stage_set, &config).unwrap();

        assert_eq!(stage_set.stages()[0].parallelism(), Some(4));
    }

    #[test]
    pub fn member_cap_narrows_test() {
        let mut graph = PlanGraph::new();
        graph
            .add_node(PlanNode::new(NodeId(0), "source", NodeKind::Source), &[])
            .unwrap();
        graph
            .add_node(
                PlanNode::new(NodeId(1), "map", NodeKind::Map).with_max_parallelism(3),
                &[(NodeId(0), ExchangeMode::Forward)],
            )
            .unwrap();

        let mut stage_set = single_stage(&graph, NodeId(1), &HashMap::new());
        resolve_parallelism(&graph, &mut stage_set, &PlannerConfig::new(8, 16)).unwrap();

        assert_eq!(stage_set.stages()[0].parallelism(), Some(3));
    }

    #[test]
    pub fn fixed_out_of_range_test() {
        let mut graph = PlanGraph::new();
        graph
            .add_node(PlanNode::new(NodeId(0), "source", NodeKind::Source), &[])
            .unwrap();

        let mut fixed = HashMap::new();
        fixed.insert(NodeId(0), 32u16);

        let mut stage_set = single_stage(&graph, NodeId(0), &fixed);
        match resolve_parallelism(&graph, &mut stage_set, &PlannerConfig::new(8, 16)) {
            Err(PlanError::InvalidParallelism { node, value, max }) => {
                assert_eq!(node, NodeId(0));
                assert_eq!(value, 32);
                assert_eq!(max, 16);
            }
            r => panic!("unexpected result: {:?}", r.err()),
        }
    }

    #[test]
    pub fn fixed_exceeds_member_cap_test() {
        let mut graph = PlanGraph::new();
        graph
            .add_node(
                PlanNode::new(NodeId(0), "source", NodeKind::Source).with_source_partitions(4),
                &[],
            )
            .unwrap();
        graph
            .add_node(
                PlanNode::new(NodeId(1), "map", NodeKind::Map).with_max_parallelism(2),
                &[(NodeId(0), ExchangeMode::Forward)],
            )
            .unwrap();

        let mut fixed = HashMap::new();
        fixed.insert(NodeId(0), 4u16);
        fixed.insert(NodeId(1), 4u16);

        let mut stage_set = single_stage(&graph, NodeId(1), &fixed);
        match resolve_parallelism(&graph, &mut stage_set, &PlannerConfig::new(8, 16)) {
            Err(PlanError::InvalidParallelism { node, value, max }) => {
                assert_eq!(node, NodeId(1));
                assert_eq!(value, 4);
                assert_eq!(max, 2);
            }
            r => panic!("unexpected result: {:?}", r.err()),
        }
    }

    #[test]
    pub fn zero_fixed_invalid_test() {
        let mut graph = PlanGraph::new();
        graph
            .add_node(PlanNode::new(NodeId(0), "source", NodeKind::Source), &[])
            .unwrap();

        let mut fixed = HashMap::new();
        fixed.insert(NodeId(0), 0u16);

        let mut stage_set = single_stage(&graph, NodeId(0), &fixed);
        let result = resolve_parallelism(&graph, &mut stage_set, &PlannerConfig::new(8, 16));
        assert!(matches!(
            result,
            Err(PlanError::InvalidParallelism { .. })
        ));
    }
}
