use std::collections::HashMap;

use daggy::NodeIndex;

use crate::error::PlanError;
use crate::graph::PlanGraph;
use crate::NodeId;

/// maximal group of nodes connected without repartitioning, all members end
/// with one identical parallelism
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct ShuffleStage {
    members: Vec<NodeId>,
    /// externally mandated value, set when any member carries a constraint
    fixed: Option<u16>,
    parallelism: Option<u16>,
}

impl ShuffleStage {
    pub fn members(&self) -> &[NodeId] {
        self.members.as_slice()
    }

    pub fn is_final(&self) -> bool {
        self.fixed.is_some()
    }

    pub fn fixed(&self) -> Option<u16> {
        self.fixed
    }

    pub fn parallelism(&self) -> Option<u16> {
        self.parallelism
    }

    pub(crate) fn set_parallelism(&mut self, parallelism: u16) {
        self.parallelism = Some(parallelism);
    }
}

/// path-compressed disjoint sets over dense node ordinals, each set carries
/// the fixed value of its representative
struct DisjointSets {
    parent: Vec<usize>,
    fixed: Vec<Option<u16>>,
}

impl DisjointSets {
    fn new(len: usize) -> Self {
        DisjointSets {
            parent: (0..len).collect(),
            fixed: vec![None; len],
        }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            let root = self.find(self.parent[x]);
            self.parent[x] = root;
        }
        self.parent[x]
    }

    fn fix(&mut self, x: usize, value: u16) {
        let root = self.find(x);
        self.fixed[root] = Some(value);
    }

    /// merge the sets of `a` and `b`, `Err` with both values when the sets
    /// are finalized to different values
    fn union(&mut self, a: usize, b: usize) -> Result<(), (u16, u16)> {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a == root_b {
            return Ok(());
        }

        let merged_fixed = match (self.fixed[root_a], self.fixed[root_b]) {
            (Some(x), Some(y)) if x != y => return Err((x, y)),
            (Some(x), _) => Some(x),
            (_, y) => y,
        };

        self.parent[root_b] = root_a;
        self.fixed[root_a] = merged_fixed;
        Ok(())
    }
}

/// the shuffle stages of one plan and the node -> stage index
#[derive(Debug)]
pub struct StageSet {
    stages: Vec<ShuffleStage>,
    node_stages: HashMap<NodeId, usize>,
}

impl StageSet {
    /// cluster the reachable nodes, one singleton set per node, then union
    /// the endpoints of every coupling edge in insertion order
    pub fn build(
        graph: &PlanGraph,
        reachable: &[NodeIndex],
        fixed: &HashMap<NodeId, u16>,
    ) -> Result<StageSet, PlanError> {
        let mut ordinals: HashMap<NodeIndex, usize> = HashMap::new();
        for (ordinal, node_index) in reachable.iter().enumerate() {
            ordinals.insert(*node_index, ordinal);
        }

        let mut sets = DisjointSets::new(reachable.len());
        for (ordinal, node_index) in reachable.iter().enumerate() {
            if let Some(value) = fixed.get(&graph.node(*node_index).id()) {
                sets.fix(ordinal, *value);
            }
        }

        for edge in graph.dag().raw_edges() {
            if !edge.weight.exchange().is_coupling() {
                continue;
            }

            let source_ordinal = match ordinals.get(&edge.source()) {
                Some(ordinal) => *ordinal,
                None => continue,
            };
            let target_ordinal = match ordinals.get(&edge.target()) {
                Some(ordinal) => *ordinal,
                None => continue,
            };

            sets.union(source_ordinal, target_ordinal).map_err(
                |(existing, proposed)| PlanError::ConstraintConflict {
                    node: edge.weight.target_id(),
                    existing,
                    proposed,
                },
            )?;
        }

        let mut stages: Vec<ShuffleStage> = Vec::new();
        let mut node_stages = HashMap::new();
        let mut root_stages: HashMap<usize, usize> = HashMap::new();
        for (ordinal, node_index) in reachable.iter().enumerate() {
            let root = sets.find(ordinal);
            let stage_index = match root_stages.get(&root) {
                Some(stage_index) => *stage_index,
                None => {
                    stages.push(ShuffleStage {
                        members: Vec::new(),
                        fixed: sets.fixed[root],
                        parallelism: None,
                    });
                    root_stages.insert(root, stages.len() - 1);
                    stages.len() - 1
                }
            };

            let node_id = graph.node(*node_index).id();
            stages[stage_index].members.push(node_id);
            node_stages.insert(node_id, stage_index);
        }

        Ok(StageSet {
            stages,
            node_stages,
        })
    }

    pub fn stages(&self) -> &[ShuffleStage] {
        self.stages.as_slice()
    }

    pub(crate) fn stages_mut(&mut self) -> &mut [ShuffleStage] {
        self.stages.as_mut_slice()
    }

    pub fn stage_of(&self, node_id: NodeId) -> Option<&ShuffleStage> {
        self.node_stages
            .get(&node_id)
            .map(|stage_index| &self.stages[*stage_index])
    }
}
