use std::collections::{HashMap, HashSet};
use std::ops::{Index, IndexMut};

use daggy::{Dag, EdgeIndex, NodeIndex, Walker};

use crate::error::PlanError;
use crate::NodeId;

/// data movement semantics of an edge between two plan nodes
#[derive(Copy, Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum ExchangeMode {
    /// no repartition, consumer shares the producer's parallelism
    Forward = 1,
    /// consumer collapses to a single instance
    Singleton = 2,
    /// repartition by key hash
    Hash = 3,
    /// round-robin repartition
    Rebalance = 4,
    /// replicate to every consumer instance
    Broadcast = 5,
}

impl ExchangeMode {
    /// `Forward` and `Singleton` couple both endpoints into one shuffle stage
    pub fn is_coupling(&self) -> bool {
        match self {
            ExchangeMode::Forward | ExchangeMode::Singleton => true,
            ExchangeMode::Hash | ExchangeMode::Rebalance | ExchangeMode::Broadcast => false,
        }
    }
}

#[derive(Copy, Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Source,
    Map,
    Filter,
    KeyBy,
    Reduce,
    WindowAssigner,
    Sink,
}

impl NodeKind {
    pub fn is_source(&self) -> bool {
        *self == NodeKind::Source
    }

    pub fn is_sink(&self) -> bool {
        *self == NodeKind::Sink
    }
}

/// per-node resource descriptor, `parallelism` stays unset until commit
#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct ResourceSpec {
    parallelism: Option<u16>,
    max_parallelism: Option<u16>,
}

impl ResourceSpec {
    pub fn new() -> Self {
        ResourceSpec {
            parallelism: None,
            max_parallelism: None,
        }
    }

    pub fn parallelism(&self) -> Option<u16> {
        self.parallelism
    }

    pub fn set_parallelism(&mut self, parallelism: u16) {
        self.parallelism = Some(parallelism);
    }

    pub fn max_parallelism(&self) -> Option<u16> {
        self.max_parallelism
    }

    pub fn set_max_parallelism(&mut self, max_parallelism: u16) {
        self.max_parallelism = Some(max_parallelism);
    }
}

/// upstream cardinality/volume estimates, consumed as-is
#[derive(Copy, Clone, Serialize, Deserialize, Debug)]
pub struct NodeStats {
    pub rows: u64,
    pub bytes: u64,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct PlanNode {
    id: NodeId,
    name: String,
    kind: NodeKind,
    resource: ResourceSpec,
    stats: Option<NodeStats>,
    /// external partition bound of a statically partitioned source
    source_partitions: Option<u16>,
}

impl PlanNode {
    pub fn new(id: NodeId, name: &str, kind: NodeKind) -> Self {
        PlanNode {
            id,
            name: name.to_string(),
            kind,
            resource: ResourceSpec::new(),
            stats: None,
            source_partitions: None,
        }
    }

    pub fn with_max_parallelism(mut self, max_parallelism: u16) -> Self {
        self.resource.set_max_parallelism(max_parallelism);
        self
    }

    pub fn with_stats(mut self, stats: NodeStats) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn with_source_partitions(mut self, source_partitions: u16) -> Self {
        self.source_partitions = Some(source_partitions);
        self
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn resource(&self) -> &ResourceSpec {
        &self.resource
    }

    pub(crate) fn resource_mut(&mut self) -> &mut ResourceSpec {
        &mut self.resource
    }

    pub fn stats(&self) -> Option<&NodeStats> {
        self.stats.as_ref()
    }

    pub fn source_partitions(&self) -> Option<u16> {
        self.source_partitions
    }
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct PlanEdge {
    edge_id: String,
    source_id: NodeId,
    target_id: NodeId,
    exchange: ExchangeMode,
}

impl PlanEdge {
    pub fn source_id(&self) -> NodeId {
        self.source_id
    }

    pub fn target_id(&self) -> NodeId {
        self.target_id
    }

    pub fn exchange(&self) -> ExchangeMode {
        self.exchange
    }
}

/// flat arena over the execution plan DAG
///
/// nodes are owned by the arena and addressed by stable `NodeIndex`, edge
/// insertion order is the deterministic scan order of the planning passes
#[derive(Debug)]
pub struct PlanGraph {
    node_indies: HashMap<NodeId, NodeIndex>,

    sources: Vec<NodeIndex>,
    sinks: Vec<NodeIndex>,

    dag: Dag<PlanNode, PlanEdge>,
}

impl PlanGraph {
    pub fn new() -> Self {
        PlanGraph {
            node_indies: HashMap::new(),
            sources: Vec::new(),
            sinks: Vec::new(),
            dag: Dag::new(),
        }
    }

    pub fn dag(&self) -> &Dag<PlanNode, PlanEdge> {
        &self.dag
    }

    /// add a node and connect it to its already-added producers
    pub fn add_node(
        &mut self,
        node: PlanNode,
        parents: &[(NodeId, ExchangeMode)],
    ) -> Result<NodeIndex, PlanError> {
        let node_id = node.id();
        let node_kind = node.kind();
        let node_index = self.dag.add_node(node);

        for (parent_id, exchange) in parents {
            let p_node_index = *self
                .node_indies
                .get(parent_id)
                .ok_or(PlanError::ParentNodeNotFound(*parent_id))?;

            let plan_edge = PlanEdge {
                edge_id: format!("{}->{}", parent_id, node_id),
                source_id: *parent_id,
                target_id: node_id,
                exchange: *exchange,
            };

            self.dag
                .add_edge(p_node_index, node_index, plan_edge)
                .map_err(|_e| PlanError::WouldCycle(*parent_id, node_id))?;
        }

        if node_kind.is_source() {
            self.sources.push(node_index);
        } else if node_kind.is_sink() {
            self.sinks.push(node_index);
        }
        self.node_indies.insert(node_id, node_index);

        Ok(node_index)
    }

    /// connect two already-added nodes, e.g. to give a node an extra
    /// consumer; rejects edges that would close a cycle
    pub fn add_edge(
        &mut self,
        source_id: NodeId,
        target_id: NodeId,
        exchange: ExchangeMode,
    ) -> Result<EdgeIndex, PlanError> {
        let source_index = *self
            .node_indies
            .get(&source_id)
            .ok_or(PlanError::ParentNodeNotFound(source_id))?;
        let target_index = *self
            .node_indies
            .get(&target_id)
            .ok_or(PlanError::ParentNodeNotFound(target_id))?;

        let plan_edge = PlanEdge {
            edge_id: format!("{}->{}", source_id, target_id),
            source_id,
            target_id,
            exchange,
        };

        self.dag
            .add_edge(source_index, target_index, plan_edge)
            .map_err(|_e| PlanError::WouldCycle(source_id, target_id))
    }

    pub fn node(&self, node_index: NodeIndex) -> &PlanNode {
        self.dag.index(node_index)
    }

    pub(crate) fn node_mut(&mut self, node_index: NodeIndex) -> &mut PlanNode {
        self.dag.index_mut(node_index)
    }

    pub fn node_index(&self, node_id: NodeId) -> Option<NodeIndex> {
        self.node_indies.get(&node_id).map(|x| *x)
    }

    pub fn edge(&self, edge_index: EdgeIndex) -> &PlanEdge {
        self.dag.index(edge_index)
    }

    pub fn parents(&self, node_index: NodeIndex) -> Vec<(EdgeIndex, NodeIndex)> {
        self.dag.parents(node_index).iter(&self.dag).collect()
    }

    pub fn children(&self, node_index: NodeIndex) -> Vec<(EdgeIndex, NodeIndex)> {
        self.dag.children(node_index).iter(&self.dag).collect()
    }

    /// all nodes reachable from `roots` through producer edges, each exactly
    /// once, in deterministic depth-first order
    pub fn reachable(&self, roots: &[NodeIndex]) -> Vec<NodeIndex> {
        let mut visited = HashSet::new();
        let mut ordered = Vec::new();

        let mut stack: Vec<NodeIndex> = roots.iter().rev().map(|x| *x).collect();
        while let Some(node_index) = stack.pop() {
            if !visited.insert(node_index) {
                continue;
            }
            ordered.push(node_index);

            for (_edge_index, parent_index) in self.parents(node_index) {
                stack.push(parent_index);
            }
        }

        ordered
    }

    pub fn sources(&self) -> &[NodeIndex] {
        self.sources.as_slice()
    }

    pub fn sinks(&self) -> &[NodeIndex] {
        self.sinks.as_slice()
    }
}
