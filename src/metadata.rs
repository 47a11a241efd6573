use crate::graph::{ExchangeMode, NodeKind, PlanGraph};
use crate::NodeId;

/// serializable snapshot of the plan used for logging and inspection
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct PlanMetadata {
    nodes: Vec<MetadataNode>,
    edges: Vec<MetadataEdge>,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct MetadataNode {
    id: NodeId,
    name: String,
    kind: NodeKind,
    parallelism: Option<u16>,
    max_parallelism: Option<u16>,
}

impl MetadataNode {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn parallelism(&self) -> Option<u16> {
        self.parallelism
    }
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct MetadataEdge {
    /// source node id
    source: NodeId,
    /// target node id
    target: NodeId,
    exchange: ExchangeMode,
}

impl MetadataEdge {
    pub fn source(&self) -> NodeId {
        self.source
    }

    pub fn target(&self) -> NodeId {
        self.target
    }

    pub fn exchange(&self) -> ExchangeMode {
        self.exchange
    }
}

impl<'a> From<&'a PlanGraph> for PlanMetadata {
    fn from(graph: &'a PlanGraph) -> Self {
        let nodes = graph
            .dag()
            .raw_nodes()
            .iter()
            .map(|node| MetadataNode {
                id: node.weight.id(),
                name: node.weight.name().to_string(),
                kind: node.weight.kind(),
                parallelism: node.weight.resource().parallelism(),
                max_parallelism: node.weight.resource().max_parallelism(),
            })
            .collect();

        let edges = graph
            .dag()
            .raw_edges()
            .iter()
            .map(|edge| MetadataEdge {
                source: edge.weight.source_id(),
                target: edge.weight.target_id(),
                exchange: edge.weight.exchange(),
            })
            .collect();

        PlanMetadata { nodes, edges }
    }
}

impl PlanMetadata {
    pub fn nodes(&self) -> &Vec<MetadataNode> {
        &self.nodes
    }

    pub fn edges(&self) -> &Vec<MetadataEdge> {
        &self.edges
    }

    pub fn node(&self, node_id: NodeId) -> Option<&MetadataNode> {
        self.nodes.iter().find(|node| node.id == node_id)
    }
}
