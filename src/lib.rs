//! Parallelism planning pass.
//! plan graph -> fixed constraints -> shuffle stages -> resolved parallelism -> commit

#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate log;

pub mod config;
pub mod constraint;
pub mod error;
pub mod graph;
pub mod metadata;
pub mod processor;
pub mod resolve;
pub mod stage;

/// stable identifier of a plan node, assigned by the upstream planner
#[derive(
    Copy, Clone, Serialize, Deserialize, Debug, Eq, PartialEq, Hash, Default, Ord, PartialOrd,
)]
pub struct NodeId(pub u32);

impl std::ops::Deref for NodeId {
    type Target = u32;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
