pub use graph::{Graph, InternalFlowLink, LinkKind, LinkMetadata, NodeId, NodeKind};

pub mod graph;
pub mod validation;
