use thiserror::Error;

use crate::node::NodeId;

/// Failures of individual tree operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DomError {
    #[error("node {0} is not an element")]
    NotAnElement(NodeId),

    #[error("node {0} is not a character data node")]
    NotCharacterData(NodeId),

    #[error("node {0} has no parent")]
    NoParent(NodeId),

    #[error("node {child} is not a child of {parent}")]
    NotAChild { parent: NodeId, child: NodeId },

    #[error("cannot insert {child} into {parent}")]
    HierarchyRequest { parent: NodeId, child: NodeId },

    #[error("no nodes given")]
    EmptyNodeList,

    #[error("offset {offset} is out of bounds for node {node}")]
    OffsetOutOfBounds { node: NodeId, offset: usize },
}
