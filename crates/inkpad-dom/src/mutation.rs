//! Mutation records produced while a document is recording.

use smol_str::SmolStr;

use crate::node::NodeId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Attribute,
    ChildList,
    CharacterData,
}

/// One observed change to a connected node.
///
/// Each record holds enough of the prior state to put the node back the way it
/// was: attribute records carry the old value, character data records the old
/// text, and child list records the exact prior child handles of the target.
#[derive(Clone, Debug, PartialEq)]
pub enum MutationRecord {
    Attribute {
        target: NodeId,
        name: SmolStr,
        old_value: Option<String>,
        new_value: Option<String>,
    },
    CharacterData {
        target: NodeId,
        old_value: String,
        new_value: String,
    },
    ChildList {
        target: NodeId,
        old_children: Vec<NodeId>,
    },
}

impl MutationRecord {
    pub fn kind(&self) -> MutationKind {
        match self {
            MutationRecord::Attribute { .. } => MutationKind::Attribute,
            MutationRecord::CharacterData { .. } => MutationKind::CharacterData,
            MutationRecord::ChildList { .. } => MutationKind::ChildList,
        }
    }

    pub fn target(&self) -> NodeId {
        match self {
            MutationRecord::Attribute { target, .. }
            | MutationRecord::CharacterData { target, .. }
            | MutationRecord::ChildList { target, .. } => *target,
        }
    }

    pub fn attribute_name(&self) -> Option<&str> {
        match self {
            MutationRecord::Attribute { name, .. } => Some(name.as_str()),
            _ => None,
        }
    }

    pub fn old_value(&self) -> Option<&str> {
        match self {
            MutationRecord::Attribute { old_value, .. } => old_value.as_deref(),
            MutationRecord::CharacterData { old_value, .. } => Some(old_value),
            MutationRecord::ChildList { .. } => None,
        }
    }

    pub fn new_value(&self) -> Option<&str> {
        match self {
            MutationRecord::Attribute { new_value, .. } => new_value.as_deref(),
            MutationRecord::CharacterData { new_value, .. } => Some(new_value),
            MutationRecord::ChildList { .. } => None,
        }
    }
}
