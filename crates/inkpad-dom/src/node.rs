//! Node storage types.

use std::fmt;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Handle to a node in a [`Document`](crate::Document) arena.
///
/// Removing a node detaches it from the tree but keeps its slot, so a handle
/// held by an undo entry can always be asked whether it is still connected.
/// Slots are only freed by [`Document::collect_garbage`](crate::Document::collect_garbage),
/// which keeps every node its caller names as a root.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Axis-aligned box reported by the renderer, in page coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Edges are inclusive.
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x && x <= self.x + self.width && y >= self.y && y <= self.y + self.height
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attribute {
    pub name: SmolStr,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Element {
    /// Lower-case tag name.
    pub name: SmolStr,
    pub attrs: Vec<Attribute>,
    pub rect: Option<Rect>,
}

impl Element {
    pub fn new(name: &str) -> Self {
        Self {
            name: SmolStr::new(name.to_ascii_lowercase()),
            attrs: Vec::new(),
            rect: None,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
            .map(|a| a.value.as_str())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    Document,
    Element(Element),
    Text(String),
    Comment(String),
}

#[derive(Clone, Debug)]
pub struct Node {
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) kind: NodeKind,
}

impl Node {
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}
