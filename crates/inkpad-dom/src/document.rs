//! Arena-backed document tree.
//!
//! All nodes live in one `Vec` and are addressed by [`NodeId`]. The tree is
//! rooted at a document node with a single `body` element. Mutating methods
//! append [`MutationRecord`]s while recording is enabled and the mutated node
//! is connected, mirroring what a page's mutation observer would be handed.
//!
//! Removing a node only detaches it, so undo history can put the very same
//! node back. [`Document::collect_garbage`] frees detached nodes nobody holds
//! any more and later allocations reuse their slots.

use smol_str::SmolStr;

use crate::error::DomError;
use crate::mutation::MutationRecord;
use crate::node::{Attribute, Element, Node, NodeId, NodeKind, Rect};
use crate::range::{DomRange, Position};

#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
    body: NodeId,
    selection: Option<DomRange>,
    recording: bool,
    records: Vec<MutationRecord>,
    /// Freed slots, reused by `alloc`.
    free: Vec<NodeId>,
    allocated_since_gc: usize,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            root: NodeId(0),
            body: NodeId(0),
            selection: None,
            recording: false,
            records: Vec::new(),
            free: Vec::new(),
            allocated_since_gc: 0,
        };
        let root = doc.alloc(NodeKind::Document);
        let body = doc.alloc(NodeKind::Element(Element::new("body")));
        doc.node_mut(root).children.push(body);
        doc.node_mut(body).parent = Some(root);
        doc.root = root;
        doc.body = body;
        doc
    }

    /// Build a document whose body holds the given markup.
    pub fn from_html(html: &str) -> Self {
        let mut doc = Self::new();
        let nodes = doc.parse_fragment(html);
        let body = doc.body;
        doc.node_mut(body).children = nodes.clone();
        for n in nodes {
            doc.node_mut(n).parent = Some(body);
        }
        doc
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        self.allocated_since_gc += 1;
        let node = Node {
            parent: None,
            children: Vec::new(),
            kind,
        };
        if let Some(id) = self.free.pop() {
            self.nodes[id.index()] = node;
            return id;
        }
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// Slots in the arena, live or not.
    pub fn arena_len(&self) -> usize {
        self.nodes.len()
    }

    /// Slots waiting to be reused.
    pub fn free_len(&self) -> usize {
        self.free.len()
    }

    /// Nodes created since the last [`collect_garbage`](Self::collect_garbage).
    pub fn allocated_since_gc(&self) -> usize {
        self.allocated_since_gc
    }

    /// Free every node that is neither in the tree nor inside the subtree of
    /// one of `roots` or of the selection. Freed ids must not be used again by
    /// the caller. Returns how many nodes were newly freed.
    ///
    /// Does nothing while mutation records are waiting to be taken, since
    /// those refer to nodes by id too.
    pub fn collect_garbage(&mut self, roots: impl IntoIterator<Item = NodeId>) -> usize {
        if !self.records.is_empty() {
            tracing::debug!(target: "inkpad::dom", pending = self.records.len(), "skipping collection with records pending");
            return 0;
        }
        let mut free = vec![false; self.nodes.len()];
        for id in &self.free {
            free[id.index()] = true;
        }
        let mut live = vec![false; self.nodes.len()];
        let mut stack = vec![self.root];
        stack.extend(roots);
        if let Some(range) = &self.selection {
            stack.extend([range.anchor.node, range.focus.node]);
        }
        while let Some(id) = stack.pop() {
            // Stale ids naming freed slots do not bring them back.
            if id.index() >= live.len() || free[id.index()] || live[id.index()] {
                continue;
            }
            live[id.index()] = true;
            stack.extend(self.nodes[id.index()].children.iter().copied());
        }

        let before = self.free.len();
        self.free.clear();
        for (index, &alive) in live.iter().enumerate() {
            if !alive {
                let id = NodeId(index as u32);
                self.nodes[index] = Node {
                    parent: None,
                    children: Vec::new(),
                    kind: NodeKind::Text(String::new()),
                };
                self.free.push(id);
            }
        }
        // A kept subtree cut loose from a freed parent becomes its own root.
        for index in 0..self.nodes.len() {
            if let Some(parent) = self.nodes[index].parent {
                if !live[parent.index()] {
                    self.nodes[index].parent = None;
                }
            }
        }
        self.allocated_since_gc = 0;
        let freed = self.free.len().saturating_sub(before);
        tracing::debug!(target: "inkpad::dom", freed, free = self.free.len(), arena = self.nodes.len(), "collected detached nodes");
        freed
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.node(id).kind
    }

    // ---- creation ------------------------------------------------------

    pub fn create_element(&mut self, name: &str) -> NodeId {
        self.alloc(NodeKind::Element(Element::new(name)))
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::Text(text.into()))
    }

    pub fn create_comment(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::Comment(text.into()))
    }

    /// Copy a node. Deep copies bring their subtree along; copies are detached.
    pub fn clone_node(&mut self, id: NodeId, deep: bool) -> NodeId {
        let kind = match self.kind(id) {
            NodeKind::Element(el) => NodeKind::Element(Element {
                name: el.name.clone(),
                attrs: el.attrs.clone(),
                rect: None,
            }),
            other => other.clone(),
        };
        let copy = self.alloc(kind);
        if deep {
            let children = self.node(id).children.clone();
            for child in children {
                let c = self.clone_node(child, true);
                self.node_mut(copy).children.push(c);
                self.node_mut(c).parent = Some(copy);
            }
        }
        copy
    }

    // ---- queries -------------------------------------------------------

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).children.first().copied()
    }

    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).children.last().copied()
    }

    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|&c| c == id)
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let idx = self.index_in_parent(id)?;
        self.children(parent).get(idx + 1).copied()
    }

    pub fn previous_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let idx = self.index_in_parent(id)?;
        idx.checked_sub(1)
            .and_then(|i| self.children(parent).get(i).copied())
    }

    /// Ancestors from the nearest parent up to the document node.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |&n| self.parent(n))
    }

    pub fn is_connected(&self, id: NodeId) -> bool {
        id == self.root || self.ancestors(id).any(|a| a == self.root)
    }

    /// Inclusive containment.
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        node == ancestor || self.ancestors(node).any(|a| a == ancestor)
    }

    /// Pre-order descendants, not including `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(n) = stack.pop() {
            out.push(n);
            stack.extend(self.children(n).iter().rev().copied());
        }
        out
    }

    pub fn text_nodes(&self, id: NodeId) -> Vec<NodeId> {
        if self.is_text(id) {
            return vec![id];
        }
        self.descendants(id)
            .into_iter()
            .filter(|&n| self.is_text(n))
            .collect()
    }

    /// Descendants of `scope` matching `pred`, in document order.
    pub fn find_all(&self, scope: NodeId, pred: impl Fn(&Document, NodeId) -> bool) -> Vec<NodeId> {
        self.descendants(scope)
            .into_iter()
            .filter(|&n| pred(self, n))
            .collect()
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match self.kind(id) {
            NodeKind::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.element(id).is_some()
    }

    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|el| el.name.as_str())
    }

    /// Case-insensitive tag check.
    pub fn has_tag(&self, id: NodeId, name: &str) -> bool {
        self.tag_name(id)
            .is_some_and(|n| n.eq_ignore_ascii_case(name))
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::Text(_))
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match self.kind(id) {
            NodeKind::Text(t) | NodeKind::Comment(t) => Some(t),
            _ => None,
        }
    }

    /// Characters for text nodes, children for everything else.
    pub fn node_length(&self, id: NodeId) -> usize {
        match self.kind(id) {
            NodeKind::Text(t) | NodeKind::Comment(t) => t.chars().count(),
            _ => self.children(id).len(),
        }
    }

    pub fn text_content(&self, id: NodeId) -> String {
        match self.kind(id) {
            NodeKind::Text(t) => t.clone(),
            NodeKind::Comment(_) => String::new(),
            _ => {
                let mut out = String::new();
                for n in self.text_nodes(id) {
                    if let Some(t) = self.text(n) {
                        out.push_str(t);
                    }
                }
                out
            }
        }
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id).and_then(|el| el.attr(name))
    }

    pub fn has_attr(&self, id: NodeId, name: &str) -> bool {
        self.attr(id, name).is_some()
    }

    pub fn attributes(&self, id: NodeId) -> &[Attribute] {
        self.element(id).map(|el| el.attrs.as_slice()).unwrap_or(&[])
    }

    pub fn rect(&self, id: NodeId) -> Option<Rect> {
        self.element(id).and_then(|el| el.rect)
    }

    /// Child-index path from the document node.
    pub fn path(&self, id: NodeId) -> Vec<usize> {
        let mut path = Vec::new();
        let mut cur = id;
        while let Some(idx) = self.index_in_parent(cur) {
            path.push(idx);
            match self.parent(cur) {
                Some(p) => cur = p,
                None => break,
            }
        }
        path.reverse();
        path
    }

    /// Follow child indices down from `from`.
    pub fn node_at_path(&self, from: NodeId, path: &[usize]) -> Option<NodeId> {
        path.iter()
            .try_fold(from, |cur, &idx| self.children(cur).get(idx).copied())
    }

    /// Connected elements whose box contains the point, topmost first.
    ///
    /// Later elements in document order paint over earlier ones.
    pub fn elements_from_point(&self, x: f32, y: f32) -> Vec<NodeId> {
        let mut hits: Vec<NodeId> = self
            .descendants(self.body)
            .into_iter()
            .filter(|&n| self.rect(n).is_some_and(|r| r.contains(x, y)))
            .collect();
        if self.rect(self.body).is_some_and(|r| r.contains(x, y)) {
            hits.insert(0, self.body);
        }
        hits.reverse();
        hits
    }

    // ---- selection -----------------------------------------------------

    /// The live selection, if both ends still point into the document.
    ///
    /// Offsets that ran past the end of a shrunken node are clamped.
    pub fn selection(&self) -> Option<DomRange> {
        let sel = self.selection?;
        let fix = |p: Position| -> Option<Position> {
            if !self.is_connected(p.node) {
                return None;
            }
            Some(Position::new(p.node, p.offset.min(self.node_length(p.node))))
        };
        Some(DomRange::new(fix(sel.anchor)?, fix(sel.focus)?))
    }

    pub fn set_selection(&mut self, selection: Option<DomRange>) {
        self.selection = selection;
    }

    // ---- recording -----------------------------------------------------

    pub fn set_recording(&mut self, recording: bool) {
        self.recording = recording;
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn has_pending_records(&self) -> bool {
        !self.records.is_empty()
    }

    /// Hand over every record accumulated since the last call.
    pub fn take_records(&mut self) -> Vec<MutationRecord> {
        std::mem::take(&mut self.records)
    }

    fn should_record(&self, target: NodeId) -> bool {
        self.recording && self.is_connected(target)
    }

    fn begin_child_list(&self, parent: NodeId) -> Option<Vec<NodeId>> {
        self.should_record(parent)
            .then(|| self.node(parent).children.clone())
    }

    fn finish_child_list(&mut self, parent: NodeId, old: Option<Vec<NodeId>>) {
        if let Some(old_children) = old {
            self.records.push(MutationRecord::ChildList {
                target: parent,
                old_children,
            });
        }
    }

    // ---- structural mutation -------------------------------------------

    fn detach(&mut self, child: NodeId) {
        if let Some(parent) = self.node(child).parent {
            let old = self.begin_child_list(parent);
            self.node_mut(parent).children.retain(|&c| c != child);
            self.node_mut(child).parent = None;
            self.finish_child_list(parent, old);
        }
    }

    fn check_insertable(&self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        let parent_ok = matches!(
            self.kind(parent),
            NodeKind::Element(_) | NodeKind::Document
        );
        if !parent_ok || child == self.root || self.contains(child, parent) {
            return Err(DomError::HierarchyRequest { parent, child });
        }
        Ok(())
    }

    /// Insert `child` before `reference`, or at the end when `reference` is `None`.
    /// A child that already has a parent is moved.
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> Result<(), DomError> {
        self.check_insertable(parent, child)?;
        if let Some(r) = reference {
            if self.parent(r) != Some(parent) {
                return Err(DomError::NotAChild { parent, child: r });
            }
        }
        let reference = if reference == Some(child) {
            self.next_sibling(child)
        } else {
            reference
        };
        self.detach(child);
        let idx = match reference {
            Some(r) => self
                .children(parent)
                .iter()
                .position(|&c| c == r)
                .unwrap_or(self.children(parent).len()),
            None => self.children(parent).len(),
        };
        let old = self.begin_child_list(parent);
        self.node_mut(parent).children.insert(idx, child);
        self.node_mut(child).parent = Some(parent);
        self.finish_child_list(parent, old);
        Ok(())
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.insert_before(parent, child, None)
    }

    /// Insert at a child index, clamped to the end.
    pub fn insert_at(&mut self, parent: NodeId, index: usize, child: NodeId) -> Result<(), DomError> {
        let reference = self.children(parent).get(index).copied();
        self.insert_before(parent, child, reference)
    }

    /// Detach a node. The handle stays valid and may be reinserted.
    pub fn remove(&mut self, id: NodeId) {
        self.detach(id);
    }

    /// Put `replacements` where `old` was and detach `old`.
    pub fn replace_with(&mut self, old: NodeId, replacements: &[NodeId]) -> Result<(), DomError> {
        let parent = self.parent(old).ok_or(DomError::NoParent(old))?;
        for &n in replacements {
            if n != old {
                self.insert_before(parent, n, Some(old))?;
            }
        }
        if !replacements.contains(&old) {
            self.detach(old);
        }
        Ok(())
    }

    /// Replace an element by its own children.
    pub fn unwrap_node(&mut self, id: NodeId) -> Result<Vec<NodeId>, DomError> {
        let children = self.children(id).to_vec();
        self.replace_with(id, &children)?;
        Ok(children)
    }

    /// Move `nodes` (siblings, in order) into a new `name` element placed where
    /// the first of them was.
    pub fn wrap_nodes(&mut self, nodes: &[NodeId], name: &str) -> Result<NodeId, DomError> {
        let first = *nodes.first().ok_or(DomError::EmptyNodeList)?;
        let parent = self.parent(first).ok_or(DomError::NoParent(first))?;
        let wrapper = self.create_element(name);
        self.insert_before(parent, wrapper, Some(first))?;
        for &n in nodes {
            self.append_child(wrapper, n)?;
        }
        Ok(wrapper)
    }

    /// Make `list` the exact child list of `parent`, moving nodes out of their
    /// current parents as needed and detaching children that are not listed.
    pub fn set_children(&mut self, parent: NodeId, list: &[NodeId]) -> Result<(), DomError> {
        for &n in list {
            self.check_insertable(parent, n)?;
        }
        let old = self.begin_child_list(parent);
        let current = self.node(parent).children.clone();
        for c in current {
            if !list.contains(&c) {
                self.node_mut(c).parent = None;
            }
        }
        self.node_mut(parent).children.clear();
        for &n in list {
            if self.parent(n).is_some_and(|p| p != parent) {
                self.detach(n);
            }
        }
        self.node_mut(parent).children = list.to_vec();
        for &n in list {
            self.node_mut(n).parent = Some(parent);
        }
        self.finish_child_list(parent, old);
        Ok(())
    }

    pub fn remove_all_children(&mut self, parent: NodeId) {
        if self.children(parent).is_empty() {
            return;
        }
        let old = self.begin_child_list(parent);
        let current = std::mem::take(&mut self.node_mut(parent).children);
        for c in current {
            self.node_mut(c).parent = None;
        }
        self.finish_child_list(parent, old);
    }

    // ---- character data and attributes ---------------------------------

    pub fn set_text(&mut self, id: NodeId, text: impl Into<String>) -> Result<(), DomError> {
        let text = text.into();
        let record = self.should_record(id);
        let slot = match &mut self.node_mut(id).kind {
            NodeKind::Text(t) | NodeKind::Comment(t) => t,
            _ => return Err(DomError::NotCharacterData(id)),
        };
        let old_value = std::mem::replace(slot, text.clone());
        if record {
            self.records.push(MutationRecord::CharacterData {
                target: id,
                old_value,
                new_value: text,
            });
        }
        Ok(())
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: impl Into<String>) -> Result<(), DomError> {
        let value = value.into();
        let record = self.should_record(id);
        let el = match &mut self.node_mut(id).kind {
            NodeKind::Element(el) => el,
            _ => return Err(DomError::NotAnElement(id)),
        };
        let name = SmolStr::new(name.to_ascii_lowercase());
        let old_value = match el.attrs.iter_mut().find(|a| a.name == name) {
            Some(a) => Some(std::mem::replace(&mut a.value, value.clone())),
            None => {
                el.attrs.push(Attribute {
                    name: name.clone(),
                    value: value.clone(),
                });
                None
            }
        };
        if record {
            self.records.push(MutationRecord::Attribute {
                target: id,
                name,
                old_value,
                new_value: Some(value),
            });
        }
        Ok(())
    }

    /// Remove an attribute, returning its previous value.
    pub fn remove_attr(&mut self, id: NodeId, name: &str) -> Result<Option<String>, DomError> {
        let record = self.should_record(id);
        let el = match &mut self.node_mut(id).kind {
            NodeKind::Element(el) => el,
            _ => return Err(DomError::NotAnElement(id)),
        };
        let Some(pos) = el.attrs.iter().position(|a| a.name.eq_ignore_ascii_case(name)) else {
            return Ok(None);
        };
        let removed = el.attrs.remove(pos);
        if record {
            self.records.push(MutationRecord::Attribute {
                target: id,
                name: removed.name.clone(),
                old_value: Some(removed.value.clone()),
                new_value: None,
            });
        }
        Ok(Some(removed.value))
    }

    /// Set or clear an attribute from an optional value.
    pub fn restore_attr(&mut self, id: NodeId, name: &str, value: Option<&str>) -> Result<(), DomError> {
        match value {
            Some(v) => self.set_attr(id, name, v),
            None => self.remove_attr(id, name).map(|_| ()),
        }
    }

    /// Layout boxes are renderer state, never recorded.
    pub fn set_rect(&mut self, id: NodeId, rect: Option<Rect>) -> Result<(), DomError> {
        match &mut self.node_mut(id).kind {
            NodeKind::Element(el) => {
                el.rect = rect;
                Ok(())
            }
            _ => Err(DomError::NotAnElement(id)),
        }
    }

    pub fn clear_rects(&mut self) {
        for node in &mut self.nodes {
            if let NodeKind::Element(el) = &mut node.kind {
                el.rect = None;
            }
        }
    }
}
