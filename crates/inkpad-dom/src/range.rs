//! Boundary points, ranges, and the range operations editing commands need.
//!
//! A [`Position`] offset counts characters inside text nodes and children
//! inside everything else, like a DOM boundary point.

use std::cmp::Ordering;

use crate::document::Document;
use crate::error::DomError;
use crate::markup::{escape_text, is_void_element, write_start_tag};
use crate::node::NodeId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Position {
    pub node: NodeId,
    pub offset: usize,
}

impl Position {
    pub fn new(node: NodeId, offset: usize) -> Self {
        Self { node, offset }
    }
}

/// A selection-like range. `anchor` is where it started, `focus` where it
/// ended; either may come first in document order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DomRange {
    pub anchor: Position,
    pub focus: Position,
}

impl DomRange {
    pub fn new(anchor: Position, focus: Position) -> Self {
        Self { anchor, focus }
    }

    pub fn collapsed_at(pos: Position) -> Self {
        Self::new(pos, pos)
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }
}

/// Char index to byte index, clamped to the end.
pub(crate) fn byte_offset(s: &str, chars: usize) -> usize {
    s.char_indices().nth(chars).map_or(s.len(), |(b, _)| b)
}

pub(crate) fn char_slice(s: &str, start: usize, end: usize) -> &str {
    let b0 = byte_offset(s, start);
    let b1 = byte_offset(s, end.max(start));
    &s[b0..b1]
}

impl Document {
    fn order_key(&self, pos: Position) -> Vec<usize> {
        let mut key = self.path(pos.node);
        key.push(pos.offset);
        key
    }

    /// Document order of two boundary points.
    pub fn compare_positions(&self, a: Position, b: Position) -> Ordering {
        if a.node == b.node {
            return a.offset.cmp(&b.offset);
        }
        self.order_key(a).cmp(&self.order_key(b))
    }

    pub fn range_start(&self, range: &DomRange) -> Position {
        match self.compare_positions(range.anchor, range.focus) {
            Ordering::Greater => range.focus,
            _ => range.anchor,
        }
    }

    pub fn range_end(&self, range: &DomRange) -> Position {
        match self.compare_positions(range.anchor, range.focus) {
            Ordering::Greater => range.anchor,
            _ => range.focus,
        }
    }

    /// Characters of body text that come before `pos`.
    pub fn text_offset_of(&self, pos: Position) -> usize {
        let mut total = 0;
        for t in self.text_nodes(self.body()) {
            if t == pos.node {
                return total + pos.offset.min(self.node_length(t));
            }
            let len = self.node_length(t);
            if self.compare_positions(Position::new(t, len), pos) == Ordering::Greater {
                break;
            }
            total += len;
        }
        total
    }

    /// The text position `offset` characters into the body, if any text node
    /// covers it. A boundary between two text nodes resolves to the end of the
    /// first one.
    pub fn position_at_text_offset(&self, offset: usize) -> Option<Position> {
        let mut acc = 0;
        for t in self.text_nodes(self.body()) {
            let len = self.node_length(t);
            if offset <= acc + len {
                return Some(Position::new(t, offset - acc));
            }
            acc += len;
        }
        None
    }

    /// Body text covered by the range.
    pub fn range_text(&self, range: &DomRange) -> String {
        let s = self.text_offset_of(self.range_start(range));
        let e = self.text_offset_of(self.range_end(range));
        let body = self.text_content(self.body());
        char_slice(&body, s, e).to_string()
    }

    /// Split a text node at a character offset. The original keeps the head,
    /// a new sibling right after it gets the tail.
    pub fn split_text(&mut self, id: NodeId, offset: usize) -> Result<NodeId, DomError> {
        let text = self
            .text(id)
            .filter(|_| self.is_text(id))
            .ok_or(DomError::NotCharacterData(id))?
            .to_string();
        if offset > text.chars().count() {
            return Err(DomError::OffsetOutOfBounds { node: id, offset });
        }
        let at = byte_offset(&text, offset);
        let tail = self.create_text(&text[at..]);
        self.set_text(id, &text[..at])?;
        if let Some(parent) = self.parent(id) {
            let next = self.next_sibling(id);
            self.insert_before(parent, tail, next)?;
        }
        Ok(tail)
    }

    fn boundary_before(&self, node: NodeId) -> Option<Position> {
        Some(Position::new(self.parent(node)?, self.index_in_parent(node)?))
    }

    fn boundary_after(&self, node: NodeId) -> Option<Position> {
        Some(Position::new(self.parent(node)?, self.index_in_parent(node)? + 1))
    }

    /// Turn a boundary inside a text node into an element boundary, splitting
    /// the node when the offset falls strictly inside it.
    fn lift_out_of_text(&mut self, pos: Position) -> Result<Position, DomError> {
        if !self.is_text(pos.node) {
            return Ok(pos);
        }
        let len = self.node_length(pos.node);
        let parent = self.parent(pos.node).ok_or(DomError::NoParent(pos.node))?;
        let idx = self
            .index_in_parent(pos.node)
            .ok_or(DomError::NoParent(pos.node))?;
        if pos.offset == 0 {
            return Ok(Position::new(parent, idx));
        }
        if pos.offset < len {
            self.split_text(pos.node, pos.offset)?;
        }
        Ok(Position::new(parent, idx + 1))
    }

    /// Split text at both ends so the range starts and ends on element
    /// boundaries. Returns the new `(start, end)`.
    pub fn isolate_range(&mut self, range: &DomRange) -> Result<(Position, Position), DomError> {
        let start = self.range_start(range);
        let end = self.range_end(range);
        let end = self.lift_out_of_text(end)?;

        let start_parent = self.parent(start.node);
        let start_idx = self.index_in_parent(start.node);
        let needs_split = self.is_text(start.node)
            && start.offset > 0
            && start.offset < self.node_length(start.node);
        let start = self.lift_out_of_text(start)?;

        let mut end = end;
        if needs_split {
            if let (Some(p), Some(i)) = (start_parent, start_idx) {
                if end.node == p && end.offset > i {
                    end.offset += 1;
                }
            }
        }
        Ok((start, end))
    }

    fn is_inside(&self, node: NodeId, start: Position, end: Position) -> bool {
        match (self.boundary_before(node), self.boundary_after(node)) {
            (Some(b), Some(a)) => {
                self.compare_positions(b, start) != Ordering::Less
                    && self.compare_positions(a, end) != Ordering::Greater
            }
            _ => false,
        }
    }

    fn intersects(&self, node: NodeId, start: Position, end: Position) -> bool {
        match (self.boundary_before(node), self.boundary_after(node)) {
            (Some(b), Some(a)) => {
                self.compare_positions(a, start) == Ordering::Greater
                    && self.compare_positions(b, end) == Ordering::Less
            }
            _ => false,
        }
    }

    pub fn common_ancestor(&self, a: NodeId, b: NodeId) -> NodeId {
        if self.contains(a, b) {
            return a;
        }
        self.ancestors(a)
            .find(|&anc| self.contains(anc, b))
            .unwrap_or(self.root())
    }

    /// Outermost nodes lying wholly between two boundaries, in document order.
    pub fn contained_nodes(&self, start: Position, end: Position) -> Vec<NodeId> {
        let mut out = Vec::new();
        let scope = self.common_ancestor(start.node, end.node);
        self.collect_contained(scope, start, end, &mut out);
        out
    }

    fn collect_contained(&self, node: NodeId, start: Position, end: Position, out: &mut Vec<NodeId>) {
        for &child in self.children(node) {
            if self.is_inside(child, start, end) {
                out.push(child);
            } else if self.intersects(child, start, end) {
                self.collect_contained(child, start, end, out);
            }
        }
    }

    /// Remove everything the range covers. Returns the collapsed start.
    pub fn delete_range_contents(&mut self, range: &DomRange) -> Result<Position, DomError> {
        let start = self.range_start(range);
        let end = self.range_end(range);
        if start == end {
            return Ok(start);
        }
        if start.node == end.node && self.is_text(start.node) {
            let text = self.text(start.node).unwrap_or_default().to_string();
            let head = char_slice(&text, 0, start.offset);
            let tail = char_slice(&text, end.offset, usize::MAX);
            self.set_text(start.node, format!("{head}{tail}"))?;
            return Ok(start);
        }
        let (s, e) = self.isolate_range(range)?;
        for n in self.contained_nodes(s, e) {
            self.remove(n);
        }
        // Elements that only held the tail of the range are now empty.
        let scope = self.common_ancestor(s.node, e.node);
        let mut cur = e.node;
        while cur != scope && !self.contains(cur, s.node) {
            let Some(parent) = self.parent(cur) else {
                break;
            };
            let void = self.tag_name(cur).is_some_and(is_void_element);
            if self.is_element(cur) && !void && self.children(cur).is_empty() {
                self.remove(cur);
            }
            cur = parent;
        }
        Ok(s)
    }

    /// Serialize what the range covers. Partially covered elements are
    /// emitted as shallow copies around their covered content.
    pub fn range_html(&self, range: &DomRange) -> String {
        let start = self.range_start(range);
        let end = self.range_end(range);
        let mut out = String::new();
        if start == end {
            return out;
        }
        let scope = self.common_ancestor(start.node, end.node);
        if self.is_text(scope) {
            let text = self.text(scope).unwrap_or_default();
            escape_text(char_slice(text, start.offset, end.offset), &mut out);
            return out;
        }
        self.write_range_children(scope, start, end, &mut out);
        out
    }

    fn write_range_children(&self, node: NodeId, start: Position, end: Position, out: &mut String) {
        for &child in self.children(node) {
            if self.is_inside(child, start, end) {
                out.push_str(&self.outer_html(child));
            } else if self.intersects(child, start, end) {
                if self.is_text(child) {
                    let text = self.text(child).unwrap_or_default();
                    let s = if start.node == child { start.offset } else { 0 };
                    let e = if end.node == child {
                        end.offset
                    } else {
                        self.node_length(child)
                    };
                    escape_text(char_slice(text, s, e), out);
                } else if let Some(el) = self.element(child) {
                    write_start_tag(&el.name, &el.attrs, out);
                    self.write_range_children(child, start, end, out);
                    out.push_str("</");
                    out.push_str(&el.name);
                    out.push('>');
                }
            }
        }
    }

    /// Insert nodes at a boundary, splitting a text node if needed. Returns the
    /// boundary just after the inserted content.
    pub fn insert_nodes_at(&mut self, pos: Position, nodes: &[NodeId]) -> Result<Position, DomError> {
        let at = self.lift_out_of_text(pos)?;
        let mut idx = at.offset;
        for &n in nodes {
            self.insert_at(at.node, idx, n)?;
            idx += 1;
        }
        Ok(Position::new(at.node, idx))
    }

    pub fn insert_html_at(&mut self, pos: Position, html: &str) -> Result<(Vec<NodeId>, Position), DomError> {
        let nodes = self.parse_fragment(html);
        let after = self.insert_nodes_at(pos, &nodes)?;
        Ok((nodes, after))
    }

    /// Insert plain text. Inside a text node the text is spliced in place.
    pub fn insert_text_at(&mut self, pos: Position, text: &str) -> Result<Position, DomError> {
        if self.is_text(pos.node) {
            let current = self.text(pos.node).unwrap_or_default().to_string();
            let at = byte_offset(&current, pos.offset);
            let mut next = String::with_capacity(current.len() + text.len());
            next.push_str(&current[..at]);
            next.push_str(text);
            next.push_str(&current[at..]);
            self.set_text(pos.node, next)?;
            return Ok(Position::new(pos.node, pos.offset + text.chars().count()));
        }
        let node = self.create_text(text);
        self.insert_at(pos.node, pos.offset, node)?;
        Ok(Position::new(node, text.chars().count()))
    }

    /// Merge adjacent text nodes and drop empty ones under `id`.
    pub fn normalize(&mut self, id: NodeId) -> Result<(), DomError> {
        let children = self.children(id).to_vec();
        let mut prev_text: Option<NodeId> = None;
        for child in children {
            if self.is_text(child) {
                let text = self.text(child).unwrap_or_default().to_string();
                if text.is_empty() {
                    self.remove(child);
                    continue;
                }
                if let Some(prev) = prev_text {
                    let merged = format!("{}{}", self.text(prev).unwrap_or_default(), text);
                    self.set_text(prev, merged)?;
                    self.remove(child);
                    continue;
                }
                prev_text = Some(child);
            } else {
                prev_text = None;
                if self.is_element(child) {
                    self.normalize(child)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_with(html: &str) -> Document {
        Document::from_html(html)
    }

    fn text_at(doc: &Document, nth: usize) -> NodeId {
        doc.text_nodes(doc.body())[nth]
    }

    #[test]
    fn test_compare_positions_in_document_order() {
        let doc = doc_with("<p>ab</p><p>cd</p>");
        let a = text_at(&doc, 0);
        let c = text_at(&doc, 1);
        let p2 = doc.parent(c).unwrap();
        assert_eq!(doc.compare_positions(Position::new(a, 2), Position::new(c, 0)), Ordering::Less);
        assert_eq!(doc.compare_positions(Position::new(p2, 0), Position::new(c, 0)), Ordering::Less);
        assert_eq!(doc.compare_positions(Position::new(p2, 1), Position::new(c, 2)), Ordering::Greater);
    }

    #[test]
    fn test_text_offsets_round_trip() {
        let doc = doc_with("<p>ab<b>cd</b></p><p>ef</p>");
        let pos = doc.position_at_text_offset(3).unwrap();
        assert_eq!(doc.text(pos.node), Some("cd"));
        assert_eq!(pos.offset, 1);
        assert_eq!(doc.text_offset_of(pos), 3);
        // Boundary resolves to the end of the earlier node.
        let edge = doc.position_at_text_offset(2).unwrap();
        assert_eq!(doc.text(edge.node), Some("ab"));
        assert!(doc.position_at_text_offset(7).is_none());
        let p2 = doc.children(doc.body())[1];
        assert_eq!(doc.text_offset_of(Position::new(p2, 0)), 4);
    }

    #[test]
    fn test_range_text_spans_elements() {
        let doc = doc_with("<p>hello <i>big</i> world</p>");
        let range = DomRange::new(
            doc.position_at_text_offset(10).unwrap(),
            doc.position_at_text_offset(3).unwrap(),
        );
        assert_eq!(doc.range_text(&range), "lo big ");
    }

    #[test]
    fn test_isolate_within_one_text_node() {
        let mut doc = doc_with("<p>abcdef</p>");
        let t = text_at(&doc, 0);
        let p = doc.parent(t).unwrap();
        let range = DomRange::new(Position::new(t, 2), Position::new(t, 4));
        let (s, e) = doc.isolate_range(&range).unwrap();
        assert_eq!((s, e), (Position::new(p, 1), Position::new(p, 2)));
        let mid = doc.contained_nodes(s, e);
        assert_eq!(mid.len(), 1);
        assert_eq!(doc.text(mid[0]), Some("cd"));
        assert_eq!(doc.inner_html(p), "abcdef");
    }

    #[test]
    fn test_delete_across_paragraphs() {
        let mut doc = doc_with("<p>abc</p><p>def</p>");
        let range = DomRange::new(
            Position::new(text_at(&doc, 0), 1),
            Position::new(text_at(&doc, 1), 2),
        );
        let at = doc.delete_range_contents(&range).unwrap();
        assert_eq!(doc.inner_html(doc.body()), "<p>a</p><p>f</p>");
        assert_eq!(doc.text_offset_of(at), 1);
    }

    #[test]
    fn test_delete_drops_emptied_tail_element() {
        let mut doc = doc_with("<p>ab<b>cd</b>ef</p>");
        let range = DomRange::new(
            Position::new(text_at(&doc, 0), 1),
            Position::new(text_at(&doc, 1), 2),
        );
        let at = doc.delete_range_contents(&range).unwrap();
        assert_eq!(doc.inner_html(doc.body()), "<p>aef</p>");
        assert_eq!(doc.text_offset_of(at), 1);
    }

    #[test]
    fn test_range_html_clones_partial_ancestors() {
        let doc = doc_with("<p>ab<b>cd</b>ef</p>");
        let range = DomRange::new(
            Position::new(text_at(&doc, 0), 1),
            Position::new(text_at(&doc, 1), 1),
        );
        assert_eq!(doc.range_html(&range), "b<b>c</b>");
    }

    #[test]
    fn test_insert_html_splits_text() {
        let mut doc = doc_with("<p>abcd</p>");
        let t = text_at(&doc, 0);
        let (nodes, after) = doc.insert_html_at(Position::new(t, 2), "<hr>").unwrap();
        assert_eq!(nodes.len(), 1);
        let p = doc.parent(t).unwrap();
        assert_eq!(doc.inner_html(p), "ab<hr>cd");
        assert_eq!(after, Position::new(p, 2));
    }

    #[test]
    fn test_normalize_merges_text() {
        let mut doc = doc_with("<p>ab</p>");
        let t = text_at(&doc, 0);
        doc.split_text(t, 1).unwrap();
        let p = doc.parent(t).unwrap();
        assert_eq!(doc.children(p).len(), 2);
        doc.normalize(p).unwrap();
        assert_eq!(doc.children(p), &[t]);
        assert_eq!(doc.text(t), Some("ab"));
    }
}
