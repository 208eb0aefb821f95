//! Editing commands the host can invoke.
//!
//! `EditorCommand` is the wire-level description of an operation. The
//! submodules hold the document transformations themselves, as plain
//! functions over a [`Document`]; the session decides which ledger a command
//! is recorded in and runs it inside a transaction.

pub mod encryption;
pub mod find;
pub mod formatting;
pub mod hyperlink;
pub mod image;
pub mod resource;
pub mod spelling;
pub mod table;
pub mod todo;

use std::cmp::Ordering;

use inkpad_dom::{Document, DomRange, NodeId, Position};
use serde::{Deserialize, Serialize};

use crate::error::{EditorError, Result};

pub use table::TableWidth;

/// Operations the host can ask for by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum EditorCommand {
    // === Inline formatting ===
    Bold,
    Italic,
    Underline,
    Strikethrough,
    JustifyLeft,
    JustifyCenter,
    JustifyRight,
    JustifyFull,
    InsertOrderedList,
    InsertUnorderedList,
    InsertHorizontalRule,
    FontName {
        name: String,
    },
    FontSize {
        size: String,
    },
    ForeColor {
        color: String,
    },
    HiliteColor {
        color: String,
    },

    // === Content ===
    InsertHtml {
        html: String,
    },
    InsertText {
        text: String,
    },
    Delete,
    Cut,
    Copy,
    Paste {
        html: String,
    },
    SelectAll,

    // === Hyperlinks ===
    SetHyperlink {
        id: u64,
        href: String,
        #[serde(default)]
        text: Option<String>,
    },
    ReplaceHyperlink {
        id: u64,
        href: String,
        #[serde(default)]
        text: Option<String>,
    },
    RemoveHyperlink {
        id: u64,
        #[serde(default)]
        completely: bool,
    },

    // === Encryption ===
    #[serde(rename_all = "camelCase")]
    Encrypt {
        cipher: String,
        key_length: u32,
        encrypted_text: String,
        #[serde(default)]
        hint: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Decrypt {
        id: u64,
        decrypted_html: String,
    },
    HideDecryptedText {
        id: u64,
    },
    DecryptPermanently {
        id: u64,
    },

    // === Resources ===
    InsertResource {
        html: String,
    },
    RemoveResource {
        hash: String,
    },

    // === Tables ===
    InsertTable {
        rows: usize,
        columns: usize,
        width: TableWidth,
    },
    InsertTableRow,
    InsertTableColumn,
    RemoveTableRow,
    RemoveTableColumn,
    #[serde(rename_all = "camelCase")]
    ResizeTableColumn {
        table_index: usize,
        column: usize,
        width: f64,
    },

    // === Images ===
    ResizeImage {
        hash: String,
        width: f64,
        height: f64,
    },

    // === Find and replace ===
    #[serde(rename_all = "camelCase")]
    Find {
        text: String,
        #[serde(default)]
        match_case: bool,
    },
    #[serde(rename_all = "camelCase")]
    Replace {
        find: String,
        replacement: String,
        #[serde(default)]
        match_case: bool,
    },
    #[serde(rename_all = "camelCase")]
    ReplaceAll {
        find: String,
        replacement: String,
        #[serde(default)]
        match_case: bool,
    },

    // === Spelling ===
    ApplySpellCheck {
        words: Vec<String>,
    },
    RemoveSpellCheck,
    CorrectSpelling {
        replacement: String,
    },
}

impl EditorCommand {
    pub fn name(&self) -> &'static str {
        match self {
            EditorCommand::Bold => "bold",
            EditorCommand::Italic => "italic",
            EditorCommand::Underline => "underline",
            EditorCommand::Strikethrough => "strikethrough",
            EditorCommand::JustifyLeft => "justifyLeft",
            EditorCommand::JustifyCenter => "justifyCenter",
            EditorCommand::JustifyRight => "justifyRight",
            EditorCommand::JustifyFull => "justifyFull",
            EditorCommand::InsertOrderedList => "insertOrderedList",
            EditorCommand::InsertUnorderedList => "insertUnorderedList",
            EditorCommand::InsertHorizontalRule => "insertHorizontalRule",
            EditorCommand::FontName { .. } => "fontName",
            EditorCommand::FontSize { .. } => "fontSize",
            EditorCommand::ForeColor { .. } => "foreColor",
            EditorCommand::HiliteColor { .. } => "hiliteColor",
            EditorCommand::InsertHtml { .. } => "insertHtml",
            EditorCommand::InsertText { .. } => "insertText",
            EditorCommand::Delete => "delete",
            EditorCommand::Cut => "cut",
            EditorCommand::Copy => "copy",
            EditorCommand::Paste { .. } => "paste",
            EditorCommand::SelectAll => "selectAll",
            EditorCommand::SetHyperlink { .. } => "setHyperlink",
            EditorCommand::ReplaceHyperlink { .. } => "replaceHyperlink",
            EditorCommand::RemoveHyperlink { .. } => "removeHyperlink",
            EditorCommand::Encrypt { .. } => "encrypt",
            EditorCommand::Decrypt { .. } => "decrypt",
            EditorCommand::HideDecryptedText { .. } => "hideDecryptedText",
            EditorCommand::DecryptPermanently { .. } => "decryptPermanently",
            EditorCommand::InsertResource { .. } => "insertResource",
            EditorCommand::RemoveResource { .. } => "removeResource",
            EditorCommand::InsertTable { .. } => "insertTable",
            EditorCommand::InsertTableRow => "insertTableRow",
            EditorCommand::InsertTableColumn => "insertTableColumn",
            EditorCommand::RemoveTableRow => "removeTableRow",
            EditorCommand::RemoveTableColumn => "removeTableColumn",
            EditorCommand::ResizeTableColumn { .. } => "resizeTableColumn",
            EditorCommand::ResizeImage { .. } => "resizeImage",
            EditorCommand::Find { .. } => "find",
            EditorCommand::Replace { .. } => "replace",
            EditorCommand::ReplaceAll { .. } => "replaceAll",
            EditorCommand::ApplySpellCheck { .. } => "applySpellCheck",
            EditorCommand::RemoveSpellCheck => "removeSpellCheck",
            EditorCommand::CorrectSpelling { .. } => "correctSpelling",
        }
    }
}

/// What a command hands back besides success.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutput {
    Done,
    /// Markup, e.g. what a cut or copy captured.
    Html(String),
    /// Whether a search found anything.
    Found(bool),
    /// How many things the command touched.
    Count(usize),
    /// Identifier the command assigned.
    Id(u64),
}

impl CommandOutput {
    /// Payload for a [`CallResult`](crate::host::CallResult).
    pub fn to_value(&self) -> Option<serde_json::Value> {
        match self {
            CommandOutput::Done => None,
            CommandOutput::Html(html) => Some(serde_json::Value::String(html.clone())),
            CommandOutput::Found(found) => Some(serde_json::Value::Bool(*found)),
            CommandOutput::Count(n) => Some(serde_json::json!(n)),
            CommandOutput::Id(id) => Some(serde_json::json!(id)),
        }
    }
}

const BLOCK_TAGS: &[&str] = &[
    "address",
    "article",
    "blockquote",
    "body",
    "dd",
    "div",
    "dl",
    "dt",
    "figure",
    "footer",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "header",
    "hr",
    "li",
    "ol",
    "p",
    "pre",
    "section",
    "table",
    "tbody",
    "td",
    "tfoot",
    "th",
    "thead",
    "tr",
    "ul",
];

/// Blocks that hold lines rather than being one.
const CONTAINER_TAGS: &[&str] = &["body", "blockquote", "td", "th"];

pub(crate) fn is_block(doc: &Document, node: NodeId) -> bool {
    doc.tag_name(node).is_some_and(|t| BLOCK_TAGS.contains(&t))
}

fn is_container(doc: &Document, node: NodeId) -> bool {
    doc.tag_name(node).is_some_and(|t| CONTAINER_TAGS.contains(&t))
}

/// The live selection or [`EditorError::NoSelection`].
pub(crate) fn current_range(doc: &Document) -> Result<DomRange> {
    doc.selection().ok_or(EditorError::NoSelection)
}

/// `node` and its ancestors up to and including the body.
pub(crate) fn self_and_ancestors(doc: &Document, node: NodeId) -> Vec<NodeId> {
    let body = doc.body();
    let mut out = vec![node];
    if node == body {
        return out;
    }
    for anc in doc.ancestors(node) {
        out.push(anc);
        if anc == body {
            break;
        }
    }
    out
}

/// Nearest ancestor-or-self with one of `tags`, not looking past the body.
pub(crate) fn closest(doc: &Document, node: NodeId, tags: &[&str]) -> Option<NodeId> {
    self_and_ancestors(doc, node)
        .into_iter()
        .find(|&n| doc.tag_name(n).is_some_and(|t| tags.contains(&t)))
}

/// The subtree a formatting command may restructure: two levels above the
/// anchor, climbed out of inline wrappers and widened until it also holds the
/// focus. Never above the body.
pub fn effective_target(doc: &Document, range: &DomRange) -> NodeId {
    let body = doc.body();
    let mut target = doc.ancestors(range.anchor.node).take(2).last().unwrap_or(body);
    if !doc.contains(body, target) {
        target = body;
    }
    while target != body && !is_block(doc, target) {
        target = doc.parent(target).unwrap_or(body);
    }
    while target != body && !doc.contains(target, range.focus.node) {
        target = doc.parent(target).unwrap_or(body);
    }
    target
}

pub(crate) fn nearest_block(doc: &Document, node: NodeId) -> NodeId {
    self_and_ancestors(doc, node)
        .into_iter()
        .find(|&n| is_block(doc, n))
        .unwrap_or(doc.body())
}

/// The block that forms the line `node` sits on. Text sitting directly in a
/// container (body, table cell, quote) is first wrapped into its own `div`,
/// bounded by the nearest block siblings or line breaks.
pub(crate) fn line_block(doc: &mut Document, node: NodeId) -> Result<NodeId> {
    let block = nearest_block(doc, node);
    if !is_container(doc, block) {
        return Ok(block);
    }
    let top = self_and_ancestors(doc, node)
        .into_iter()
        .find(|&n| doc.parent(n) == Some(block))
        .ok_or_else(|| EditorError::InvalidArgument("selection is not inside a line".into()))?;
    if is_block(doc, top) {
        return Ok(top);
    }
    let breaks_line = |doc: &Document, n: NodeId| is_block(doc, n) || doc.has_tag(n, "br");
    let siblings = doc.children(block).to_vec();
    let idx = siblings.iter().position(|&c| c == top).unwrap_or(0);
    let mut first = idx;
    while first > 0 && !breaks_line(doc, siblings[first - 1]) {
        first -= 1;
    }
    let mut last = idx;
    while last + 1 < siblings.len() && !breaks_line(doc, siblings[last + 1]) {
        last += 1;
    }
    Ok(doc.wrap_nodes(&siblings[first..=last], "div")?)
}

/// Non-empty text nodes lying wholly between two element boundaries.
pub(crate) fn contained_text_nodes(doc: &Document, start: Position, end: Position) -> Vec<NodeId> {
    let mut out = Vec::new();
    for n in doc.contained_nodes(start, end) {
        out.extend(doc.text_nodes(n));
    }
    out.retain(|&t| doc.node_length(t) > 0);
    out
}

/// Text nodes the range overlaps without splitting anything. A collapsed
/// range touches the text node it sits in, if any.
pub(crate) fn touched_text_nodes(doc: &Document, range: &DomRange) -> Vec<NodeId> {
    let start = doc.range_start(range);
    let end = doc.range_end(range);
    let touched: Vec<NodeId> = doc
        .text_nodes(doc.body())
        .into_iter()
        .filter(|&t| {
            let len = doc.node_length(t);
            doc.compare_positions(Position::new(t, len), start) != Ordering::Less
                && doc.compare_positions(Position::new(t, 0), end) != Ordering::Greater
        })
        .collect();
    if touched.is_empty() {
        vec![range.anchor.node]
    } else {
        touched
    }
}

/// Move the siblings before and after `child` into shallow copies of
/// `parent` on either side of it, so `parent` holds `child` alone.
pub(crate) fn split_around(doc: &mut Document, parent: NodeId, child: NodeId) -> Result<()> {
    let grand = doc
        .parent(parent)
        .ok_or(inkpad_dom::DomError::NoParent(parent))?;
    let children = doc.children(parent).to_vec();
    let idx = children
        .iter()
        .position(|&c| c == child)
        .ok_or(inkpad_dom::DomError::NotAChild { parent, child })?;
    let (before, after) = (&children[..idx], &children[idx + 1..]);
    if !before.is_empty() {
        let copy = doc.clone_node(parent, false);
        doc.insert_before(grand, copy, Some(parent))?;
        for &n in before {
            doc.append_child(copy, n)?;
        }
    }
    if !after.is_empty() {
        let copy = doc.clone_node(parent, false);
        let next = doc.next_sibling(parent);
        doc.insert_before(grand, copy, next)?;
        for &n in after {
            doc.append_child(copy, n)?;
        }
    }
    Ok(())
}

/// Split every element from `node`'s parent up to `ancestor` so the branch
/// down to `node` holds nothing else.
pub(crate) fn isolate_branch(doc: &mut Document, node: NodeId, ancestor: NodeId) -> Result<()> {
    let mut current = node;
    loop {
        let parent = doc
            .parent(current)
            .ok_or(inkpad_dom::DomError::NoParent(current))?;
        split_around(doc, parent, current)?;
        if parent == ancestor {
            return Ok(());
        }
        current = parent;
    }
}

/// Collapse the selection to a boundary.
pub(crate) fn place_caret(doc: &mut Document, pos: Position) {
    doc.set_selection(Some(DomRange::collapsed_at(pos)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection_codec::{SelectionSpan, restore};

    #[test]
    fn test_effective_target_climbs_two_levels_and_out_of_inline() {
        let mut doc = Document::from_html("<div><p>a <b><i>bold</i></b> c</p></div><p>z</p>");
        restore(&mut doc, Some(SelectionSpan::collapsed(3)));
        let range = doc.selection().unwrap();
        // text -> i -> b, climbed out of inline wrappers to the paragraph.
        let target = effective_target(&doc, &range);
        assert_eq!(doc.tag_name(target), Some("p"));

        restore(&mut doc, Some(SelectionSpan::new(3, 9)));
        let range = doc.selection().unwrap();
        assert_eq!(effective_target(&doc, &range), doc.body());
    }

    #[test]
    fn test_line_block_wraps_loose_text() {
        let mut doc = Document::from_html("one <b>two</b><br>three<p>four</p>");
        let t = doc.text_nodes(doc.body())[1];
        let block = line_block(&mut doc, t).unwrap();
        assert_eq!(doc.tag_name(block), Some("div"));
        assert_eq!(
            doc.inner_html(doc.body()),
            "<div>one <b>two</b></div><br>three<p>four</p>"
        );
        let four = doc.text_nodes(doc.body())[3];
        let paragraph = line_block(&mut doc, four).unwrap();
        assert_eq!(doc.tag_name(paragraph), Some("p"));
    }

    #[test]
    fn test_isolate_branch_splits_each_level() {
        let mut doc = Document::from_html("<b>x<i>yz</i>w</b>");
        let texts = doc.text_nodes(doc.body());
        let yz = texts[1];
        let b = doc.first_child(doc.body()).unwrap();
        isolate_branch(&mut doc, yz, b).unwrap();
        assert_eq!(doc.inner_html(doc.body()), "<b>x</b><b><i>yz</i></b><b>w</b>");
    }

    #[test]
    fn test_command_wire_shape() {
        let cmd: EditorCommand =
            serde_json::from_str(r#"{"command":"removeHyperlink","id":3,"completely":true}"#).unwrap();
        assert_eq!(cmd, EditorCommand::RemoveHyperlink { id: 3, completely: true });
        let cmd: EditorCommand = serde_json::from_str(r#"{"command":"bold"}"#).unwrap();
        assert_eq!(cmd.name(), "bold");
        assert_eq!(CommandOutput::Count(4).to_value(), Some(serde_json::json!(4)));
    }
}
