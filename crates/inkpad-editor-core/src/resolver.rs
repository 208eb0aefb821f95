//! Working out what the caret or the pointer is on.
//!
//! Two entry points:
//! - [`classify_at_selection`] walks up from the selection anchor and reports
//!   formatting, list, table, alignment, and resource/encryption state
//! - [`classify_at_point`] finds the deepest element under a coordinate and
//!   reports the semantic entity a context menu should offer actions for

use inkpad_dom::{Document, NodeId};
use serde::{Deserialize, Serialize};

use crate::error::{EditorError, Result};
use crate::markers::{
    CHECKBOX_CHECKED, CHECKBOX_UNCHECKED, CIPHER, CRYPT_ID, DECRYPTED_ID, EN_CRYPT, EN_DECRYPTED,
    EN_MEDIA, EN_TAG, ENCRYPTED_TEXT, HASH, HINT, HYPERLINK_ID, KEY_LENGTH, MISSPELL_CLASS, TODO_ID,
    TYPE, is_image_mime,
};
use crate::selection_codec;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TextAlignment {
    #[default]
    Left,
    Center,
    Right,
    Full,
}

impl TextAlignment {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "left" | "start" => Some(TextAlignment::Left),
            "center" => Some(TextAlignment::Center),
            "right" | "end" => Some(TextAlignment::Right),
            "justify" => Some(TextAlignment::Full),
            _ => None,
        }
    }
}

/// Formatting state at the caret, as reported to the host's toolbar.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorPositionState {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strikethrough: bool,
    pub ordered_list: bool,
    pub unordered_list: bool,
    pub inside_table: bool,
    pub alignment: TextAlignment,
    pub on_image_resource: bool,
    pub on_non_image_resource: bool,
    pub resource_hash: Option<String>,
    pub on_encrypted_text: bool,
    pub inside_decrypted_text: bool,
    pub font_family: Option<String>,
    pub font_size: Option<String>,
}

/// Attributes of an encrypted or decrypted fragment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FragmentInfo {
    pub cipher: String,
    pub key_length: u32,
    pub encrypted_text: String,
    pub hint: Option<String>,
    pub id: Option<u64>,
}

impl FragmentInfo {
    pub(crate) fn read(doc: &Document, el: NodeId, id_attr: &str) -> Self {
        Self {
            cipher: doc.attr(el, CIPHER).unwrap_or_default().to_string(),
            key_length: doc
                .attr(el, KEY_LENGTH)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(0),
            encrypted_text: doc.attr(el, ENCRYPTED_TEXT).unwrap_or_default().to_string(),
            hint: doc.attr(el, HINT).map(str::to_string),
            id: doc.attr(el, id_attr).and_then(|v| v.trim().parse().ok()),
        }
    }
}

/// What a right click landed on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ContextMenuTarget {
    ImageResource {
        hash: String,
        mime: String,
    },
    NonImageResource {
        hash: String,
        mime: String,
    },
    EncryptedText(FragmentInfo),
    DecryptedText(FragmentInfo),
    Hyperlink {
        id: Option<u64>,
        href: Option<String>,
    },
    TodoCheckbox {
        id: Option<u64>,
        checked: bool,
    },
    #[serde(rename_all = "camelCase")]
    GenericText {
        selected_html: String,
        inside_table: bool,
        inside_decrypted_text: bool,
        misspelled_word: Option<String>,
    },
}

fn en_tag_is(doc: &Document, el: NodeId, value: &str) -> bool {
    doc.attr(el, EN_TAG) == Some(value)
}

/// The node a walk starts from: text nodes defer to their parent.
fn walk_start(doc: &Document, node: NodeId) -> NodeId {
    if doc.is_element(node) {
        node
    } else {
        doc.parent(node).unwrap_or(doc.body())
    }
}

/// `node` and its ancestors, stopping before the body.
fn up_to_body(doc: &Document, node: NodeId) -> Vec<NodeId> {
    let body = doc.body();
    std::iter::once(node)
        .chain(doc.ancestors(node))
        .take_while(|&n| n != body && doc.contains(body, n))
        .collect()
}

pub fn classify_at_selection(doc: &Document) -> Result<CursorPositionState> {
    let range = doc.selection().ok_or(EditorError::NoSelection)?;
    let start = walk_start(doc, range.anchor.node);
    let mut state = CursorPositionState::default();
    let mut list_seen = false;
    let mut alignment_seen = false;

    for el in up_to_body(doc, start) {
        if en_tag_is(doc, el, EN_MEDIA) {
            let mime = doc.attr(el, TYPE).unwrap_or_default();
            if is_image_mime(mime) {
                state.on_image_resource = true;
            } else {
                state.on_non_image_resource = true;
            }
            state.resource_hash = doc.attr(el, HASH).map(str::to_string);
            break;
        }
        if en_tag_is(doc, el, EN_CRYPT) {
            state.on_encrypted_text = true;
            break;
        }
        if en_tag_is(doc, el, EN_DECRYPTED) {
            state.inside_decrypted_text = true;
        }

        let tag = doc.tag_name(el).unwrap_or_default();
        match tag {
            "b" | "strong" => state.bold = true,
            "i" | "em" => state.italic = true,
            "u" => state.underline = true,
            "s" | "strike" | "del" => state.strikethrough = true,
            _ => {}
        }
        if let Some(weight) = doc.style_property(el, "font-weight") {
            if weight == "bold" || weight.parse::<u32>().is_ok_and(|w| w >= 600) {
                state.bold = true;
            }
        }
        if doc.style_property(el, "font-style").as_deref() == Some("italic") {
            state.italic = true;
        }
        if let Some(decoration) = doc.style_property(el, "text-decoration") {
            state.underline |= decoration.contains("underline");
            state.strikethrough |= decoration.contains("line-through");
        }

        if !list_seen {
            match tag {
                "ol" => {
                    state.ordered_list = true;
                    list_seen = true;
                }
                "ul" => {
                    state.unordered_list = true;
                    list_seen = true;
                }
                _ => {}
            }
        }

        if tag == "tbody" || tag == "table" {
            state.inside_table = true;
        }

        if !alignment_seen {
            let declared = doc
                .style_property(el, "text-align")
                .or_else(|| doc.attr(el, "align").map(str::to_string));
            if let Some(align) = declared.as_deref().and_then(TextAlignment::parse) {
                state.alignment = align;
                alignment_seen = true;
            }
        }

        if state.font_family.is_none() {
            state.font_family = doc
                .style_property(el, "font-family")
                .or_else(|| doc.attr(el, "face").map(str::to_string));
        }
        if state.font_size.is_none() {
            state.font_size = doc.style_property(el, "font-size");
        }
    }

    tracing::trace!(target: "inkpad::resolver", ?state, "cursor position classified");
    Ok(state)
}

/// First element of a host-supplied candidate list. An empty list means the
/// walk has nothing to start from.
pub fn unwrap_first(candidates: &[NodeId]) -> Option<NodeId> {
    candidates.first().copied()
}

/// Depth-first descent under `root` for the deepest element whose box holds
/// the point. Elements without a box are passed through. Ties go to the first
/// element visited; the search stops `max_depth` levels below `root`.
pub fn deepest_element_at(doc: &Document, root: NodeId, x: f32, y: f32, max_depth: usize) -> NodeId {
    let mut best = (root, 0usize);
    let mut stack: Vec<(NodeId, usize)> = vec![(root, 0)];
    while let Some((node, depth)) = stack.pop() {
        if depth > 0 && doc.rect(node).is_some_and(|r| r.contains(x, y)) && depth > best.1 {
            best = (node, depth);
        }
        if depth >= max_depth {
            continue;
        }
        for &child in doc.children(node).iter().rev() {
            if doc.is_element(child) {
                stack.push((child, depth + 1));
            }
        }
    }
    tracing::trace!(target: "inkpad::resolver", x, y, node = %best.0, depth = best.1, "deepest element under point");
    best.0
}

/// Classify what sits under a coordinate. Falls back to the (word-snapped)
/// selection as generic text.
pub fn classify_at_point(doc: &mut Document, x: f32, y: f32, max_depth: usize) -> Result<ContextMenuTarget> {
    let hits = doc.elements_from_point(x, y);
    let top = unwrap_first(&hits).ok_or_else(|| EditorError::NotFound(format!("element at ({x}, {y})")))?;
    let deepest = deepest_element_at(doc, top, x, y, max_depth);

    let mut inside_table = false;
    let mut inside_decrypted_text = false;
    let mut misspelled_word = None;

    for el in up_to_body(doc, deepest) {
        if en_tag_is(doc, el, EN_MEDIA) {
            let hash = doc.attr(el, HASH).unwrap_or_default().to_string();
            let mime = doc.attr(el, TYPE).unwrap_or_default().to_string();
            return Ok(if is_image_mime(&mime) {
                ContextMenuTarget::ImageResource { hash, mime }
            } else {
                ContextMenuTarget::NonImageResource { hash, mime }
            });
        }
        if en_tag_is(doc, el, EN_CRYPT) {
            return Ok(ContextMenuTarget::EncryptedText(FragmentInfo::read(doc, el, CRYPT_ID)));
        }
        if en_tag_is(doc, el, EN_DECRYPTED) && el == deepest {
            return Ok(ContextMenuTarget::DecryptedText(FragmentInfo::read(doc, el, DECRYPTED_ID)));
        }
        if en_tag_is(doc, el, EN_DECRYPTED) {
            inside_decrypted_text = true;
        }
        if doc.has_class(el, CHECKBOX_CHECKED) || doc.has_class(el, CHECKBOX_UNCHECKED) {
            return Ok(ContextMenuTarget::TodoCheckbox {
                id: doc.attr(el, TODO_ID).and_then(|v| v.parse().ok()),
                checked: doc.has_class(el, CHECKBOX_CHECKED),
            });
        }
        if doc.has_tag(el, "a") {
            return Ok(ContextMenuTarget::Hyperlink {
                id: doc.attr(el, HYPERLINK_ID).and_then(|v| v.parse().ok()),
                href: doc.attr(el, "href").map(str::to_string),
            });
        }
        if doc.has_tag(el, "span") && doc.has_class(el, MISSPELL_CLASS) && misspelled_word.is_none() {
            misspelled_word = Some(doc.text_content(el));
        }
        if doc.has_tag(el, "table") || doc.has_tag(el, "tbody") {
            inside_table = true;
        }
    }

    selection_codec::snap_to_word(doc);
    let selected_html = doc
        .selection()
        .map(|range| doc.range_html(&range))
        .unwrap_or_default();
    Ok(ContextMenuTarget::GenericText {
        selected_html,
        inside_table,
        inside_decrypted_text,
        misspelled_word,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection_codec::{SelectionSpan, restore};
    use inkpad_dom::Rect;

    fn caret(doc: &mut Document, at: usize) {
        restore(doc, Some(SelectionSpan::collapsed(at)));
    }

    #[test]
    fn test_cursor_state_formatting_and_alignment() {
        let mut doc = Document::from_html(
            r#"<div style="text-align: center;"><ol><li><b><i>bold italic</i></b></li></ol></div>"#,
        );
        caret(&mut doc, 3);
        let state = classify_at_selection(&doc).unwrap();
        assert!(state.bold && state.italic);
        assert!(!state.underline);
        assert!(state.ordered_list && !state.unordered_list);
        assert_eq!(state.alignment, TextAlignment::Center);
    }

    #[test]
    fn test_cursor_state_defaults_to_left() {
        let mut doc = Document::from_html("<p>plain</p>");
        caret(&mut doc, 1);
        let state = classify_at_selection(&doc).unwrap();
        assert_eq!(state, CursorPositionState::default());
    }

    #[test]
    fn test_cursor_state_inside_table_and_resource() {
        let mut doc = Document::from_html(
            r#"<table><tbody><tr><td>cell</td></tr></tbody></table><b><div en-tag="en-media" type="application/pdf" hash="abc">name</div></b>"#,
        );
        caret(&mut doc, 2);
        assert!(classify_at_selection(&doc).unwrap().inside_table);
        caret(&mut doc, 6);
        let state = classify_at_selection(&doc).unwrap();
        assert!(state.on_non_image_resource);
        assert_eq!(state.resource_hash.as_deref(), Some("abc"));
        // Resource short-circuits before formatting is collected.
        assert!(!state.bold);
    }

    #[test]
    fn test_no_selection_is_an_error() {
        let doc = Document::from_html("<p>x</p>");
        assert!(matches!(classify_at_selection(&doc), Err(EditorError::NoSelection)));
    }

    #[test]
    fn test_deepest_prefers_depth_then_first_visited() {
        let mut doc = Document::from_html("<div><section><span>a</span><span>b</span></section><p>c</p></div>");
        let body = doc.body();
        let div = doc.first_child(body).unwrap();
        let section = doc.first_child(div).unwrap();
        let spans = doc.children(section).to_vec();
        let p = doc.children(div)[1];
        doc.set_rect(div, Some(Rect::new(0.0, 0.0, 100.0, 100.0))).unwrap();
        // `section` has no box; its children are still searched.
        doc.set_rect(spans[0], Some(Rect::new(0.0, 0.0, 50.0, 10.0))).unwrap();
        doc.set_rect(spans[1], Some(Rect::new(0.0, 0.0, 50.0, 10.0))).unwrap();
        doc.set_rect(p, Some(Rect::new(0.0, 0.0, 100.0, 100.0))).unwrap();
        assert_eq!(deepest_element_at(&doc, div, 5.0, 5.0, 8), spans[0]);
        assert_eq!(deepest_element_at(&doc, div, 5.0, 50.0, 8), p);
        // Depth bound stops before the spans.
        assert_eq!(deepest_element_at(&doc, div, 5.0, 5.0, 1), p);
    }

    #[test]
    fn test_point_on_image_resource() {
        let mut doc = Document::from_html(r#"<p>x<img en-tag="en-media" type="image/png" hash="h1"></p>"#);
        let img = doc.find_all(doc.body(), |d, n| d.has_tag(n, "img"))[0];
        doc.set_rect(img, Some(Rect::new(10.0, 10.0, 20.0, 20.0))).unwrap();
        let target = classify_at_point(&mut doc, 15.0, 15.0, 64).unwrap();
        assert_eq!(
            target,
            ContextMenuTarget::ImageResource {
                hash: "h1".into(),
                mime: "image/png".into()
            }
        );
    }

    #[test]
    fn test_point_on_encrypted_fragment() {
        let mut doc = Document::from_html(
            r#"<img en-tag="en-crypt" cipher="AES" length="128" encrypted_text="Zm9v" hint="pet" en-crypt-id="3">"#,
        );
        let img = doc.first_child(doc.body()).unwrap();
        doc.set_rect(img, Some(Rect::new(0.0, 0.0, 10.0, 10.0))).unwrap();
        let ContextMenuTarget::EncryptedText(info) = classify_at_point(&mut doc, 1.0, 1.0, 64).unwrap() else {
            panic!("expected encrypted target");
        };
        assert_eq!(info.cipher, "AES");
        assert_eq!(info.key_length, 128);
        assert_eq!(info.hint.as_deref(), Some("pet"));
        assert_eq!(info.id, Some(3));
    }

    #[test]
    fn test_point_generic_text_snaps_word() {
        let mut doc = Document::from_html(
            r#"<table><tbody><tr><td>some <span class="misspell">wrod</span> here</td></tr></tbody></table>"#,
        );
        let span = doc.find_all(doc.body(), |d, n| d.has_tag(n, "span"))[0];
        doc.set_rect(span, Some(Rect::new(0.0, 0.0, 30.0, 10.0))).unwrap();
        caret(&mut doc, 6);
        let target = classify_at_point(&mut doc, 5.0, 5.0, 64).unwrap();
        assert_eq!(
            target,
            ContextMenuTarget::GenericText {
                selected_html: r#"<span class="misspell">wrod</span>"#.into(),
                inside_table: true,
                inside_decrypted_text: false,
                misspelled_word: Some("wrod".into()),
            }
        );
    }

    #[test]
    fn test_point_with_nothing_underneath_fails() {
        let mut doc = Document::from_html("<p>x</p>");
        assert!(matches!(
            classify_at_point(&mut doc, 1.0, 1.0, 64),
            Err(EditorError::NotFound(_))
        ));
    }
}
