//! Inline formatting, alignment, lists, and plain content edits.

use inkpad_dom::{Document, DomRange, NodeId, Position};

use super::{
    closest, contained_text_nodes, current_range, effective_target, isolate_branch, line_block,
    place_caret, touched_text_nodes,
};
use crate::error::Result;
use crate::resolver::TextAlignment;
use crate::selection_codec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InlineStyle {
    Bold,
    Italic,
    Underline,
    Strikethrough,
}

impl InlineStyle {
    /// Element this style is applied with.
    pub fn tag(self) -> &'static str {
        match self {
            InlineStyle::Bold => "b",
            InlineStyle::Italic => "i",
            InlineStyle::Underline => "u",
            InlineStyle::Strikethrough => "strike",
        }
    }

    /// Every element that carries this style.
    pub fn tags(self) -> &'static [&'static str] {
        match self {
            InlineStyle::Bold => &["b", "strong"],
            InlineStyle::Italic => &["i", "em"],
            InlineStyle::Underline => &["u"],
            InlineStyle::Strikethrough => &["strike", "s", "del"],
        }
    }
}

fn style_ancestor(doc: &Document, text: NodeId, style: InlineStyle) -> Option<NodeId> {
    let body = doc.body();
    doc.ancestors(text)
        .take_while(|&n| n != body)
        .find(|&n| doc.tag_name(n).is_some_and(|t| style.tags().contains(&t)))
}

/// Toggle an inline style over the selection. When every selected character
/// already has the style it is removed, otherwise it is applied to the rest.
/// A collapsed selection changes nothing.
pub fn toggle_inline(doc: &mut Document, style: InlineStyle) -> Result<()> {
    let range = current_range(doc)?;
    if range.is_collapsed() {
        tracing::trace!(target: "inkpad::commands", ?style, "collapsed selection, nothing to format");
        return Ok(());
    }
    let span = selection_codec::save(doc);
    let scope = effective_target(doc, &range);
    let (start, end) = doc.isolate_range(&range)?;
    let texts = contained_text_nodes(doc, start, end);

    let all_styled = !texts.is_empty() && texts.iter().all(|&t| style_ancestor(doc, t, style).is_some());
    if all_styled {
        for &t in &texts {
            while let Some(el) = style_ancestor(doc, t, style) {
                isolate_branch(doc, t, el)?;
                doc.unwrap_node(el)?;
            }
        }
    } else {
        for &t in &texts {
            if style_ancestor(doc, t, style).is_none() {
                doc.wrap_nodes(&[t], style.tag())?;
            }
        }
        merge_adjacent(doc, scope, style.tag())?;
    }
    doc.normalize(scope)?;
    selection_codec::restore(doc, span);
    tracing::debug!(target: "inkpad::commands", ?style, removed = all_styled, texts = texts.len(), "inline style toggled");
    Ok(())
}

/// Fold runs of identical attribute-less `tag` siblings into the first one.
fn merge_adjacent(doc: &mut Document, scope: NodeId, tag: &str) -> Result<()> {
    let mut parents = vec![scope];
    parents.extend(doc.find_all(scope, |d, n| d.is_element(n)));
    let plain = |doc: &Document, n: NodeId| doc.has_tag(n, tag) && doc.attributes(n).is_empty();
    for parent in parents {
        let mut i = 0;
        loop {
            let children = doc.children(parent);
            if i + 1 >= children.len() {
                break;
            }
            let (a, b) = (children[i], children[i + 1]);
            if plain(doc, a) && plain(doc, b) {
                for c in doc.children(b).to_vec() {
                    doc.append_child(a, c)?;
                }
                doc.remove(b);
            } else {
                i += 1;
            }
        }
    }
    Ok(())
}

fn blocks_for(doc: &mut Document, range: &DomRange) -> Result<Vec<NodeId>> {
    let mut blocks: Vec<NodeId> = Vec::new();
    for t in touched_text_nodes(doc, range) {
        let block = line_block(doc, t)?;
        if !blocks.contains(&block) {
            blocks.push(block);
        }
    }
    Ok(blocks)
}

pub fn justify(doc: &mut Document, alignment: TextAlignment) -> Result<()> {
    let range = current_range(doc)?;
    let span = selection_codec::save(doc);
    let value = match alignment {
        TextAlignment::Left => "left",
        TextAlignment::Center => "center",
        TextAlignment::Right => "right",
        TextAlignment::Full => "justify",
    };
    for block in blocks_for(doc, &range)? {
        doc.set_style_property(block, "text-align", value)?;
    }
    selection_codec::restore(doc, span);
    Ok(())
}

/// Turn the selected lines into a list, or back into plain lines when they
/// already are one of this kind. A list of the other kind is retagged.
pub fn toggle_list(doc: &mut Document, ordered: bool) -> Result<()> {
    let tag = if ordered { "ol" } else { "ul" };
    let range = current_range(doc)?;
    let span = selection_codec::save(doc);

    match closest(doc, range.anchor.node, &["ol", "ul"]) {
        Some(list) if doc.has_tag(list, tag) => {
            for item in doc.children(list).to_vec() {
                if doc.has_tag(item, "li") {
                    let line = doc.create_element("div");
                    for c in doc.children(item).to_vec() {
                        doc.append_child(line, c)?;
                    }
                    doc.replace_with(item, &[line])?;
                }
            }
            doc.unwrap_node(list)?;
        }
        Some(list) => {
            let retagged = doc.create_element(tag);
            for attr in doc.attributes(list).to_vec() {
                doc.set_attr(retagged, &attr.name, attr.value)?;
            }
            for c in doc.children(list).to_vec() {
                doc.append_child(retagged, c)?;
            }
            doc.replace_with(list, &[retagged])?;
        }
        None => {
            let blocks = blocks_for(doc, &range)?;
            if let Some(&first) = blocks.first() {
                let parent = doc.parent(first).ok_or(inkpad_dom::DomError::NoParent(first))?;
                let list = doc.create_element(tag);
                doc.insert_before(parent, list, Some(first))?;
                for block in blocks {
                    let item = doc.create_element("li");
                    for c in doc.children(block).to_vec() {
                        doc.append_child(item, c)?;
                    }
                    doc.append_child(list, item)?;
                    doc.remove(block);
                }
            }
        }
    }
    selection_codec::restore(doc, span);
    Ok(())
}

/// Replace the selection with `nodes` and put the caret after them.
fn replace_selection_with(doc: &mut Document, nodes: &[NodeId]) -> Result<Position> {
    let range = current_range(doc)?;
    let at = doc.delete_range_contents(&range)?;
    let after = doc.insert_nodes_at(at, nodes)?;
    place_caret(doc, after);
    Ok(after)
}

pub fn insert_horizontal_rule(doc: &mut Document) -> Result<()> {
    let rule = doc.create_element("hr");
    replace_selection_with(doc, &[rule])?;
    Ok(())
}

/// Set an inline style property on every selected character, reusing a
/// `span` that already wraps exactly one selected text node.
pub fn apply_span_style(doc: &mut Document, property: &str, value: &str) -> Result<()> {
    let range = current_range(doc)?;
    if range.is_collapsed() {
        return Ok(());
    }
    let span = selection_codec::save(doc);
    let (start, end) = doc.isolate_range(&range)?;
    for t in contained_text_nodes(doc, start, end) {
        let parent = doc.parent(t);
        let reuse = parent.filter(|&p| doc.has_tag(p, "span") && doc.children(p) == [t]);
        let holder = match reuse {
            Some(p) => p,
            None => doc.wrap_nodes(&[t], "span")?,
        };
        doc.set_style_property(holder, property, value)?;
    }
    selection_codec::restore(doc, span);
    Ok(())
}

pub fn insert_html(doc: &mut Document, html: &str) -> Result<()> {
    let nodes = doc.parse_fragment(html);
    replace_selection_with(doc, &nodes)?;
    Ok(())
}

pub fn insert_text(doc: &mut Document, text: &str) -> Result<()> {
    let range = current_range(doc)?;
    let at = doc.delete_range_contents(&range)?;
    let after = doc.insert_text_at(at, text)?;
    place_caret(doc, after);
    Ok(())
}

/// Delete the selection, or the character before a collapsed caret.
pub fn delete(doc: &mut Document) -> Result<()> {
    let range = current_range(doc)?;
    if range.is_collapsed() {
        delete_backward(doc)?;
        return Ok(());
    }
    let at = doc.delete_range_contents(&range)?;
    place_caret(doc, at);
    Ok(())
}

/// Backspace. Returns false at the very start of the text.
pub fn delete_backward(doc: &mut Document) -> Result<bool> {
    let range = current_range(doc)?;
    if !range.is_collapsed() {
        let at = doc.delete_range_contents(&range)?;
        place_caret(doc, at);
        return Ok(true);
    }
    let offset = doc.text_offset_of(range.anchor);
    if offset == 0 {
        return Ok(false);
    }
    let Some(end) = doc.position_at_text_offset(offset) else {
        return Ok(false);
    };
    let start = Position::new(end.node, end.offset.saturating_sub(1));
    doc.delete_range_contents(&DomRange::new(start, end))?;
    place_caret(doc, start);
    Ok(true)
}

/// Forward delete. Returns false at the very end of the text.
pub fn delete_forward(doc: &mut Document) -> Result<bool> {
    let range = current_range(doc)?;
    if !range.is_collapsed() {
        return delete_backward(doc);
    }
    let offset = doc.text_offset_of(range.anchor);
    let Some(end) = doc.position_at_text_offset(offset + 1) else {
        return Ok(false);
    };
    let start = Position::new(end.node, end.offset.saturating_sub(1));
    doc.delete_range_contents(&DomRange::new(start, end))?;
    place_caret(doc, start);
    Ok(true)
}

/// Capture the selection's markup, then erase it and collapse to its start.
pub fn cut(doc: &mut Document) -> Result<String> {
    let range = current_range(doc)?;
    let html = doc.range_html(&range);
    let at = doc.delete_range_contents(&range)?;
    place_caret(doc, at);
    Ok(html)
}

pub fn copy(doc: &Document) -> Result<String> {
    let range = current_range(doc)?;
    Ok(doc.range_html(&range))
}

pub fn select_all(doc: &mut Document) {
    let body = doc.body();
    let len = doc.children(body).len();
    doc.set_selection(Some(DomRange::new(
        Position::new(body, 0),
        Position::new(body, len),
    )));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection_codec::{SelectionSpan, restore, save};

    fn doc_selecting(html: &str, start: usize, end: usize) -> Document {
        let mut doc = Document::from_html(html);
        restore(&mut doc, Some(SelectionSpan::new(start, end)));
        doc
    }

    fn body_html(doc: &Document) -> String {
        doc.inner_html(doc.body())
    }

    #[test]
    fn test_bold_toggle_round_trip() {
        let mut doc = doc_selecting("<p>abc</p>", 1, 2);
        toggle_inline(&mut doc, InlineStyle::Bold).unwrap();
        assert_eq!(body_html(&doc), "<p>a<b>b</b>c</p>");
        assert_eq!(save(&doc), Some(SelectionSpan::new(1, 2)));

        toggle_inline(&mut doc, InlineStyle::Bold).unwrap();
        assert_eq!(body_html(&doc), "<p>abc</p>");
    }

    #[test]
    fn test_bold_extends_partial_formatting() {
        let mut doc = doc_selecting("<p>a<b>bc</b>de</p>", 0, 4);
        toggle_inline(&mut doc, InlineStyle::Bold).unwrap();
        assert_eq!(body_html(&doc), "<p><b>abcd</b>e</p>");
    }

    #[test]
    fn test_unbold_inside_strong_keeps_outer_parts() {
        let mut doc = doc_selecting("<p><strong>one two three</strong></p>", 4, 7);
        toggle_inline(&mut doc, InlineStyle::Bold).unwrap();
        assert_eq!(
            body_html(&doc),
            "<p><strong>one </strong>two<strong> three</strong></p>"
        );
    }

    #[test]
    fn test_collapsed_toggle_is_noop() {
        let mut doc = doc_selecting("<p>abc</p>", 1, 1);
        toggle_inline(&mut doc, InlineStyle::Italic).unwrap();
        assert_eq!(body_html(&doc), "<p>abc</p>");
    }

    #[test]
    fn test_justify_wraps_loose_line() {
        let mut doc = doc_selecting("plain<p>para</p>", 1, 1);
        justify(&mut doc, TextAlignment::Center).unwrap();
        assert_eq!(
            body_html(&doc),
            r#"<div style="text-align: center;">plain</div><p>para</p>"#
        );
        let mut doc = doc_selecting("<p>a</p><p>b</p>", 0, 2);
        justify(&mut doc, TextAlignment::Full).unwrap();
        assert_eq!(
            body_html(&doc),
            r#"<p style="text-align: justify;">a</p><p style="text-align: justify;">b</p>"#
        );
    }

    #[test]
    fn test_list_toggle() {
        let mut doc = doc_selecting("<p>one</p><p>two</p>", 0, 5);
        toggle_list(&mut doc, false).unwrap();
        assert_eq!(body_html(&doc), "<ul><li>one</li><li>two</li></ul>");
        toggle_list(&mut doc, true).unwrap();
        assert_eq!(body_html(&doc), "<ol><li>one</li><li>two</li></ol>");
        toggle_list(&mut doc, true).unwrap();
        assert_eq!(body_html(&doc), "<div>one</div><div>two</div>");
    }

    #[test]
    fn test_span_style_reuses_span() {
        let mut doc = doc_selecting("<p>abc</p>", 0, 3);
        apply_span_style(&mut doc, "color", "red").unwrap();
        apply_span_style(&mut doc, "font-size", "12px").unwrap();
        assert_eq!(
            body_html(&doc),
            r#"<p><span style="color: red; font-size: 12px;">abc</span></p>"#
        );
    }

    #[test]
    fn test_cut_collapses_to_start() {
        let mut doc = doc_selecting("<p>ab<b>cd</b>ef</p>", 1, 3);
        let html = cut(&mut doc).unwrap();
        assert_eq!(html, "b<b>c</b>");
        assert_eq!(doc.text_content(doc.body()), "adef");
        assert_eq!(save(&doc), Some(SelectionSpan::collapsed(1)));
    }

    #[test]
    fn test_typing_and_backspace() {
        let mut doc = doc_selecting("<p>ac</p>", 1, 1);
        insert_text(&mut doc, "b").unwrap();
        assert_eq!(body_html(&doc), "<p>abc</p>");
        assert!(delete_backward(&mut doc).unwrap());
        assert!(delete_backward(&mut doc).unwrap());
        assert_eq!(body_html(&doc), "<p>c</p>");
        assert!(!delete_backward(&mut doc).unwrap());
        assert!(delete_forward(&mut doc).unwrap());
        assert_eq!(doc.text_content(doc.body()), "");
    }

    #[test]
    fn test_horizontal_rule_and_select_all() {
        let mut doc = doc_selecting("<p>ab</p>", 1, 1);
        insert_horizontal_rule(&mut doc).unwrap();
        assert_eq!(body_html(&doc), "<p>a<hr>b</p>");
        select_all(&mut doc);
        assert_eq!(save(&doc), Some(SelectionSpan::new(0, 2)));
    }
}
