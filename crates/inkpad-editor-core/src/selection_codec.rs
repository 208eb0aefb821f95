//! Selection save/restore as body-relative character offsets.
//!
//! A [`SelectionSpan`] survives edits that replace the nodes a live selection
//! pointed into, which is what commands need when they rebuild markup and then
//! put the caret back.

use inkpad_dom::{Document, DomRange};
use serde::{Deserialize, Serialize};

use crate::commands::nearest_block;

/// Character offsets from the start of the body's text, `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionSpan {
    pub start: usize,
    pub end: usize,
}

impl SelectionSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start: start.min(end),
            end: start.max(end),
        }
    }

    pub fn collapsed(at: usize) -> Self {
        Self { start: at, end: at }
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }
}

/// Capture the live selection. `None` when there is nothing selected.
pub fn save(doc: &Document) -> Option<SelectionSpan> {
    let range = doc.selection()?;
    let start = doc.text_offset_of(doc.range_start(&range));
    let len = doc.range_text(&range).chars().count();
    Some(SelectionSpan {
        start,
        end: start + len,
    })
}

/// Put a saved selection back, best effort. Returns whether the selection was
/// changed; offsets that no longer land in a text node leave it alone.
pub fn restore(doc: &mut Document, span: Option<SelectionSpan>) -> bool {
    let Some(span) = span else {
        tracing::debug!(target: "inkpad::selection", "no saved selection to restore");
        return false;
    };
    let start = doc.position_at_text_offset(span.start);
    let end = doc.position_at_text_offset(span.end);
    match (start, end) {
        (Some(start), Some(end)) => {
            doc.set_selection(Some(DomRange::new(start, end)));
            true
        }
        _ => {
            tracing::debug!(
                target: "inkpad::selection",
                start = span.start,
                end = span.end,
                "saved selection no longer fits the document"
            );
            false
        }
    }
}

/// The body's characters, in the same offsets as [`SelectionSpan`], plus the
/// offsets where a new block or line starts. Text on either side of a break
/// is never part of the same word or match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BodyText {
    pub chars: Vec<char>,
    /// Ascending, never 0.
    pub breaks: Vec<usize>,
}

impl BodyText {
    pub fn of(doc: &Document) -> Self {
        let mut text = BodyText::default();
        let mut last_block = None;
        let mut line_break = false;
        for node in doc.descendants(doc.body()) {
            if doc.has_tag(node, "br") {
                line_break = true;
                continue;
            }
            let Some(content) = doc.text(node) else {
                continue;
            };
            let block = nearest_block(doc, node);
            let at = text.chars.len();
            let new_line = line_break || last_block.is_some_and(|b| b != block);
            if new_line && at > 0 && text.breaks.last() != Some(&at) {
                text.breaks.push(at);
            }
            line_break = false;
            last_block = Some(block);
            text.chars.extend(content.chars());
        }
        text
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn is_break(&self, offset: usize) -> bool {
        self.breaks.binary_search(&offset).is_ok()
    }

    /// Whether `start..end` runs over a block or line boundary.
    pub fn crosses_break(&self, start: usize, end: usize) -> bool {
        self.breaks.iter().any(|&b| start < b && b < end)
    }

    /// Start of the word touching `offset`. A caret sitting on a break belongs
    /// to the line before it.
    pub fn word_start(&self, offset: usize) -> usize {
        let offset = offset.min(self.len());
        let mut pos = offset;
        while pos > 0 && !self.chars[pos - 1].is_whitespace() && (pos == offset || !self.is_break(pos)) {
            pos -= 1;
        }
        pos
    }

    /// End of the word touching `offset`.
    pub fn word_end(&self, offset: usize) -> usize {
        let mut pos = offset.min(self.len());
        while pos < self.len() && !self.chars[pos].is_whitespace() && !self.is_break(pos) {
            pos += 1;
        }
        pos
    }
}

/// Grow a collapsed selection to the word around the caret. The word extends
/// the same way on both sides: up to, not including, the nearest whitespace.
/// A selection that already covers text is left as is.
pub fn snap_to_word(doc: &mut Document) -> Option<SelectionSpan> {
    let span = save(doc)?;
    if !span.is_collapsed() {
        return Some(span);
    }
    let text = BodyText::of(doc);
    let word = SelectionSpan {
        start: text.word_start(span.start),
        end: text.word_end(span.start),
    };
    tracing::trace!(target: "inkpad::selection", start = word.start, end = word.end, "snapped to word");
    if word.is_collapsed() {
        return Some(span);
    }
    restore(doc, Some(word));
    Some(word)
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkpad_dom::Position;

    fn select(doc: &mut Document, start: usize, end: usize) {
        restore(doc, Some(SelectionSpan::new(start, end)));
    }

    #[test]
    fn test_save_restore_round_trip() {
        let mut doc = Document::from_html("<p>hello <b>bold</b> world</p><p>next</p>");
        for (s, e) in [(0, 0), (2, 8), (6, 10), (11, 19), (17, 17)] {
            select(&mut doc, s, e);
            assert_eq!(save(&doc), Some(SelectionSpan::new(s, e)), "span {s}..{e}");
        }
    }

    #[test]
    fn test_save_without_selection() {
        let doc = Document::from_html("<p>x</p>");
        assert_eq!(save(&doc), None);
    }

    #[test]
    fn test_restore_out_of_range_is_noop() {
        let mut doc = Document::from_html("<p>abc</p>");
        select(&mut doc, 1, 2);
        let before = doc.selection();
        assert!(!restore(&mut doc, Some(SelectionSpan::new(1, 50))));
        assert!(!restore(&mut doc, None));
        assert_eq!(doc.selection(), before);
    }

    #[test]
    fn test_backwards_selection_saves_ordered() {
        let mut doc = Document::from_html("<p>abcdef</p>");
        let t = doc.text_nodes(doc.body())[0];
        doc.set_selection(Some(DomRange::new(Position::new(t, 5), Position::new(t, 1))));
        assert_eq!(save(&doc), Some(SelectionSpan::new(1, 5)));
    }

    #[test]
    fn test_snap_to_word_is_symmetric() {
        let mut doc = Document::from_html("<p>one two<i>three</i> four</p>");
        // Caret inside "twothree": the word runs across the inline element.
        select(&mut doc, 6, 6);
        assert_eq!(snap_to_word(&mut doc), Some(SelectionSpan::new(4, 12)));
        assert_eq!(doc.range_text(&doc.selection().unwrap()), "twothree");

        // Caret at the start of a word.
        select(&mut doc, 13, 13);
        assert_eq!(snap_to_word(&mut doc), Some(SelectionSpan::new(13, 17)));

        // Caret at the end of a word.
        select(&mut doc, 3, 3);
        assert_eq!(snap_to_word(&mut doc), Some(SelectionSpan::new(0, 3)));
    }

    #[test]
    fn test_snap_stops_at_block_boundaries() {
        let mut doc = Document::from_html("<p>one</p><p>two</p>");
        select(&mut doc, 1, 1);
        assert_eq!(snap_to_word(&mut doc), Some(SelectionSpan::new(0, 3)));
        assert_eq!(doc.range_text(&doc.selection().unwrap()), "one");

        // Offset 3 is the end of the first paragraph.
        select(&mut doc, 3, 3);
        assert_eq!(snap_to_word(&mut doc), Some(SelectionSpan::new(0, 3)));

        select(&mut doc, 4, 4);
        assert_eq!(snap_to_word(&mut doc), Some(SelectionSpan::new(3, 6)));
    }

    #[test]
    fn test_body_text_breaks() {
        let doc = Document::from_html("<p>ab<b>c</b></p><div>d<br>e</div>f");
        let text = BodyText::of(&doc);
        assert_eq!(text.chars.iter().collect::<String>(), "abcdef");
        assert_eq!(text.breaks, vec![3, 4, 5]);
        assert!(text.crosses_break(2, 5));
        assert!(!text.crosses_break(0, 3));
    }

    #[test]
    fn test_snap_between_spaces_stays_collapsed() {
        let mut doc = Document::from_html("<p>a  b</p>");
        select(&mut doc, 2, 2);
        assert_eq!(snap_to_word(&mut doc), Some(SelectionSpan::collapsed(2)));
    }
}
