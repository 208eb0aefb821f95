//! Misspelled-word highlighting and correction.

use inkpad_dom::{Document, NodeId};
use regex::Regex;

use super::{current_range, place_caret, self_and_ancestors};
use crate::error::{EditorError, Result};
use crate::markers::MISSPELL_CLASS;
use crate::selection_codec::{self, SelectionSpan};

/// Text under these is never highlighted.
const SKIPPED_TAGS: &[&str] = &["script", "style", "form", "input", "textarea", "select", "option", "button"];

/// Case-insensitive, whole-word alternation of `words`. `None` when there is
/// nothing to match.
pub fn misspelling_pattern(words: &[String]) -> Result<Option<Regex>> {
    let alternatives: Vec<String> = words
        .iter()
        .map(|w| w.trim())
        .filter(|w| !w.is_empty())
        .map(regex::escape)
        .collect();
    if alternatives.is_empty() {
        return Ok(None);
    }
    let pattern = format!(r"(?i)\b(?:{})\b", alternatives.join("|"));
    Regex::new(&pattern)
        .map(Some)
        .map_err(|e| EditorError::InvalidArgument(format!("misspelled word list: {e}")))
}

pub fn is_highlight(doc: &Document, node: NodeId) -> bool {
    doc.has_tag(node, "span") && doc.has_class(node, MISSPELL_CLASS)
}

fn is_skipped(doc: &Document, text: NodeId) -> bool {
    self_and_ancestors(doc, text).into_iter().any(|n| {
        is_highlight(doc, n) || doc.tag_name(n).is_some_and(|t| SKIPPED_TAGS.contains(&t))
    })
}

fn char_offset(text: &str, byte: usize) -> usize {
    text[..byte].chars().count()
}

/// One text node cut up by highlighting: the node itself, which keeps the
/// leading text, followed by the nodes split off it in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub original: NodeId,
    pub pieces: Vec<NodeId>,
}

/// What [`apply_spell_check`] did, so [`join_highlights`] can take it back
/// and leave every original text node as it was.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Highlights {
    pub splits: Vec<Split>,
    words: usize,
}

impl Highlights {
    /// Words wrapped.
    pub fn count(&self) -> usize {
        self.words
    }

    pub fn is_empty(&self) -> bool {
        self.words == 0
    }

    /// Every node the highlights hold on to.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.splits
            .iter()
            .flat_map(|s| std::iter::once(s.original).chain(s.pieces.iter().copied()))
    }
}

/// Wrap every occurrence of the words in a highlight span.
pub fn apply_spell_check(doc: &mut Document, words: &[String]) -> Result<Highlights> {
    let mut highlights = Highlights::default();
    let Some(pattern) = misspelling_pattern(words)? else {
        return Ok(highlights);
    };
    let targets: Vec<NodeId> = doc
        .text_nodes(doc.body())
        .into_iter()
        .filter(|&t| !is_skipped(doc, t))
        .collect();
    for text_node in targets {
        let text = doc.text(text_node).unwrap_or_default().to_string();
        let spans: Vec<(usize, usize)> = pattern
            .find_iter(&text)
            .map(|m| (char_offset(&text, m.start()), char_offset(&text, m.end())))
            .collect();
        if spans.is_empty() {
            continue;
        }
        let mut created = Vec::new();
        // Back to front, so earlier offsets stay valid in the head node.
        for (start, end) in spans.into_iter().rev() {
            let mut fresh = Vec::with_capacity(2);
            let tail = if end < doc.node_length(text_node) {
                Some(doc.split_text(text_node, end)?)
            } else {
                None
            };
            let word = if start > 0 {
                let word = doc.split_text(text_node, start)?;
                fresh.push(word);
                word
            } else {
                text_node
            };
            fresh.extend(tail);
            let span = doc.wrap_nodes(&[word], "span")?;
            doc.set_attr(span, "class", MISSPELL_CLASS)?;
            created.splice(0..0, fresh);
            highlights.words += 1;
        }
        highlights.splits.push(Split {
            original: text_node,
            pieces: created,
        });
    }
    tracing::debug!(target: "inkpad::commands", words = words.len(), wrapped = highlights.words, "spell check applied");
    Ok(highlights)
}

/// Undo [`apply_spell_check`]: unwrap its spans and fold the split pieces
/// back into the node they came from. Returns how many nodes were restored.
pub fn join_highlights(doc: &mut Document, highlights: &Highlights) -> Result<usize> {
    let mut joined = 0;
    for split in &highlights.splits {
        let all: Vec<NodeId> = std::iter::once(split.original)
            .chain(split.pieces.iter().copied())
            .collect();
        for &piece in &all {
            if let Some(parent) = doc.parent(piece) {
                if is_highlight(doc, parent) {
                    doc.unwrap_node(parent)?;
                }
            }
        }
        let live: Vec<NodeId> = all
            .into_iter()
            .filter(|&n| doc.is_text(n) && doc.is_connected(n))
            .collect();
        if live.first() != Some(&split.original) {
            tracing::warn!(target: "inkpad::commands", node = %split.original, "highlighted text node is gone, not joining");
            continue;
        }
        let text: String = live.iter().filter_map(|&n| doc.text(n)).collect();
        doc.set_text(split.original, text)?;
        for &piece in &live[1..] {
            doc.remove(piece);
        }
        joined += 1;
    }
    Ok(joined)
}

/// Unwrap every highlight span, including ones not made by
/// [`apply_spell_check`]. Returns how many were removed.
pub fn remove_spell_check(doc: &mut Document) -> Result<usize> {
    let spans = doc.find_all(doc.body(), is_highlight);
    for &span in &spans {
        let parent = doc.parent(span);
        doc.unwrap_node(span)?;
        if let Some(parent) = parent {
            doc.normalize(parent)?;
        }
    }
    Ok(spans.len())
}

/// The text a correction replaces: the highlighted word under the caret, or
/// else the selection.
pub fn correction_target(doc: &Document) -> Result<SelectionSpan> {
    let range = current_range(doc)?;
    let highlight = self_and_ancestors(doc, range.anchor.node)
        .into_iter()
        .find(|&n| is_highlight(doc, n));
    if let Some(span) = highlight {
        let start = doc.text_nodes(span).first().map_or_else(
            || doc.text_offset_of(doc.range_start(&range)),
            |&t| doc.text_offset_of(inkpad_dom::Position::new(t, 0)),
        );
        let len = doc.text_content(span).chars().count();
        return Ok(SelectionSpan::new(start, start + len));
    }
    match selection_codec::save(doc) {
        Some(span) if !span.is_collapsed() => Ok(span),
        _ => Err(EditorError::NotFound("misspelled word at the selection".into())),
    }
}

/// Replace the text at `target` with `replacement` and put the caret after it.
pub fn correct_spelling(doc: &mut Document, target: SelectionSpan, replacement: &str) -> Result<()> {
    if !selection_codec::restore(doc, Some(target)) {
        return Err(EditorError::NotFound(format!("text at {}..{}", target.start, target.end)));
    }
    let range = current_range(doc)?;
    let at = doc.delete_range_contents(&range)?;
    let after = doc.insert_text_at(at, replacement)?;
    place_caret(doc, after);
    tracing::debug!(target: "inkpad::commands", replacement, "spelling corrected");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(list: &[&str]) -> Vec<String> {
        list.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_highlights_whole_words_only() {
        let mut doc = Document::from_html("<p>Teh cat saw tehx and teh.</p><script>teh</script>");
        assert_eq!(apply_spell_check(&mut doc, &words(&["teh"])).unwrap().count(), 2);
        insta::assert_snapshot!(doc.inner_html(doc.body()), @r#"<p><span class="misspell">Teh</span> cat saw tehx and <span class="misspell">teh</span>.</p><script>teh</script>"#);

        // Already highlighted words are left alone.
        assert!(apply_spell_check(&mut doc, &words(&["teh"])).unwrap().is_empty());
    }

    #[test]
    fn test_pattern_escapes_words() {
        let pattern = misspelling_pattern(&words(&["a.b", " "])).unwrap().unwrap();
        assert!(pattern.is_match("x a.b y"));
        assert!(!pattern.is_match("x axb y"));
        assert!(misspelling_pattern(&[]).unwrap().is_none());
    }

    #[test]
    fn test_remove_restores_text_nodes() {
        let mut doc = Document::from_html("<p>teh cat teh</p>");
        apply_spell_check(&mut doc, &words(&["teh"])).unwrap();
        assert_eq!(remove_spell_check(&mut doc).unwrap(), 2);
        let p = doc.first_child(doc.body()).unwrap();
        assert_eq!(doc.children(p).len(), 1);
        assert_eq!(doc.inner_html(doc.body()), "<p>teh cat teh</p>");
    }

    #[test]
    fn test_join_restores_original_nodes() {
        let mut doc = Document::from_html("<p>teh cat teh dog</p><p>teh</p>");
        let body = doc.body();
        let first = doc.text_nodes(body)[0];
        let second = doc.text_nodes(body)[1];
        let highlights = apply_spell_check(&mut doc, &words(&["teh"])).unwrap();
        assert_eq!(highlights.count(), 3);
        // "teh" | " cat " | "teh" | " dog", and the second paragraph unsplit.
        assert_eq!(highlights.splits[0].pieces.len(), 3);
        assert!(highlights.splits[1].pieces.is_empty());

        assert_eq!(join_highlights(&mut doc, &highlights).unwrap(), 2);
        assert_eq!(doc.text_nodes(body), vec![first, second]);
        assert_eq!(doc.inner_html(body), "<p>teh cat teh dog</p><p>teh</p>");
    }

    #[test]
    fn test_join_keeps_edits_to_pieces() {
        let mut doc = Document::from_html("<p>a teh b</p>");
        let highlights = apply_spell_check(&mut doc, &words(&["teh"])).unwrap();
        let word = highlights.splits[0].pieces[0];
        doc.set_text(word, "tehh").unwrap();
        join_highlights(&mut doc, &highlights).unwrap();
        let p = doc.first_child(doc.body()).unwrap();
        assert_eq!(doc.children(p), &[highlights.splits[0].original]);
        assert_eq!(doc.inner_html(p), "a tehh b");
    }

    #[test]
    fn test_correct_highlighted_word() {
        let mut doc = Document::from_html("<p>a teh b</p>");
        let highlights = apply_spell_check(&mut doc, &words(&["teh"])).unwrap();
        selection_codec::restore(&mut doc, Some(SelectionSpan::collapsed(3)));
        let target = correction_target(&doc).unwrap();
        assert_eq!(target, SelectionSpan::new(2, 5));

        join_highlights(&mut doc, &highlights).unwrap();
        correct_spelling(&mut doc, target, "the").unwrap();
        assert_eq!(doc.inner_html(doc.body()), "<p>a the b</p>");
        assert_eq!(selection_codec::save(&doc), Some(SelectionSpan::collapsed(5)));
    }

    #[test]
    fn test_correct_selected_text() {
        let mut doc = Document::from_html("<p>a tehh b</p>");
        selection_codec::restore(&mut doc, Some(SelectionSpan::new(2, 6)));
        let target = correction_target(&doc).unwrap();
        correct_spelling(&mut doc, target, "the").unwrap();
        assert_eq!(doc.inner_html(doc.body()), "<p>a the b</p>");
    }

    #[test]
    fn test_correct_needs_a_target() {
        let mut doc = Document::from_html("<p>plain</p>");
        selection_codec::restore(&mut doc, Some(SelectionSpan::collapsed(2)));
        assert!(matches!(correction_target(&doc), Err(EditorError::NotFound(_))));
    }
}
