//! Find, replace, and replace-all over the body's plain text.
//!
//! Matching works on characters of the flattened body text, so a match may
//! span several text nodes and inline elements, but never two blocks or
//! lines.

use inkpad_dom::Document;

use super::{current_range, place_caret};
use crate::error::{EditorError, Result};
use crate::selection_codec::{self, BodyText, SelectionSpan};

fn same_char(a: char, b: char, match_case: bool) -> bool {
    a == b || (!match_case && a.to_lowercase().eq(b.to_lowercase()))
}

fn matches_at(haystack: &[char], needle: &[char], at: usize, match_case: bool) -> bool {
    haystack.len() >= at + needle.len()
        && haystack[at..at + needle.len()]
            .iter()
            .zip(needle)
            .all(|(&a, &b)| same_char(a, b, match_case))
}

fn search(body: &BodyText, needle: &[char], from: usize, match_case: bool) -> Option<usize> {
    if needle.len() > body.len() {
        return None;
    }
    (from..=body.len() - needle.len())
        .find(|&i| matches_at(&body.chars, needle, i, match_case) && !body.crosses_break(i, i + needle.len()))
}

fn needle(text: &str) -> Result<Vec<char>> {
    if text.is_empty() {
        return Err(EditorError::InvalidArgument("search text is empty".into()));
    }
    Ok(text.chars().collect())
}

/// Whether the selected text is exactly `text`.
pub fn selection_matches(doc: &Document, text: &str, match_case: bool) -> bool {
    let (Some(range), Some(span)) = (doc.selection(), selection_codec::save(doc)) else {
        return false;
    };
    if BodyText::of(doc).crosses_break(span.start, span.end) {
        return false;
    }
    let selected: Vec<char> = doc.range_text(&range).chars().collect();
    let wanted: Vec<char> = text.chars().collect();
    selected.len() == wanted.len() && matches_at(&selected, &wanted, 0, match_case)
}

/// Select the next occurrence after the selection, wrapping to the top.
pub fn find(doc: &mut Document, text: &str, match_case: bool) -> Result<bool> {
    let wanted = needle(text)?;
    let body = BodyText::of(doc);
    let from = selection_codec::save(doc).map_or(0, |s| s.end);
    let hit = search(&body, &wanted, from, match_case).or_else(|| search(&body, &wanted, 0, match_case));
    match hit {
        Some(at) => {
            selection_codec::restore(doc, Some(SelectionSpan::new(at, at + wanted.len())));
            Ok(true)
        }
        None => {
            tracing::debug!(target: "inkpad::commands", text, "no match");
            Ok(false)
        }
    }
}

fn replace_selection(doc: &mut Document, replacement: &str) -> Result<()> {
    let range = current_range(doc)?;
    let at = doc.delete_range_contents(&range)?;
    let after = if replacement.is_empty() {
        at
    } else {
        doc.insert_text_at(at, replacement)?
    };
    place_caret(doc, after);
    Ok(())
}

/// Replace the selection if it already holds the search text, otherwise the
/// next occurrence.
pub fn replace(doc: &mut Document, text: &str, replacement: &str, match_case: bool) -> Result<()> {
    if !selection_matches(doc, text, match_case) && !find(doc, text, match_case)? {
        return Err(EditorError::NotFound(format!("text {text:?}")));
    }
    replace_selection(doc, replacement)
}

/// Replace every occurrence from the top of the body down. Text inserted by a
/// replacement is never searched again. Returns the number of replacements.
pub fn replace_all(doc: &mut Document, text: &str, replacement: &str, match_case: bool) -> Result<usize> {
    let wanted = needle(text)?;
    let step = replacement.chars().count();
    let mut cursor = 0;
    let mut count = 0;
    while let Some(at) = search(&BodyText::of(doc), &wanted, cursor, match_case) {
        selection_codec::restore(doc, Some(SelectionSpan::new(at, at + wanted.len())));
        replace_selection(doc, replacement)?;
        cursor = at + step;
        count += 1;
    }
    tracing::debug!(target: "inkpad::commands", text, count, "replaced all");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selected(doc: &Document) -> String {
        doc.range_text(&doc.selection().unwrap())
    }

    #[test]
    fn test_find_moves_forward_and_wraps() {
        let mut doc = Document::from_html("<p>Cat and <b>cat</b></p>");
        assert!(find(&mut doc, "cat", true).unwrap());
        assert_eq!(selection_codec::save(&doc), Some(SelectionSpan::new(8, 11)));

        assert!(find(&mut doc, "cat", false).unwrap());
        assert_eq!(selection_codec::save(&doc), Some(SelectionSpan::new(0, 3)));
        assert_eq!(selected(&doc), "Cat");

        assert!(!find(&mut doc, "dog", false).unwrap());
        assert!(find(&mut doc, "", false).is_err());
    }

    #[test]
    fn test_replace_relocates_when_selection_differs() {
        let mut doc = Document::from_html("<p>one two one</p>");
        selection_codec::restore(&mut doc, Some(SelectionSpan::new(4, 7)));
        replace(&mut doc, "one", "1", true).unwrap();
        assert_eq!(doc.inner_html(doc.body()), "<p>one two 1</p>");

        replace(&mut doc, "ONE", "1", false).unwrap();
        assert_eq!(doc.inner_html(doc.body()), "<p>1 two 1</p>");
        assert!(matches!(replace(&mut doc, "one", "1", false), Err(EditorError::NotFound(_))));
    }

    #[test]
    fn test_replace_all_counts() {
        let mut doc = Document::from_html("<p>cat cat cat</p>");
        assert_eq!(replace_all(&mut doc, "cat", "dog", true).unwrap(), 3);
        assert_eq!(doc.inner_html(doc.body()), "<p>dog dog dog</p>");
    }

    #[test]
    fn test_matches_stay_inside_one_block() {
        let mut doc = Document::from_html("<p>cat</p><p>dog</p>");
        assert!(!find(&mut doc, "tdo", true).unwrap());
        assert_eq!(replace_all(&mut doc, "tdo", "X", true).unwrap(), 0);
        assert_eq!(doc.inner_html(doc.body()), "<p>cat</p><p>dog</p>");

        selection_codec::restore(&mut doc, Some(SelectionSpan::new(2, 5)));
        assert!(!selection_matches(&doc, "tdo", true));
        assert!(matches!(replace(&mut doc, "tdo", "X", true), Err(EditorError::NotFound(_))));

        assert_eq!(replace_all(&mut doc, "o", "0", true).unwrap(), 1);
        assert_eq!(doc.inner_html(doc.body()), "<p>cat</p><p>d0g</p>");
    }

    #[test]
    fn test_replace_all_does_not_rescan_replacements() {
        let mut doc = Document::from_html("<p>a-a</p>");
        assert_eq!(replace_all(&mut doc, "a", "aa", true).unwrap(), 2);
        assert_eq!(doc.text_content(doc.body()), "aa-aa");
    }
}
