//! To-do checkboxes, identified by `en-todo-id` and drawn from their class.

use inkpad_dom::{Document, NodeId};

use crate::error::Result;
use crate::lookup;
use crate::markers::{CHECKBOX_CHECKED, CHECKBOX_UNCHECKED, TODO_ID};

pub fn is_checkbox(doc: &Document, node: NodeId) -> bool {
    doc.has_class(node, CHECKBOX_CHECKED) || doc.has_class(node, CHECKBOX_UNCHECKED)
}

pub fn is_checked(doc: &Document, node: NodeId) -> bool {
    doc.has_class(node, CHECKBOX_CHECKED)
}

pub fn todo_id(doc: &Document, node: NodeId) -> Option<u64> {
    doc.attr(node, TODO_ID).and_then(|v| v.trim().parse().ok())
}

/// Toggle the checkbox `id`. Returns the new state.
pub fn flip_todo(doc: &mut Document, id: u64) -> Result<bool> {
    let checkbox = lookup::by_attr(doc, TODO_ID, &id.to_string()).unique(format!("to-do {id}"))?;
    let checked = !is_checked(doc, checkbox);
    let (from, to) = if checked {
        (CHECKBOX_UNCHECKED, CHECKBOX_CHECKED)
    } else {
        (CHECKBOX_CHECKED, CHECKBOX_UNCHECKED)
    };
    doc.remove_class(checkbox, from)?;
    doc.add_class(checkbox, to)?;
    tracing::debug!(target: "inkpad::commands", id, checked, "to-do flipped");
    Ok(checked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EditorError;

    #[test]
    fn test_flip_round_trip() {
        let mut doc = Document::from_html(r#"<img class="checkbox_unchecked" en-todo-id="3">task"#);
        let checkbox = doc.first_child(doc.body()).unwrap();
        assert!(flip_todo(&mut doc, 3).unwrap());
        assert_eq!(doc.attr(checkbox, "class"), Some("checkbox_checked"));
        assert!(!flip_todo(&mut doc, 3).unwrap());
        assert_eq!(doc.attr(checkbox, "class"), Some("checkbox_unchecked"));
        assert_eq!(todo_id(&doc, checkbox), Some(3));
        assert!(matches!(flip_todo(&mut doc, 9), Err(EditorError::NotFound(_))));
    }
}
