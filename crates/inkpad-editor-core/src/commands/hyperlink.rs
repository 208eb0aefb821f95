//! Hyperlinks addressed by their `en-hyperlink-id`.

use inkpad_dom::{Document, NodeId};

use super::{current_range, place_caret};
use crate::error::{EditorError, Result};
use crate::lookup::{self, Candidates};
use crate::markers::HYPERLINK_ID;

fn find(doc: &Document, id: u64) -> Candidates {
    lookup::by_attr(doc, HYPERLINK_ID, &id.to_string())
}

/// The one link with this id. Zero or several is an error.
pub fn unique(doc: &Document, id: u64) -> Result<NodeId> {
    find(doc, id).unique(format!("hyperlink {id}"))
}

/// Replace the selection with a new link. The link text is `text`, else the
/// selected text, else the address itself.
pub fn set_hyperlink(doc: &mut Document, id: u64, href: &str, text: Option<&str>) -> Result<NodeId> {
    if find(doc, id).first().is_some() {
        return Err(EditorError::AlreadyExists(format!("hyperlink {id}")));
    }
    let range = current_range(doc)?;
    let label = match text {
        Some(t) if !t.is_empty() => t.to_string(),
        _ => {
            let selected = doc.range_text(&range);
            if selected.is_empty() { href.to_string() } else { selected }
        }
    };
    let link = doc.create_element("a");
    doc.set_attr(link, "href", href)?;
    doc.set_attr(link, HYPERLINK_ID, id.to_string())?;
    let label = doc.create_text(label);
    doc.append_child(link, label)?;

    let at = doc.delete_range_contents(&range)?;
    let after = doc.insert_nodes_at(at, &[link])?;
    place_caret(doc, after);
    tracing::debug!(target: "inkpad::commands", id, href, "hyperlink set");
    Ok(link)
}

/// Point an existing link somewhere else, optionally relabelling it.
pub fn replace_hyperlink(doc: &mut Document, id: u64, href: &str, text: Option<&str>) -> Result<NodeId> {
    let link = unique(doc, id)?;
    doc.set_attr(link, "href", href)?;
    if let Some(text) = text.filter(|t| !t.is_empty()) {
        let label = doc.create_text(text);
        doc.set_children(link, &[label])?;
    }
    Ok(link)
}

/// Remove a link. `completely` drops its text too; otherwise the text stays
/// where it was.
pub fn remove_hyperlink(doc: &mut Document, id: u64, completely: bool) -> Result<()> {
    let link = unique(doc, id)?;
    if completely {
        doc.remove(link);
    } else {
        doc.unwrap_node(link)?;
    }
    tracing::debug!(target: "inkpad::commands", id, completely, "hyperlink removed");
    Ok(())
}
