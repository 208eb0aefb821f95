//! Attached resources (`en-media`) addressed by content hash.
//!
//! Image resources are `img` elements whose `src` the host fills in from its
//! cache. Other resources render either as a host-composed image or as a
//! generic block with the file name, size, and open/save buttons.

use inkpad_dom::{Document, NodeId};
use serde::{Deserialize, Serialize};

use super::{current_range, place_caret};
use crate::error::{EditorError, Result};
use crate::lookup::Candidates;
use crate::markers::{
    EN_MEDIA, EN_TAG, HASH, OPEN_RESOURCE_BUTTON, SAVE_RESOURCE_BUTTON, SRC, TYPE,
    escape_path_for_attribute, is_image_mime,
};

/// What the host's resource cache knows about one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceInfo {
    pub hash: String,
    pub mime: String,
    pub display_name: String,
    pub display_size: String,
    #[serde(default)]
    pub icon_path: Option<String>,
    #[serde(default)]
    pub file_path: Option<String>,
}

pub fn is_media(doc: &Document, node: NodeId) -> bool {
    doc.attr(node, EN_TAG) == Some(EN_MEDIA)
}

/// Every connected resource element with this hash.
pub fn by_hash(doc: &Document, hash: &str) -> Candidates {
    Candidates::from_vec(doc.find_all(doc.body(), |d, n| {
        is_media(d, n) && d.attr(n, HASH) == Some(hash)
    }))
}

/// Resources in document order.
pub fn all_media(doc: &Document) -> Vec<NodeId> {
    doc.find_all(doc.body(), is_media)
}

/// Insert resource markup in place of the selection.
pub fn insert_resource(doc: &mut Document, html: &str) -> Result<Vec<NodeId>> {
    if html.trim().is_empty() {
        return Err(EditorError::InvalidArgument("resource markup is empty".into()));
    }
    let range = current_range(doc)?;
    let at = doc.delete_range_contents(&range)?;
    let nodes = doc.parse_fragment(html);
    let after = doc.insert_nodes_at(at, &nodes)?;
    place_caret(doc, after);
    Ok(nodes)
}

pub fn remove_resource(doc: &mut Document, hash: &str) -> Result<()> {
    let el = by_hash(doc, hash).unique(format!("resource {hash}"))?;
    doc.remove(el);
    tracing::debug!(target: "inkpad::commands", hash, "resource removed");
    Ok(())
}

/// Set `src` on the first resource element with the hash. Returns whether
/// anything matched; a hash that is no longer present is left alone.
fn set_src_on_winner(doc: &mut Document, hash: &str, path: &str) -> Result<bool> {
    let Some(el) = by_hash(doc, hash).first() else {
        tracing::debug!(target: "inkpad::commands", hash, "no element for resource, src dropped");
        return Ok(false);
    };
    doc.set_attr(el, SRC, escape_path_for_attribute(path))?;
    Ok(true)
}

/// Apply cached file paths to image resources, one winner per hash.
pub fn provide_src_for_resources(doc: &mut Document, sources: &[(String, String)]) -> Result<usize> {
    let mut updated = 0;
    for (hash, path) in sources {
        if set_src_on_winner(doc, hash, path)? {
            updated += 1;
        }
    }
    Ok(updated)
}

pub fn update_image_src(doc: &mut Document, hash: &str, path: &str) -> Result<bool> {
    set_src_on_winner(doc, hash, path)
}

/// A host-composed image for a non-image resource arrived.
pub fn generic_image_received(doc: &mut Document, hash: &str, path: &str) -> Result<bool> {
    let Some(el) = by_hash(doc, hash).first() else {
        return Ok(false);
    };
    if !doc.has_tag(el, "img") {
        return Ok(false);
    }
    doc.set_attr(el, SRC, escape_path_for_attribute(path))?;
    Ok(true)
}

/// Rewrite every element carrying `old_hash`, e.g. after the host edited the
/// resource's data.
pub fn update_resource_hash(doc: &mut Document, old_hash: &str, new_hash: &str) -> Result<usize> {
    let targets = doc.find_all(doc.body(), |d, n| is_media(d, n) && d.attr(n, HASH) == Some(old_hash));
    for &el in &targets {
        doc.set_attr(el, HASH, new_hash)?;
    }
    Ok(targets.len())
}

/// Fill in a generic resource block (or an image's `src`) from cache info.
pub fn apply_resource_info(doc: &mut Document, info: &ResourceInfo) -> Result<bool> {
    let Some(el) = by_hash(doc, &info.hash).first() else {
        return Ok(false);
    };
    if is_image_mime(&info.mime) || doc.has_tag(el, "img") {
        return match info.file_path.as_deref() {
            Some(path) => {
                doc.set_attr(el, SRC, escape_path_for_attribute(path))?;
                Ok(true)
            }
            None => Ok(false),
        };
    }
    if doc.attr(el, TYPE).is_none() {
        doc.set_attr(el, TYPE, info.mime.as_str())?;
    }
    let mut parts = Vec::new();
    if let Some(icon) = info.icon_path.as_deref() {
        let img = doc.create_element("img");
        doc.set_attr(img, "class", "resource-icon")?;
        doc.set_attr(img, SRC, escape_path_for_attribute(icon))?;
        parts.push(img);
    }
    for (class, text) in [
        ("resource-name", info.display_name.as_str()),
        ("resource-size", info.display_size.as_str()),
    ] {
        let span = doc.create_element("span");
        doc.set_attr(span, "class", class)?;
        let t = doc.create_text(text);
        doc.append_child(span, t)?;
        parts.push(span);
    }
    for class in [OPEN_RESOURCE_BUTTON, SAVE_RESOURCE_BUTTON] {
        let button = doc.create_element("img");
        doc.set_attr(button, "class", class)?;
        parts.push(button);
    }
    doc.set_children(el, &parts)?;
    Ok(true)
}
