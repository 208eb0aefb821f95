//! Resizable image resources.
//!
//! The renderer draws resize handles around a `div.ui-wrapper` that hugs the
//! image. The wrapper is page chrome and never part of the saved note.

use inkpad_dom::{Document, NodeId, format_px};

use super::resource::by_hash;
use crate::error::{EditorError, Result};
use crate::ledger::{GeometrySnapshot, Revertible};
use crate::markers::RESIZE_WRAPPER_CLASS;

pub fn is_resize_wrapper(doc: &Document, node: NodeId) -> bool {
    doc.has_tag(node, "div") && doc.has_class(node, RESIZE_WRAPPER_CLASS)
}

/// The image resource with this hash.
pub fn resizable_image(doc: &Document, hash: &str) -> Result<NodeId> {
    let image = by_hash(doc, hash).unique(format!("image resource {hash}"))?;
    if !doc.has_tag(image, "img") {
        return Err(EditorError::InvalidArgument(format!("resource {hash} is not an image")));
    }
    Ok(image)
}

/// The wrapper around `image`, created at the image's current size if
/// missing.
pub fn ensure_wrapper(doc: &mut Document, image: NodeId) -> Result<NodeId> {
    if let Some(parent) = doc.parent(image).filter(|&p| is_resize_wrapper(doc, p)) {
        return Ok(parent);
    }
    let current = GeometrySnapshot::current(doc, image, None);
    let wrapper = doc.wrap_nodes(&[image], "div")?;
    doc.set_attr(wrapper, "class", RESIZE_WRAPPER_CLASS)?;
    doc.set_style_property(wrapper, "width", &format_px(current.width))?;
    doc.set_style_property(wrapper, "height", &format_px(current.height))?;
    Ok(wrapper)
}

/// Resize the image with `hash`. Returns its geometry from before the change.
pub fn resize_image(doc: &mut Document, hash: &str, width: f64, height: f64) -> Result<GeometrySnapshot> {
    if width <= 0.0 || height <= 0.0 {
        return Err(EditorError::InvalidArgument(format!(
            "image size must be positive, got {width}x{height}"
        )));
    }
    let image = resizable_image(doc, hash)?;
    let wrapper = ensure_wrapper(doc, image)?;
    let before = GeometrySnapshot::current(doc, image, Some(wrapper));
    GeometrySnapshot {
        image,
        wrapper: Some(wrapper),
        width,
        height,
    }
    .apply(doc)?;
    tracing::debug!(target: "inkpad::commands", hash, width, height, "image resized");
    Ok(before)
}
