//! Entry types stored in the ledgers.

use inkpad_dom::{Document, MutationRecord, NodeId, format_px, parse_px};
use smol_str::SmolStr;

use super::Revertible;
use crate::error::Result;

/// Node-level state: one text value, one attribute, or one child list.
///
/// Child lists hold the actual node handles, so putting one back reattaches
/// the very nodes that were there, and later entries that point inside them
/// keep working.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeSnapshot {
    Text {
        node: NodeId,
        text: String,
    },
    Attribute {
        node: NodeId,
        name: SmolStr,
        value: Option<String>,
    },
    Children {
        node: NodeId,
        children: Vec<NodeId>,
    },
}

impl NodeSnapshot {
    /// The prior state a mutation record describes.
    pub fn from_record(record: &MutationRecord) -> Self {
        match record {
            MutationRecord::CharacterData {
                target, old_value, ..
            } => NodeSnapshot::Text {
                node: *target,
                text: old_value.clone(),
            },
            MutationRecord::Attribute {
                target,
                name,
                old_value,
                ..
            } => NodeSnapshot::Attribute {
                node: *target,
                name: name.clone(),
                value: old_value.clone(),
            },
            MutationRecord::ChildList {
                target,
                old_children,
            } => NodeSnapshot::Children {
                node: *target,
                children: old_children.clone(),
            },
        }
    }
}

impl Revertible for NodeSnapshot {
    fn target(&self) -> NodeId {
        match self {
            NodeSnapshot::Text { node, .. }
            | NodeSnapshot::Attribute { node, .. }
            | NodeSnapshot::Children { node, .. } => *node,
        }
    }

    fn capture(&self, doc: &Document) -> Self {
        match self {
            NodeSnapshot::Text { node, .. } => NodeSnapshot::Text {
                node: *node,
                text: doc.text(*node).unwrap_or_default().to_string(),
            },
            NodeSnapshot::Attribute { node, name, .. } => NodeSnapshot::Attribute {
                node: *node,
                name: name.clone(),
                value: doc.attr(*node, name).map(str::to_string),
            },
            NodeSnapshot::Children { node, .. } => NodeSnapshot::Children {
                node: *node,
                children: doc.children(*node).to_vec(),
            },
        }
    }

    fn apply(&self, doc: &mut Document) -> Result<()> {
        match self {
            NodeSnapshot::Text { node, text } => doc.set_text(*node, text.clone())?,
            NodeSnapshot::Attribute { node, name, value } => {
                doc.restore_attr(*node, name, value.as_deref())?
            }
            NodeSnapshot::Children { node, children } => doc.set_children(*node, children)?,
        }
        Ok(())
    }

    fn nodes(&self) -> Vec<NodeId> {
        match self {
            NodeSnapshot::Children { node, children } => {
                std::iter::once(*node).chain(children.iter().copied()).collect()
            }
            other => vec![other.target()],
        }
    }
}

/// Serialized content of a container, put back wholesale.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkupSnapshot {
    pub target: NodeId,
    pub markup: String,
}

impl MarkupSnapshot {
    pub fn new(target: NodeId, markup: String) -> Self {
        Self { target, markup }
    }

    pub fn of(doc: &Document, target: NodeId) -> Self {
        Self::new(target, doc.inner_html(target))
    }
}

impl Revertible for MarkupSnapshot {
    fn target(&self) -> NodeId {
        self.target
    }

    fn is_empty(&self) -> bool {
        self.markup.trim().is_empty()
    }

    fn capture(&self, doc: &Document) -> Self {
        Self::of(doc, self.target)
    }

    fn apply(&self, doc: &mut Document) -> Result<()> {
        doc.set_inner_html(self.target, &self.markup)?;
        Ok(())
    }
}

/// Size of a resizable image. Applying it moves the image and its resize
/// wrapper by the same delta.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometrySnapshot {
    pub image: NodeId,
    pub wrapper: Option<NodeId>,
    pub width: f64,
    pub height: f64,
}

impl GeometrySnapshot {
    pub fn current(doc: &Document, image: NodeId, wrapper: Option<NodeId>) -> Self {
        let (width, height) = image_size(doc, image);
        Self {
            image,
            wrapper,
            width,
            height,
        }
    }
}

/// Width and height from the attributes, falling back to inline style.
pub(crate) fn image_size(doc: &Document, image: NodeId) -> (f64, f64) {
    let dim = |name: &str| {
        doc.attr(image, name)
            .and_then(parse_px)
            .or_else(|| doc.style_property(image, name).as_deref().and_then(parse_px))
            .unwrap_or(0.0)
    };
    (dim("width"), dim("height"))
}

/// `format_px` without the unit, for presentational attributes.
pub(crate) fn format_dimension(value: f64) -> String {
    let px = format_px(value);
    px.trim_end_matches("px").to_string()
}

impl Revertible for GeometrySnapshot {
    fn target(&self) -> NodeId {
        self.image
    }

    fn capture(&self, doc: &Document) -> Self {
        Self::current(doc, self.image, self.wrapper)
    }

    fn nodes(&self) -> Vec<NodeId> {
        std::iter::once(self.image).chain(self.wrapper).collect()
    }

    fn apply(&self, doc: &mut Document) -> Result<()> {
        let (cur_w, cur_h) = image_size(doc, self.image);
        let (dw, dh) = (self.width - cur_w, self.height - cur_h);
        doc.set_attr(self.image, "width", format_dimension(self.width))?;
        doc.set_attr(self.image, "height", format_dimension(self.height))?;
        if let Some(wrapper) = self.wrapper.filter(|w| doc.is_connected(*w)) {
            for (prop, base, delta) in [("width", cur_w, dw), ("height", cur_h, dh)] {
                let current = doc
                    .style_property(wrapper, prop)
                    .as_deref()
                    .and_then(parse_px)
                    .unwrap_or(base);
                doc.set_style_property(wrapper, prop, &format_px(current + delta))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_moves_wrapper_in_lockstep() {
        let mut doc = Document::from_html(
            r#"<div class="ui-wrapper" style="width: 110px; height: 60px;"><img hash="h" width="100" height="50"></div>"#,
        );
        let wrapper = doc.first_child(doc.body()).unwrap();
        let img = doc.first_child(wrapper).unwrap();
        let target = GeometrySnapshot {
            image: img,
            wrapper: Some(wrapper),
            width: 200.0,
            height: 75.5,
        };
        let prior = target.capture(&doc);
        target.apply(&mut doc).unwrap();
        assert_eq!(doc.attr(img, "width"), Some("200"));
        assert_eq!(doc.attr(img, "height"), Some("75.5"));
        assert_eq!(doc.style_property(wrapper, "width").as_deref(), Some("210px"));
        assert_eq!(doc.style_property(wrapper, "height").as_deref(), Some("85.5px"));

        prior.apply(&mut doc).unwrap();
        assert_eq!(doc.attr(img, "width"), Some("100"));
        assert_eq!(doc.style_property(wrapper, "width").as_deref(), Some("110px"));
        assert_eq!(doc.style_property(wrapper, "height").as_deref(), Some("60px"));
    }

    #[test]
    fn test_empty_markup_is_empty_payload() {
        let doc = Document::from_html("<table></table>");
        let table = doc.first_child(doc.body()).unwrap();
        assert!(MarkupSnapshot::of(&doc, table).is_empty());
    }
}
