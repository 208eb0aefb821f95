//! Element lookup by identifying attribute.

use inkpad_dom::{Document, NodeId};

use crate::error::{EditorError, Result};

/// Result of a lookup that may match several elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidates {
    None,
    One(NodeId),
    Many(Vec<NodeId>),
}

impl Candidates {
    pub fn from_vec(mut found: Vec<NodeId>) -> Self {
        match found.len() {
            0 => Candidates::None,
            1 => Candidates::One(found.remove(0)),
            _ => Candidates::Many(found),
        }
    }

    /// Lenient policy: the first match in document order wins.
    pub fn first(&self) -> Option<NodeId> {
        match self {
            Candidates::None => None,
            Candidates::One(id) => Some(*id),
            Candidates::Many(ids) => ids.first().copied(),
        }
    }

    /// Strict policy: exactly one match or an error naming `what`.
    pub fn unique(self, what: impl Into<String>) -> Result<NodeId> {
        match self {
            Candidates::One(id) => Ok(id),
            Candidates::None => Err(EditorError::NotFound(what.into())),
            Candidates::Many(ids) => Err(EditorError::Ambiguous {
                what: what.into(),
                count: ids.len(),
            }),
        }
    }
}

/// Connected elements under the body whose `name` attribute equals `value`.
pub fn by_attr(doc: &Document, name: &str, value: &str) -> Candidates {
    Candidates::from_vec(doc.find_all(doc.body(), |d, n| d.attr(n, name) == Some(value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policies() {
        let doc = Document::from_html(r#"<a en-hyperlink-id="1">x</a><a en-hyperlink-id="1">y</a>"#);
        let found = by_attr(&doc, "en-hyperlink-id", "1");
        assert!(matches!(found, Candidates::Many(ref v) if v.len() == 2));
        assert_eq!(found.first(), Some(doc.children(doc.body())[0]));
        let err = found.unique("hyperlink 1").unwrap_err();
        assert!(matches!(err, EditorError::Ambiguous { count: 2, .. }));
        assert!(matches!(
            by_attr(&doc, "en-hyperlink-id", "2").unique("hyperlink 2"),
            Err(EditorError::NotFound(_))
        ));
    }
}
