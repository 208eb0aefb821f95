//! Inline `style` declarations and `class` tokens.

use crate::document::Document;
use crate::error::DomError;
use crate::node::NodeId;

/// Parse `name: value; name: value` into ordered pairs. Property names are
/// lower-cased, values trimmed.
pub fn parse_declarations(style: &str) -> Vec<(String, String)> {
    style
        .split(';')
        .filter_map(|decl| {
            let (name, value) = decl.split_once(':')?;
            let name = name.trim().to_ascii_lowercase();
            if name.is_empty() {
                return None;
            }
            Some((name, value.trim().to_string()))
        })
        .collect()
}

pub fn serialize_declarations(decls: &[(String, String)]) -> String {
    decls
        .iter()
        .map(|(n, v)| format!("{n}: {v};"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse a CSS length in pixels, e.g. `"120px"` or `"120"`.
pub fn parse_px(value: &str) -> Option<f64> {
    let v = value.trim();
    let v = v.strip_suffix("px").unwrap_or(v).trim();
    v.parse::<f64>().ok()
}

/// Format a pixel value with at most three decimals and no trailing zeros.
pub fn format_px(value: f64) -> String {
    let mut s = format!("{value:.3}");
    while s.ends_with('0') {
        s.pop();
    }
    if s.ends_with('.') {
        s.pop();
    }
    format!("{s}px")
}

impl Document {
    pub fn style_property(&self, id: NodeId, name: &str) -> Option<String> {
        let style = self.attr(id, "style")?;
        parse_declarations(style)
            .into_iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    pub fn set_style_property(&mut self, id: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        let mut decls = parse_declarations(self.attr(id, "style").unwrap_or_default());
        let name = name.to_ascii_lowercase();
        match decls.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value.to_string(),
            None => decls.push((name, value.to_string())),
        }
        self.set_attr(id, "style", serialize_declarations(&decls))
    }

    /// Remove one declaration; drops the attribute when nothing is left.
    pub fn remove_style_property(&mut self, id: NodeId, name: &str) -> Result<(), DomError> {
        let Some(style) = self.attr(id, "style") else {
            return Ok(());
        };
        let mut decls = parse_declarations(style);
        let before = decls.len();
        decls.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        if decls.len() == before {
            return Ok(());
        }
        if decls.is_empty() {
            self.remove_attr(id, "style").map(|_| ())
        } else {
            self.set_attr(id, "style", serialize_declarations(&decls))
        }
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.attr(id, "class")
            .is_some_and(|c| c.split_ascii_whitespace().any(|t| t == class))
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) -> Result<(), DomError> {
        if self.has_class(id, class) {
            return Ok(());
        }
        let value = match self.attr(id, "class") {
            Some(c) if !c.trim().is_empty() => format!("{} {class}", c.trim()),
            _ => class.to_string(),
        };
        self.set_attr(id, "class", value)
    }

    pub fn remove_class(&mut self, id: NodeId, class: &str) -> Result<(), DomError> {
        let Some(current) = self.attr(id, "class") else {
            return Ok(());
        };
        if !current.split_ascii_whitespace().any(|t| t == class) {
            return Ok(());
        }
        let value = current
            .split_ascii_whitespace()
            .filter(|t| *t != class)
            .collect::<Vec<_>>()
            .join(" ");
        self.set_attr(id, "class", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_style_property_round_trip() {
        let mut doc = Document::from_html(r#"<td style="width:120px;PADDING: 10px">x</td>"#);
        let td = doc.first_child(doc.body()).unwrap();
        assert_eq!(doc.style_property(td, "width").as_deref(), Some("120px"));
        doc.set_style_property(td, "width", "90px").unwrap();
        assert_eq!(doc.attr(td, "style"), Some("width: 90px; padding: 10px;"));
        doc.remove_style_property(td, "width").unwrap();
        doc.remove_style_property(td, "padding").unwrap();
        assert_eq!(doc.attr(td, "style"), None);
    }

    #[test]
    fn test_px_formatting() {
        assert_eq!(parse_px(" 120px "), Some(120.0));
        assert_eq!(parse_px("50%"), None);
        assert_eq!(format_px(90.0), "90px");
        assert_eq!(format_px(100.0 / 3.0), "33.333px");
        assert_eq!(format_px(12.5), "12.5px");
    }

    #[test]
    fn test_class_tokens() {
        let mut doc = Document::from_html(r#"<img class="en-crypt  hvr-border-color">"#);
        let img = doc.first_child(doc.body()).unwrap();
        assert!(doc.has_class(img, "en-crypt"));
        assert!(!doc.has_class(img, "en"));
        doc.remove_class(img, "en-crypt").unwrap();
        doc.add_class(img, "checked").unwrap();
        assert_eq!(doc.attr(img, "class"), Some("hvr-border-color checked"));
    }
}
