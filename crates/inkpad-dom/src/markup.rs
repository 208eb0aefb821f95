//! Fragment parsing and serialization.
//!
//! The tokenizer covers what an editable body actually contains: elements with
//! quoted or bare attributes, void and self-closing tags, comments, raw text in
//! `script`/`style`, and the common named plus numeric character references.
//! Doctypes are skipped and unmatched end tags are ignored. It is not an HTML5
//! tree builder: no implied `tbody`, no adoption agency.

use memchr::memchr;

use crate::document::Document;
use crate::error::DomError;
use crate::node::{Attribute, NodeId, NodeKind};

const COMMENT_START: &str = "<!--";
const COMMENT_END: &str = "-->";

pub fn is_void_element(name: &str) -> bool {
    matches!(
        name,
        "area"
            | "base"
            | "br"
            | "col"
            | "embed"
            | "hr"
            | "img"
            | "input"
            | "link"
            | "meta"
            | "param"
            | "source"
            | "track"
            | "wbr"
    )
}

fn is_raw_text_element(name: &str) -> bool {
    matches!(name, "script" | "style")
}

#[derive(Debug, PartialEq)]
enum Token {
    Start {
        name: String,
        attrs: Vec<(String, String)>,
        self_closing: bool,
    },
    End(String),
    Text(String),
    Comment(String),
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b':' | b'.')
}

fn find_ignore_ascii_case(haystack: &str, needle: &str) -> Option<usize> {
    let hay = haystack.as_bytes();
    let pat = needle.as_bytes();
    let mut i = 0;
    while i + pat.len() <= hay.len() {
        let rel = memchr(pat[0], &hay[i..])?;
        i += rel;
        if i + pat.len() <= hay.len() && hay[i..i + pat.len()].eq_ignore_ascii_case(pat) {
            return Some(i);
        }
        i += 1;
    }
    None
}

fn tokenize(input: &str) -> Vec<Token> {
    let bytes = input.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'<' {
            let end = memchr(b'<', &bytes[i..]).map_or(bytes.len(), |rel| i + rel);
            let decoded = decode_entities(&input[i..end]);
            if !decoded.is_empty() {
                out.push(Token::Text(decoded));
            }
            i = end;
            continue;
        }

        let rest = &input[i..];
        if rest.starts_with(COMMENT_START) {
            let body = &rest[COMMENT_START.len()..];
            match body.find(COMMENT_END) {
                Some(end) => {
                    out.push(Token::Comment(body[..end].to_string()));
                    i += COMMENT_START.len() + end + COMMENT_END.len();
                }
                None => {
                    out.push(Token::Comment(body.to_string()));
                    i = bytes.len();
                }
            }
            continue;
        }
        if rest.len() >= 2 && (bytes[i + 1] == b'!' || bytes[i + 1] == b'?') {
            // doctype or processing instruction
            i = memchr(b'>', &bytes[i..]).map_or(bytes.len(), |rel| i + rel + 1);
            continue;
        }

        if rest.len() >= 2 && bytes[i + 1] == b'/' {
            let start = i + 2;
            let mut j = start;
            while j < bytes.len() && is_name_byte(bytes[j]) {
                j += 1;
            }
            let name = input[start..j].to_ascii_lowercase();
            j = memchr(b'>', &bytes[j..]).map_or(bytes.len(), |rel| j + rel + 1);
            if !name.is_empty() {
                out.push(Token::End(name));
            }
            i = j;
            continue;
        }

        let start = i + 1;
        let mut j = start;
        while j < bytes.len() && is_name_byte(bytes[j]) {
            j += 1;
        }
        if j == start {
            // A lone '<' is text.
            out.push(Token::Text("<".to_string()));
            i += 1;
            continue;
        }
        let name = input[start..j].to_ascii_lowercase();
        let (attrs, self_closing, after) = scan_attributes(input, j);
        i = after;

        let raw = is_raw_text_element(&name) && !self_closing;
        out.push(Token::Start {
            name: name.clone(),
            attrs,
            self_closing,
        });
        if raw {
            let close = format!("</{name}");
            let body = &input[i..];
            let end = find_ignore_ascii_case(body, &close).unwrap_or(body.len());
            if end > 0 {
                out.push(Token::Text(body[..end].to_string()));
            }
            i += end;
        }
    }
    out
}

/// Scan attributes from `pos` up to and including the closing `>`.
fn scan_attributes(input: &str, mut pos: usize) -> (Vec<(String, String)>, bool, usize) {
    let bytes = input.as_bytes();
    let mut attrs: Vec<(String, String)> = Vec::new();
    let mut self_closing = false;
    loop {
        while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        if pos >= bytes.len() {
            return (attrs, self_closing, pos);
        }
        match bytes[pos] {
            b'>' => return (attrs, self_closing, pos + 1),
            b'/' => {
                self_closing = true;
                pos += 1;
                continue;
            }
            _ => {}
        }
        self_closing = false;

        let name_start = pos;
        while pos < bytes.len()
            && !bytes[pos].is_ascii_whitespace()
            && !matches!(bytes[pos], b'=' | b'>' | b'/')
        {
            pos += 1;
        }
        let name = input[name_start..pos].to_ascii_lowercase();
        while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }

        let mut value = String::new();
        if pos < bytes.len() && bytes[pos] == b'=' {
            pos += 1;
            while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
                pos += 1;
            }
            if pos < bytes.len() && (bytes[pos] == b'"' || bytes[pos] == b'\'') {
                let quote = bytes[pos];
                let vstart = pos + 1;
                let vend = memchr(quote, &bytes[vstart..]).map_or(bytes.len(), |rel| vstart + rel);
                value = decode_entities(&input[vstart..vend]);
                pos = (vend + 1).min(bytes.len());
            } else {
                let vstart = pos;
                while pos < bytes.len() && !bytes[pos].is_ascii_whitespace() && bytes[pos] != b'>' {
                    pos += 1;
                }
                value = decode_entities(&input[vstart..pos]);
            }
        }

        if name.is_empty() {
            pos += 1;
            continue;
        }
        // First occurrence wins.
        if !attrs.iter().any(|(n, _)| *n == name) {
            attrs.push((name, value));
        }
    }
}

/// Decode `&amp; &lt; &gt; &quot; &apos; &nbsp;` and well-formed numeric
/// references. Anything else passes through unchanged.
pub(crate) fn decode_entities(s: &str) -> String {
    if memchr(b'&', s.as_bytes()).is_none() {
        return s.to_string();
    }
    const NAMED: &[(&str, char)] = &[
        ("&amp;", '&'),
        ("&lt;", '<'),
        ("&gt;", '>'),
        ("&quot;", '"'),
        ("&apos;", '\''),
        ("&nbsp;", '\u{a0}'),
    ];
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        if let Some((pat, ch)) = NAMED.iter().find(|(pat, _)| rest.starts_with(pat)) {
            out.push(*ch);
            rest = &rest[pat.len()..];
            continue;
        }
        if let Some((ch, consumed)) = decode_numeric(rest) {
            out.push(ch);
            rest = &rest[consumed..];
            continue;
        }
        out.push('&');
        rest = &rest[1..];
    }
    out.push_str(rest);
    out
}

fn decode_numeric(s: &str) -> Option<(char, usize)> {
    let body = s.strip_prefix("&#")?;
    let (digits, radix, prefix) = match body.strip_prefix(['x', 'X']) {
        Some(hex) => (hex, 16, 3),
        None => (body, 10, 2),
    };
    let semi = digits.find(';')?;
    if semi == 0 || semi > 7 {
        return None;
    }
    let value = u32::from_str_radix(&digits[..semi], radix).ok()?;
    let ch = char::from_u32(value)?;
    Some((ch, prefix + semi + 1))
}

pub(crate) fn escape_text(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            c => out.push(c),
        }
    }
}

pub(crate) fn escape_attr(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            c => out.push(c),
        }
    }
}

pub(crate) fn write_start_tag(name: &str, attrs: &[Attribute], out: &mut String) {
    out.push('<');
    out.push_str(name);
    for attr in attrs {
        out.push(' ');
        out.push_str(&attr.name);
        out.push_str("=\"");
        escape_attr(&attr.value, out);
        out.push('"');
    }
    out.push('>');
}

impl Document {
    /// Parse markup into detached nodes, returning the top-level ones in order.
    pub fn parse_fragment(&mut self, html: &str) -> Vec<NodeId> {
        let mut top: Vec<NodeId> = Vec::new();
        let mut stack: Vec<(NodeId, String)> = Vec::new();

        for token in tokenize(html) {
            let node = match token {
                Token::Start {
                    name,
                    attrs,
                    self_closing,
                } => {
                    let el = self.create_element(&name);
                    for (k, v) in attrs {
                        // Fresh, detached element: cannot fail or record.
                        let _ = self.set_attr(el, &k, v);
                    }
                    self.attach_parsed(&stack, &mut top, el);
                    if !self_closing && !is_void_element(&name) {
                        stack.push((el, name));
                    }
                    continue;
                }
                Token::End(name) => {
                    if let Some(pos) = stack.iter().rposition(|(_, n)| *n == name) {
                        stack.truncate(pos);
                    } else {
                        tracing::trace!(target: "inkpad::markup", %name, "ignoring unmatched end tag");
                    }
                    continue;
                }
                Token::Text(text) => self.create_text(text),
                Token::Comment(text) => self.create_comment(text),
            };
            self.attach_parsed(&stack, &mut top, node);
        }
        top
    }

    fn attach_parsed(&mut self, stack: &[(NodeId, String)], top: &mut Vec<NodeId>, node: NodeId) {
        match stack.last() {
            Some((parent, _)) => {
                // Detached parent: no records, no hierarchy conflicts.
                let _ = self.append_child(*parent, node);
            }
            None => top.push(node),
        }
    }

    pub fn outer_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_node(id, &keep_all, &mut out);
        out
    }

    pub fn inner_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_children(id, &keep_all, &mut out);
        out
    }

    /// Like [`inner_html`](Self::inner_html), but every descendant element for
    /// which `unwrap` holds is written as its children alone. The tree is left
    /// untouched.
    pub fn inner_html_unwrapping(
        &self,
        id: NodeId,
        unwrap: &dyn Fn(&Document, NodeId) -> bool,
    ) -> String {
        let mut out = String::new();
        self.write_children(id, unwrap, &mut out);
        out
    }

    fn write_children(
        &self,
        id: NodeId,
        unwrap: &dyn Fn(&Document, NodeId) -> bool,
        out: &mut String,
    ) {
        let raw = self
            .tag_name(id)
            .is_some_and(is_raw_text_element);
        for &child in self.children(id) {
            if raw {
                if let Some(t) = self.text(child) {
                    out.push_str(t);
                    continue;
                }
            }
            self.write_node(child, unwrap, out);
        }
    }

    fn write_node(
        &self,
        id: NodeId,
        unwrap: &dyn Fn(&Document, NodeId) -> bool,
        out: &mut String,
    ) {
        match self.kind(id) {
            NodeKind::Document => self.write_children(id, unwrap, out),
            NodeKind::Text(t) => escape_text(t, out),
            NodeKind::Comment(t) => {
                out.push_str(COMMENT_START);
                out.push_str(t);
                out.push_str(COMMENT_END);
            }
            NodeKind::Element(_) if unwrap(self, id) => self.write_children(id, unwrap, out),
            NodeKind::Element(el) => {
                write_start_tag(&el.name, &el.attrs, out);
                if is_void_element(&el.name) {
                    return;
                }
                self.write_children(id, unwrap, out);
                out.push_str("</");
                out.push_str(&el.name);
                out.push('>');
            }
        }
    }

    /// Replace the children of `id` with parsed markup.
    pub fn set_inner_html(&mut self, id: NodeId, html: &str) -> Result<Vec<NodeId>, DomError> {
        if !self.is_element(id) {
            return Err(DomError::NotAnElement(id));
        }
        let nodes = self.parse_fragment(html);
        self.set_children(id, &nodes)?;
        Ok(nodes)
    }

    /// Replace an element with parsed markup, returning the new top-level nodes.
    pub fn set_outer_html(&mut self, id: NodeId, html: &str) -> Result<Vec<NodeId>, DomError> {
        let nodes = self.parse_fragment(html);
        self.replace_with(id, &nodes)?;
        Ok(nodes)
    }
}

fn keep_all(_: &Document, _: NodeId) -> bool {
    false
}
