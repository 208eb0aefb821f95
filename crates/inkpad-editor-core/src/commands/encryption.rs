//! Encrypted fragments and their decrypted counterparts.
//!
//! An encrypted fragment is an `img` tagged `en-crypt` that carries the
//! ciphertext in attributes. Decrypting swaps it for an `en-decrypted` `div`
//! holding the plaintext markup, with the same attributes so it can be hidden
//! again. Both directions keep the numeric fragment id.

use inkpad_dom::{Document, NodeId};

use super::{current_range, place_caret};
use crate::error::{EditorError, Result};
use crate::lookup;
use crate::markers::{
    CIPHER, CRYPT_CLASSES, CRYPT_ID, DECRYPTED_ID, EN_CRYPT, EN_DECRYPTED, EN_TAG, ENCRYPTED_TEXT,
    HINT, KEY_LENGTH, SRC, escape_path_for_attribute,
};
use crate::resolver::FragmentInfo;

/// One past the largest fragment id present, so ids stay unique among the
/// fragments currently in the document.
pub fn next_fragment_id(doc: &Document) -> u64 {
    doc.find_all(doc.body(), |d, n| d.is_element(n))
        .into_iter()
        .filter_map(|n| {
            doc.attr(n, CRYPT_ID)
                .or_else(|| doc.attr(n, DECRYPTED_ID))
                .and_then(|v| v.trim().parse::<u64>().ok())
        })
        .max()
        .map_or(1, |max| max + 1)
}

fn write_fragment_attrs(doc: &mut Document, el: NodeId, info: &FragmentInfo) -> Result<()> {
    doc.set_attr(el, CIPHER, info.cipher.as_str())?;
    doc.set_attr(el, KEY_LENGTH, info.key_length.to_string())?;
    doc.set_attr(el, ENCRYPTED_TEXT, info.encrypted_text.as_str())?;
    if let Some(hint) = info.hint.as_deref().filter(|h| !h.is_empty()) {
        doc.set_attr(el, HINT, hint)?;
    }
    Ok(())
}

fn build_encrypted(doc: &mut Document, info: &FragmentInfo, id: u64, icon: Option<&str>) -> Result<NodeId> {
    let el = doc.create_element("img");
    if let Some(path) = icon {
        doc.set_attr(el, SRC, escape_path_for_attribute(path))?;
    }
    doc.set_attr(el, EN_TAG, EN_CRYPT)?;
    write_fragment_attrs(doc, el, info)?;
    doc.set_attr(el, "class", CRYPT_CLASSES)?;
    doc.set_attr(el, CRYPT_ID, id.to_string())?;
    Ok(el)
}

/// Replace the selection with an encrypted fragment. Returns its id.
pub fn encrypt_selection(doc: &mut Document, info: &FragmentInfo, icon: Option<&str>) -> Result<u64> {
    let range = current_range(doc)?;
    if range.is_collapsed() {
        return Err(EditorError::EmptySelection);
    }
    if info.encrypted_text.is_empty() {
        return Err(EditorError::InvalidArgument("encrypted text is empty".into()));
    }
    let id = next_fragment_id(doc);
    let el = build_encrypted(doc, info, id, icon)?;
    let at = doc.delete_range_contents(&range)?;
    let after = doc.insert_nodes_at(at, &[el])?;
    place_caret(doc, after);
    tracing::debug!(target: "inkpad::commands", id, cipher = %info.cipher, "selection encrypted");
    Ok(id)
}

/// Swap the encrypted fragment `id` for its plaintext.
pub fn decrypt(doc: &mut Document, id: u64, decrypted_html: &str) -> Result<NodeId> {
    let encrypted = lookup::by_attr(doc, CRYPT_ID, &id.to_string()).unique(format!("encrypted fragment {id}"))?;
    let info = FragmentInfo::read(doc, encrypted, CRYPT_ID);
    let el = doc.create_element("div");
    doc.set_attr(el, EN_TAG, EN_DECRYPTED)?;
    write_fragment_attrs(doc, el, &info)?;
    doc.set_attr(el, "class", "en-decrypted hvr-border-color")?;
    doc.set_attr(el, DECRYPTED_ID, id.to_string())?;
    let content = doc.parse_fragment(decrypted_html);
    doc.set_children(el, &content)?;
    doc.replace_with(encrypted, &[el])?;
    tracing::debug!(target: "inkpad::commands", id, "fragment decrypted");
    Ok(el)
}

fn decrypted_fragment(doc: &Document, id: u64) -> Result<NodeId> {
    lookup::by_attr(doc, DECRYPTED_ID, &id.to_string()).unique(format!("decrypted fragment {id}"))
}

/// Put the ciphertext back in place of decrypted text.
pub fn hide_decrypted(doc: &mut Document, id: u64, icon: Option<&str>) -> Result<NodeId> {
    let decrypted = decrypted_fragment(doc, id)?;
    let info = FragmentInfo::read(doc, decrypted, DECRYPTED_ID);
    let el = build_encrypted(doc, &info, id, icon)?;
    doc.replace_with(decrypted, &[el])?;
    Ok(el)
}

/// Keep the plaintext for good: the wrapper goes, its content stays.
pub fn decrypt_permanently(doc: &mut Document, id: u64) -> Result<()> {
    let decrypted = decrypted_fragment(doc, id)?;
    doc.unwrap_node(decrypted)?;
    Ok(())
}

/// Point every encrypted fragment at the icon the host resolved.
pub fn provide_src_for_encrypted(doc: &mut Document, path: &str) -> Result<usize> {
    let escaped = escape_path_for_attribute(path);
    let targets = doc.find_all(doc.body(), |d, n| d.attr(n, EN_TAG) == Some(EN_CRYPT));
    for &el in &targets {
        doc.set_attr(el, SRC, escaped.as_str())?;
    }
    Ok(targets.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection_codec::{SelectionSpan, restore};

    fn info() -> FragmentInfo {
        FragmentInfo {
            cipher: "AES".into(),
            key_length: 128,
            encrypted_text: "Q0lQSEVS".into(),
            hint: Some("usual".into()),
            id: None,
        }
    }

    #[test]
    fn test_encrypt_decrypt_hide_round_trip() {
        let mut doc = Document::from_html(r#"<p>keep <b>secret</b> text</p><img en-crypt-id="4">"#);
        restore(&mut doc, Some(SelectionSpan::new(5, 11)));
        let id = encrypt_selection(&mut doc, &info(), None).unwrap();
        assert_eq!(id, 5);
        insta::assert_snapshot!(doc.inner_html(doc.body()), @r#"<p>keep <img en-tag="en-crypt" cipher="AES" length="128" encrypted_text="Q0lQSEVS" hint="usual" class="en-crypt hvr-border-color" en-crypt-id="5"> text</p><img en-crypt-id="4">"#);

        decrypt(&mut doc, id, "<b>secret</b>").unwrap();
        let fragment = decrypted_fragment(&doc, id).unwrap();
        assert_eq!(doc.inner_html(fragment), "<b>secret</b>");
        assert_eq!(doc.attr(fragment, HINT), Some("usual"));

        hide_decrypted(&mut doc, id, Some("/icons/lock.png")).unwrap();
        let encrypted = lookup::by_attr(&doc, CRYPT_ID, "5").unique("fragment").unwrap();
        assert_eq!(doc.attr(encrypted, ENCRYPTED_TEXT), Some("Q0lQSEVS"));
        assert_eq!(doc.attr(encrypted, SRC), Some("/icons/lock.png"));
    }

    #[test]
    fn test_encrypt_needs_selection() {
        let mut doc = Document::from_html("<p>abc</p>");
        restore(&mut doc, Some(SelectionSpan::collapsed(1)));
        assert!(matches!(
            encrypt_selection(&mut doc, &info(), None),
            Err(EditorError::EmptySelection)
        ));
    }

    #[test]
    fn test_decrypt_permanently_unwraps() {
        let mut doc = Document::from_html(
            r#"<p>a</p><div en-tag="en-decrypted" en-decrypted-id="2"><i>plain</i></div>"#,
        );
        decrypt_permanently(&mut doc, 2).unwrap();
        assert_eq!(doc.inner_html(doc.body()), "<p>a</p><i>plain</i>");
        assert!(decrypt_permanently(&mut doc, 2).is_err());
    }

    #[test]
    fn test_icon_src_is_escaped() {
        let mut doc = Document::from_html(r#"<img en-tag="en-crypt"><img en-tag="en-crypt">"#);
        assert_eq!(provide_src_for_encrypted(&mut doc, "C:\\icons\\lock.png").unwrap(), 2);
        let first = doc.first_child(doc.body()).unwrap();
        assert_eq!(doc.attr(first, SRC), Some("C:\\\\icons\\\\lock.png"));
    }
}
