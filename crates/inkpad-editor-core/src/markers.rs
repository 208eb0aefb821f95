//! Attribute and class names shared with the host's note format.
//!
//! These strings are matched byte for byte by the host when it reads the
//! document back, so they must not change.

pub const EN_TAG: &str = "en-tag";
pub const EN_MEDIA: &str = "en-media";
pub const EN_CRYPT: &str = "en-crypt";
pub const EN_DECRYPTED: &str = "en-decrypted";

pub const HASH: &str = "hash";
pub const TYPE: &str = "type";
pub const SRC: &str = "src";

pub const CIPHER: &str = "cipher";
pub const KEY_LENGTH: &str = "length";
pub const ENCRYPTED_TEXT: &str = "encrypted_text";
pub const HINT: &str = "hint";
pub const CRYPT_ID: &str = "en-crypt-id";
pub const DECRYPTED_ID: &str = "en-decrypted-id";

pub const HYPERLINK_ID: &str = "en-hyperlink-id";

pub const TODO_ID: &str = "en-todo-id";
pub const CHECKBOX_CHECKED: &str = "checkbox_checked";
pub const CHECKBOX_UNCHECKED: &str = "checkbox_unchecked";

pub const MISSPELL_CLASS: &str = "misspell";
pub const RESIZE_WRAPPER_CLASS: &str = "ui-wrapper";
pub const CRYPT_CLASSES: &str = "en-crypt hvr-border-color";
pub const OPEN_RESOURCE_BUTTON: &str = "open-resource-button";
pub const SAVE_RESOURCE_BUTTON: &str = "save-resource-button";

/// Style value the renderer writes onto the body when the pointer settles.
/// Observing it is noise, not an edit.
pub const DEFAULT_CURSOR_STYLE: &str = "cursor: default;";

/// `type` values starting with `image/` render inline.
pub fn is_image_mime(mime: &str) -> bool {
    mime.starts_with("image/")
}

/// Escape a local file path for use inside a double-quoted `src` value that the
/// host splices into script source.
pub fn escape_path_for_attribute(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\0' => out.push_str("\\0"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_escaping() {
        assert_eq!(
            escape_path_for_attribute("C:\\notes\\a \"b\"\0.png"),
            "C:\\\\notes\\\\a \\\"b\\\"\\0.png"
        );
    }

    #[test]
    fn test_image_mime() {
        assert!(is_image_mime("image/png"));
        assert!(!is_image_mime("application/pdf"));
        assert!(!is_image_mime("img/png"));
    }
}
