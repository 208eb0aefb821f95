//! Kernel configuration.

use serde::{Deserialize, Serialize};

/// Tunables for an [`EditorSession`](crate::EditorSession).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Maximum steps kept per undo ledger. Oldest steps fall off first.
    pub undo_depth: usize,
    /// Depth bound for the geometric descent under a pointer.
    pub hit_test_depth: usize,
    /// Icon theme entry requested for the encrypted-fragment placeholder.
    pub encrypted_icon_theme: String,
    /// Nodes created between sweeps of detached nodes no ledger still holds.
    /// Zero never sweeps.
    pub gc_interval: usize,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            undo_depth: 100,
            hit_test_depth: 64,
            encrypted_icon_theme: "object-locked".to_string(),
            gc_interval: 4096,
        }
    }
}

impl EditorConfig {
    /// Load config from environment variables, falling back to defaults.
    ///
    /// - `INKPAD_UNDO_DEPTH`
    /// - `INKPAD_HIT_TEST_DEPTH`
    /// - `INKPAD_ENCRYPTED_ICON`
    /// - `INKPAD_GC_INTERVAL`
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(depth) = env_parse("INKPAD_UNDO_DEPTH") {
            config.undo_depth = depth;
        }
        if let Some(depth) = env_parse("INKPAD_HIT_TEST_DEPTH") {
            config.hit_test_depth = depth;
        }
        if let Ok(icon) = std::env::var("INKPAD_ENCRYPTED_ICON") {
            config.encrypted_icon_theme = icon;
        }
        if let Some(interval) = env_parse("INKPAD_GC_INTERVAL") {
            config.gc_interval = interval;
        }
        config
    }
}

fn env_parse(key: &str) -> Option<usize> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable config value");
            None
        }
    }
}
