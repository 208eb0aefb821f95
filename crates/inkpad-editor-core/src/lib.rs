//! inkpad-editor-core: the rich-text editing kernel that runs inside the page.
//!
//! This crate provides:
//! - `selection_codec` - selections as body-relative character offsets
//! - `resolver` - what the caret or pointer is on
//! - `observer` - batched change observation with counted suspension
//! - `ledger` - per-domain undo/redo stacks
//! - `commands` - formatting, tables, links, encryption, resources, search, spelling
//! - `host` - capability-checked messages to and from the host process
//! - `EditorSession` - all of the above around one document

pub mod commands;
pub mod config;
pub mod error;
pub mod host;
pub mod ledger;
pub mod lookup;
pub mod markers;
pub mod observer;
pub mod resolver;
pub mod selection_codec;
pub mod session;

pub use commands::{CommandOutput, EditorCommand, TableWidth, effective_target};
pub use config::EditorConfig;
pub use error::{EditorError, Result};
pub use host::{
    CallResult, Capability, CapabilitySet, HostCall, HostNotification, HostRequest, HostResponse,
    Outbox, Outgoing,
};
pub use inkpad_dom as dom;
pub use ledger::{LedgerKind, Ledgers};
pub use observer::{ChangeBatch, ChangeObserver};
pub use resolver::{ContextMenuTarget, CursorPositionState, FragmentInfo, TextAlignment};
pub use selection_codec::SelectionSpan;
pub use session::EditorSession;
