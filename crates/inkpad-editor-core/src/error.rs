//! Error types for kernel operations.
//!
//! None of these are fatal. Host-facing entry points turn them into a failed
//! [`CallResult`](crate::host::CallResult) and keep going.

use inkpad_dom::{DomError, NodeId};
use miette::Diagnostic;
use thiserror::Error;

use crate::host::Capability;
use crate::ledger::LedgerKind;

#[derive(Debug, Error, Diagnostic)]
#[non_exhaustive]
pub enum EditorError {
    /// Nothing is selected.
    #[error("no selection")]
    #[diagnostic(code(inkpad::editor::no_selection))]
    NoSelection,

    /// The command needs a non-collapsed selection.
    #[error("selection is empty")]
    #[diagnostic(code(inkpad::editor::empty_selection))]
    EmptySelection,

    #[error("nothing to undo in the {0} ledger")]
    #[diagnostic(code(inkpad::ledger::nothing_to_undo))]
    NothingToUndo(LedgerKind),

    #[error("nothing to redo in the {0} ledger")]
    #[diagnostic(code(inkpad::ledger::nothing_to_redo))]
    NothingToRedo(LedgerKind),

    /// No ledger has anything left to undo or redo.
    #[error("undo history is empty")]
    #[diagnostic(code(inkpad::ledger::history_empty))]
    HistoryEmpty,

    /// A recorded entry points at a node that has left the document.
    #[error("target {0} is no longer in the document")]
    #[diagnostic(code(inkpad::ledger::target_gone))]
    TargetGone(NodeId),

    /// A recorded entry has nothing to put back.
    #[error("undo entry has an empty payload")]
    #[diagnostic(code(inkpad::ledger::empty_payload))]
    EmptyPayload,

    #[error("no element found for {0}")]
    #[diagnostic(code(inkpad::lookup::not_found))]
    NotFound(String),

    /// More than one element claims an identifier that must be unique.
    #[error("{count} elements found for {what}, expected exactly one")]
    #[diagnostic(code(inkpad::lookup::ambiguous))]
    Ambiguous { what: String, count: usize },

    #[error("{0} already exists")]
    #[diagnostic(code(inkpad::lookup::already_exists))]
    AlreadyExists(String),

    /// The host never handed over this capability, or took it back.
    #[error("host capability {0:?} is not available")]
    #[diagnostic(code(inkpad::host::capability_missing))]
    CapabilityMissing(Capability),

    #[error("invalid argument: {0}")]
    #[diagnostic(code(inkpad::editor::invalid_argument))]
    InvalidArgument(String),

    #[error(transparent)]
    #[diagnostic(code(inkpad::dom))]
    Dom(#[from] DomError),

    #[error("serialization error: {0}")]
    #[diagnostic(code(inkpad::serde))]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = EditorError> = std::result::Result<T, E>;
