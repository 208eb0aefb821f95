//! Messages exchanged with the host process.
//!
//! The host hands the kernel a set of named capability objects during the
//! handshake. Everything the kernel sends goes through an [`Outbox`], which
//! checks the capability first and drops the message with a warning when the
//! host never provided it.

use std::collections::{BTreeSet, HashMap, VecDeque};

use inkpad_dom::Rect;
use serde::{Deserialize, Serialize};

use crate::commands::EditorCommand;
use crate::commands::resource::ResourceInfo;
use crate::ledger::LedgerKind;
use crate::resolver::{ContextMenuTarget, CursorPositionState, FragmentInfo};
use crate::selection_codec::SelectionSpan;

/// A named service object the host may expose to the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Capability {
    ResourceCache,
    GenericResourceImageHandler,
    MutationObserver,
    EncryptedAreaClickHandler,
    ResourceButtonHandler,
    TextCursorPositionHandler,
    ContextMenuHandler,
    HyperlinkClickHandler,
    TodoCheckboxClickHandler,
    TableResizeHandler,
    SpellCheckHelper,
    IconThemeHandler,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self(
            [
                Capability::ResourceCache,
                Capability::GenericResourceImageHandler,
                Capability::MutationObserver,
                Capability::EncryptedAreaClickHandler,
                Capability::ResourceButtonHandler,
                Capability::TextCursorPositionHandler,
                Capability::ContextMenuHandler,
                Capability::HyperlinkClickHandler,
                Capability::TodoCheckboxClickHandler,
                Capability::TableResizeHandler,
                Capability::SpellCheckHelper,
                Capability::IconThemeHandler,
            ]
            .into_iter()
            .collect(),
        )
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    pub fn insert(&mut self, capability: Capability) -> bool {
        self.0.insert(capability)
    }

    pub fn remove(&mut self, capability: Capability) -> bool {
        self.0.remove(&capability)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<T: IntoIterator<Item = Capability>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceButtonAction {
    Open,
    Save,
}

/// Fire-and-forget messages for the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HostNotification {
    /// One per accepted batch of user edits.
    DocumentChanged { mutations: usize },
    #[serde(rename_all = "camelCase")]
    ContextMenuContent {
        sequence_number: u64,
        target: ContextMenuTarget,
    },
    CursorPositionState(CursorPositionState),
    #[serde(rename_all = "camelCase")]
    TableResized { table_index: usize, column: usize, width: f64 },
    HyperlinkClicked { id: Option<u64>, href: Option<String> },
    TodoCheckboxClicked { id: u64, checked: bool },
    EncryptedAreaClicked(FragmentInfo),
    ResourceButtonClicked { action: ResourceButtonAction, hash: String },
    LastEnteredWords { words: Vec<String> },
}

impl HostNotification {
    /// The host object this notification is delivered to.
    pub fn capability(&self) -> Capability {
        match self {
            HostNotification::DocumentChanged { .. } => Capability::MutationObserver,
            HostNotification::ContextMenuContent { .. } => Capability::ContextMenuHandler,
            HostNotification::CursorPositionState(_) => Capability::TextCursorPositionHandler,
            HostNotification::TableResized { .. } => Capability::TableResizeHandler,
            HostNotification::HyperlinkClicked { .. } => Capability::HyperlinkClickHandler,
            HostNotification::TodoCheckboxClicked { .. } => Capability::TodoCheckboxClickHandler,
            HostNotification::EncryptedAreaClicked(_) => Capability::EncryptedAreaClickHandler,
            HostNotification::ResourceButtonClicked { .. } => Capability::ResourceButtonHandler,
            HostNotification::LastEnteredWords { .. } => Capability::SpellCheckHelper,
        }
    }
}

/// Lookups whose answer comes back later as a [`HostResponse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HostRequest {
    ResourceInfo { hash: String },
    GenericResourceImage { hash: String },
    #[serde(rename_all = "camelCase")]
    IconPath { theme_name: String },
}

impl HostRequest {
    pub fn capability(&self) -> Capability {
        match self {
            HostRequest::ResourceInfo { .. } => Capability::ResourceCache,
            HostRequest::GenericResourceImage { .. } => Capability::GenericResourceImageHandler,
            HostRequest::IconPath { .. } => Capability::IconThemeHandler,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HostResponse {
    ResourceInfo(ResourceInfo),
    GenericResourceImage { hash: String, path: String },
    IconPath { path: String },
}

/// A box reported by the renderer, addressed by child-index path from `body`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutBox {
    pub path: Vec<usize>,
    pub rect: Rect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSource {
    pub hash: String,
    pub path: String,
}

/// Every call the host can make into the kernel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "camelCase")]
pub enum HostCall {
    SetDocument {
        html: String,
    },
    GetHtml,
    ProvideSrcForResourceTags {
        sources: Vec<ResourceSource>,
    },
    ProvideSrcForEncryptedTags {
        path: String,
    },
    ResourceInfoReceived(ResourceInfo),
    GenericResourceImageReceived {
        hash: String,
        path: String,
    },
    #[serde(rename_all = "camelCase")]
    DetermineContextMenuTarget {
        sequence_number: u64,
        x: f32,
        y: f32,
    },
    DetermineCursorPositionStates,
    DecryptPermanently {
        id: u64,
    },
    HideDecryptedText {
        id: u64,
    },
    FlipTodoState {
        id: u64,
    },
    #[serde(rename_all = "camelCase")]
    UpdateResourceHash {
        old_hash: String,
        new_hash: String,
    },
    UpdateImageSrc {
        hash: String,
        path: String,
    },
    SetSelection {
        span: SelectionSpan,
    },
    ReportLayout {
        boxes: Vec<LayoutBox>,
    },
    TypeText {
        text: String,
    },
    DeleteBackward,
    Click {
        x: f32,
        y: f32,
    },
    Execute {
        command: EditorCommand,
    },
    Undo {
        #[serde(default)]
        ledger: Option<LedgerKind>,
    },
    Redo {
        #[serde(default)]
        ledger: Option<LedgerKind>,
    },
}

impl HostCall {
    pub fn name(&self) -> &'static str {
        match self {
            HostCall::SetDocument { .. } => "setDocument",
            HostCall::GetHtml => "getHtml",
            HostCall::ProvideSrcForResourceTags { .. } => "provideSrcForResourceTags",
            HostCall::ProvideSrcForEncryptedTags { .. } => "provideSrcForEncryptedTags",
            HostCall::ResourceInfoReceived { .. } => "resourceInfoReceived",
            HostCall::GenericResourceImageReceived { .. } => "genericResourceImageReceived",
            HostCall::DetermineContextMenuTarget { .. } => "determineContextMenuTarget",
            HostCall::DetermineCursorPositionStates => "determineCursorPositionStates",
            HostCall::DecryptPermanently { .. } => "decryptPermanently",
            HostCall::HideDecryptedText { .. } => "hideDecryptedText",
            HostCall::FlipTodoState { .. } => "flipTodoState",
            HostCall::UpdateResourceHash { .. } => "updateResourceHash",
            HostCall::UpdateImageSrc { .. } => "updateImageSrc",
            HostCall::SetSelection { .. } => "setSelection",
            HostCall::ReportLayout { .. } => "reportLayout",
            HostCall::TypeText { .. } => "typeText",
            HostCall::DeleteBackward => "deleteBackward",
            HostCall::Click { .. } => "click",
            HostCall::Execute { .. } => "execute",
            HostCall::Undo { .. } => "undo",
            HostCall::Redo { .. } => "redo",
        }
    }
}

/// Structured result of a host call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallResult {
    pub status: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl CallResult {
    pub fn ok() -> Self {
        Self {
            status: true,
            error: None,
            data: None,
        }
    }

    pub fn with_data(data: serde_json::Value) -> Self {
        Self {
            status: true,
            error: None,
            data: Some(data),
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self {
            status: false,
            error: Some(error.to_string()),
            data: None,
        }
    }
}

/// Something waiting to be sent to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Outgoing {
    Notify(HostNotification),
    Request { id: u64, request: HostRequest },
}

/// Capability-checked queue of outgoing messages, plus the requests still
/// waiting for an answer.
#[derive(Debug, Default)]
pub struct Outbox {
    capabilities: CapabilitySet,
    queue: VecDeque<Outgoing>,
    next_id: u64,
    pending: HashMap<u64, HostRequest>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.has(capability)
    }

    pub fn set_capabilities(&mut self, capabilities: CapabilitySet) {
        tracing::info!(target: "inkpad::host", count = capabilities.len(), "host capabilities bound");
        self.capabilities = capabilities;
    }

    /// The host went away. Outstanding requests can never be answered.
    pub fn clear_capabilities(&mut self) {
        self.capabilities = CapabilitySet::new();
        self.pending.clear();
    }

    /// Queue a notification. Returns false when the host lacks the capability.
    pub fn notify(&mut self, notification: HostNotification) -> bool {
        let capability = notification.capability();
        if !self.has(capability) {
            tracing::warn!(target: "inkpad::host", ?capability, "host capability missing, notification dropped");
            return false;
        }
        self.queue.push_back(Outgoing::Notify(notification));
        true
    }

    /// Queue a request and remember it until the response arrives.
    pub fn request(&mut self, request: HostRequest) -> Option<u64> {
        let capability = request.capability();
        if !self.has(capability) {
            tracing::warn!(target: "inkpad::host", ?capability, "host capability missing, request dropped");
            return None;
        }
        self.next_id += 1;
        let id = self.next_id;
        self.pending.insert(id, request.clone());
        self.queue.push_back(Outgoing::Request { id, request });
        Some(id)
    }

    /// Take the request a response answers. Unknown ids yield `None`.
    pub fn resolve(&mut self, id: u64) -> Option<HostRequest> {
        self.pending.remove(&id)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Everything queued so far, oldest first.
    pub fn drain(&mut self) -> Vec<Outgoing> {
        self.queue.drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_capability_drops_message() {
        let mut outbox = Outbox::new();
        assert!(!outbox.notify(HostNotification::DocumentChanged { mutations: 1 }));
        assert_eq!(
            outbox.request(HostRequest::ResourceInfo { hash: "h".into() }),
            None
        );
        assert!(outbox.is_empty());

        outbox.set_capabilities([Capability::MutationObserver].into_iter().collect());
        assert!(outbox.notify(HostNotification::DocumentChanged { mutations: 1 }));
        assert_eq!(outbox.drain().len(), 1);
    }

    #[test]
    fn test_requests_resolve_once() {
        let mut outbox = Outbox::new();
        outbox.set_capabilities(CapabilitySet::all());
        let id = outbox
            .request(HostRequest::IconPath {
                theme_name: "object-locked".into(),
            })
            .unwrap();
        assert_eq!(outbox.pending_len(), 1);
        assert!(outbox.resolve(id).is_some());
        assert!(outbox.resolve(id).is_none());
        assert!(outbox.resolve(999).is_none());
    }

    #[test]
    fn test_wire_shapes() {
        let call: HostCall = serde_json::from_str(
            r#"{"call":"determineContextMenuTarget","sequenceNumber":7,"x":1.5,"y":2}"#,
        )
        .unwrap();
        assert_eq!(
            call,
            HostCall::DetermineContextMenuTarget {
                sequence_number: 7,
                x: 1.5,
                y: 2.0
            }
        );
        let undo: HostCall = serde_json::from_str(r#"{"call":"undo"}"#).unwrap();
        assert_eq!(undo, HostCall::Undo { ledger: None });

        let json = serde_json::to_value(HostNotification::DocumentChanged { mutations: 3 }).unwrap();
        assert_eq!(json, serde_json::json!({"type": "documentChanged", "mutations": 3}));

        let ok = serde_json::to_value(CallResult::ok()).unwrap();
        assert_eq!(ok, serde_json::json!({"status": true}));

        let caps: CapabilitySet = serde_json::from_str(r#"["resourceCache","spellCheckHelper"]"#).unwrap();
        assert!(caps.has(Capability::SpellCheckHelper));
        assert!(!caps.has(Capability::MutationObserver));
    }
}
