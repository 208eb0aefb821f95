//! Undo/redo ledgers, one per editing domain.
//!
//! Provides:
//! - `Revertible` for anything that can capture and put back a piece of state
//! - `Ledger<E>`, a pair of bounded stacks of steps
//! - `Ledgers`, the full set plus a cross-ledger history for "undo last"
//!
//! A step is a list of entries recorded in the order the mutations happened.
//! Undo replays a step backwards with the observer suspended, capturing each
//! entry's current state first; the captured entries become the redo step.

mod entries;

use std::fmt;

use inkpad_dom::{Document, NodeId};
use serde::{Deserialize, Serialize};

pub use entries::{GeometrySnapshot, MarkupSnapshot, NodeSnapshot};

use crate::error::{EditorError, Result};
use crate::observer::ChangeObserver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LedgerKind {
    Text,
    Table,
    Hyperlink,
    Encryption,
    Resource,
    ImageResize,
    Replace,
    Spelling,
}

impl LedgerKind {
    pub const ALL: [LedgerKind; 8] = [
        LedgerKind::Text,
        LedgerKind::Table,
        LedgerKind::Hyperlink,
        LedgerKind::Encryption,
        LedgerKind::Resource,
        LedgerKind::ImageResize,
        LedgerKind::Replace,
        LedgerKind::Spelling,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LedgerKind::Text => "text",
            LedgerKind::Table => "table",
            LedgerKind::Hyperlink => "hyperlink",
            LedgerKind::Encryption => "encryption",
            LedgerKind::Resource => "resource",
            LedgerKind::ImageResize => "image resize",
            LedgerKind::Replace => "replace",
            LedgerKind::Spelling => "spelling",
        }
    }
}

impl fmt::Display for LedgerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recorded piece of document state that can be put back.
pub trait Revertible: Sized {
    /// Node the entry rewrites. Must be connected when the entry is applied.
    fn target(&self) -> NodeId;

    /// True when there is nothing meaningful to put back.
    fn is_empty(&self) -> bool {
        false
    }

    /// Snapshot the state that applying `self` would overwrite.
    fn capture(&self, doc: &Document) -> Self;

    fn apply(&self, doc: &mut Document) -> Result<()>;

    /// Every node the entry names. These must outlive the entry.
    fn nodes(&self) -> Vec<NodeId> {
        vec![self.target()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Undo,
    Redo,
}

/// Bounded undo/redo stacks for one domain.
#[derive(Debug, Clone)]
pub struct Ledger<E> {
    kind: LedgerKind,
    undo_stack: Vec<Vec<E>>,
    redo_stack: Vec<Vec<E>>,
    max_steps: usize,
}

impl<E: Revertible> Ledger<E> {
    pub fn new(kind: LedgerKind, max_steps: usize) -> Self {
        Self {
            kind,
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_steps: max_steps.max(1),
        }
    }

    pub fn kind(&self) -> LedgerKind {
        self.kind
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    /// Record a step taken just before its mutations ran.
    /// Clears redo; the oldest step falls off past the depth bound.
    pub fn push(&mut self, step: Vec<E>) -> bool {
        if step.is_empty() {
            return false;
        }
        self.redo_stack.clear();
        self.undo_stack.push(step);
        while self.undo_stack.len() > self.max_steps {
            self.undo_stack.remove(0);
        }
        tracing::debug!(target: "inkpad::ledger", ledger = %self.kind, depth = self.undo_stack.len(), "step recorded");
        true
    }

    pub fn clear_redo(&mut self) {
        self.redo_stack.clear();
    }

    /// Nodes named by any step still on either stack.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.undo_stack
            .iter()
            .chain(&self.redo_stack)
            .flatten()
            .flat_map(Revertible::nodes)
    }

    pub fn clear_history(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    pub fn undo(&mut self, doc: &mut Document, observer: &mut ChangeObserver) -> Result<()> {
        self.shift(doc, observer, Direction::Undo)
    }

    pub fn redo(&mut self, doc: &mut Document, observer: &mut ChangeObserver) -> Result<()> {
        self.shift(doc, observer, Direction::Redo)
    }

    fn shift(&mut self, doc: &mut Document, observer: &mut ChangeObserver, dir: Direction) -> Result<()> {
        let kind = self.kind;
        let (from, to) = match dir {
            Direction::Undo => (&mut self.undo_stack, &mut self.redo_stack),
            Direction::Redo => (&mut self.redo_stack, &mut self.undo_stack),
        };
        let step = from.pop().ok_or(match dir {
            Direction::Undo => EditorError::NothingToUndo(kind),
            Direction::Redo => EditorError::NothingToRedo(kind),
        })?;

        // Stale steps are dropped rather than retried forever.
        if step.iter().any(|e| e.is_empty()) {
            tracing::warn!(target: "inkpad::ledger", ledger = %kind, "dropping step with empty payload");
            return Err(EditorError::EmptyPayload);
        }
        if let Some(first) = step.last() {
            if !doc.is_connected(first.target()) {
                tracing::warn!(target: "inkpad::ledger", ledger = %kind, node = %first.target(), "dropping step whose target is gone");
                return Err(EditorError::TargetGone(first.target()));
            }
        }

        match observer.suspended(doc, |doc| replay(&step, doc)) {
            Ok(counterparts) => {
                tracing::debug!(target: "inkpad::ledger", ledger = %kind, ?dir, entries = step.len(), "step replayed");
                to.push(counterparts);
                while to.len() > self.max_steps {
                    to.remove(0);
                }
                Ok(())
            }
            Err(err) => {
                tracing::warn!(target: "inkpad::ledger", ledger = %kind, ?dir, error = %err, "replay failed, document rolled back");
                from.push(step);
                Err(err)
            }
        }
    }
}

/// Apply a step newest-first. On failure everything applied so far is put
/// back before the error is returned.
pub(crate) fn replay<E: Revertible>(step: &[E], doc: &mut Document) -> Result<Vec<E>> {
    let mut counterparts: Vec<E> = Vec::with_capacity(step.len());
    for entry in step.iter().rev() {
        let outcome = if doc.is_connected(entry.target()) {
            let counterpart = entry.capture(doc);
            entry.apply(doc).map(|()| counterpart)
        } else {
            Err(EditorError::TargetGone(entry.target()))
        };
        match outcome {
            Ok(counterpart) => counterparts.push(counterpart),
            Err(err) => {
                for c in counterparts.iter().rev() {
                    if let Err(e) = c.apply(doc) {
                        tracing::error!(target: "inkpad::ledger", error = %e, "rollback entry failed");
                    }
                }
                return Err(err);
            }
        }
    }
    Ok(counterparts)
}

/// Every ledger plus the order in which they were written to.
#[derive(Debug, Clone)]
pub struct Ledgers {
    pub text: Ledger<NodeSnapshot>,
    pub table: Ledger<MarkupSnapshot>,
    pub hyperlink: Ledger<NodeSnapshot>,
    pub encryption: Ledger<NodeSnapshot>,
    pub resource: Ledger<NodeSnapshot>,
    pub image_resize: Ledger<GeometrySnapshot>,
    pub replace: Ledger<NodeSnapshot>,
    pub spelling: Ledger<NodeSnapshot>,
    history_undo: Vec<LedgerKind>,
    history_redo: Vec<LedgerKind>,
    max_steps: usize,
}

impl Ledgers {
    pub fn new(max_steps: usize) -> Self {
        Self {
            text: Ledger::new(LedgerKind::Text, max_steps),
            table: Ledger::new(LedgerKind::Table, max_steps),
            hyperlink: Ledger::new(LedgerKind::Hyperlink, max_steps),
            encryption: Ledger::new(LedgerKind::Encryption, max_steps),
            resource: Ledger::new(LedgerKind::Resource, max_steps),
            image_resize: Ledger::new(LedgerKind::ImageResize, max_steps),
            replace: Ledger::new(LedgerKind::Replace, max_steps),
            spelling: Ledger::new(LedgerKind::Spelling, max_steps),
            history_undo: Vec::new(),
            history_redo: Vec::new(),
            max_steps,
        }
    }

    fn journal_mut(&mut self, kind: LedgerKind) -> Option<&mut Ledger<NodeSnapshot>> {
        match kind {
            LedgerKind::Text => Some(&mut self.text),
            LedgerKind::Hyperlink => Some(&mut self.hyperlink),
            LedgerKind::Encryption => Some(&mut self.encryption),
            LedgerKind::Resource => Some(&mut self.resource),
            LedgerKind::Replace => Some(&mut self.replace),
            LedgerKind::Spelling => Some(&mut self.spelling),
            LedgerKind::Table | LedgerKind::ImageResize => None,
        }
    }

    fn after_push(&mut self, kind: LedgerKind) {
        for other in LedgerKind::ALL {
            self.clear_redo(other);
        }
        self.history_redo.clear();
        self.history_undo.push(kind);
        // Each ledger holds at most `max_steps`, so older history is dead weight.
        let cap = self.max_steps * LedgerKind::ALL.len();
        while self.history_undo.len() > cap {
            self.history_undo.remove(0);
        }
    }

    fn clear_redo(&mut self, kind: LedgerKind) {
        match kind {
            LedgerKind::Table => self.table.clear_redo(),
            LedgerKind::ImageResize => self.image_resize.clear_redo(),
            other => {
                if let Some(l) = self.journal_mut(other) {
                    l.clear_redo();
                }
            }
        }
    }

    /// Record a node-level step in one of the journal ledgers.
    pub fn record_nodes(&mut self, kind: LedgerKind, step: Vec<NodeSnapshot>) -> Result<()> {
        let ledger = self.journal_mut(kind).ok_or_else(|| {
            EditorError::InvalidArgument(format!("{kind} ledger does not take node entries"))
        })?;
        if ledger.push(step) {
            self.after_push(kind);
        }
        Ok(())
    }

    /// Nodes any ledger may still write to.
    pub fn referenced_nodes(&self) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self
            .text
            .nodes()
            .chain(self.table.nodes())
            .chain(self.hyperlink.nodes())
            .chain(self.encryption.nodes())
            .chain(self.resource.nodes())
            .chain(self.image_resize.nodes())
            .chain(self.replace.nodes())
            .chain(self.spelling.nodes())
            .collect();
        nodes.sort_unstable();
        nodes.dedup();
        nodes
    }

    pub fn record_table(&mut self, step: Vec<MarkupSnapshot>) {
        if self.table.push(step) {
            self.after_push(LedgerKind::Table);
        }
    }

    pub fn record_geometry(&mut self, step: Vec<GeometrySnapshot>) {
        if self.image_resize.push(step) {
            self.after_push(LedgerKind::ImageResize);
        }
    }

    pub fn can_undo(&self, kind: LedgerKind) -> bool {
        self.undo_len(kind) > 0
    }

    pub fn can_redo(&self, kind: LedgerKind) -> bool {
        self.redo_len(kind) > 0
    }

    pub fn undo_len(&self, kind: LedgerKind) -> usize {
        match kind {
            LedgerKind::Text => self.text.undo_len(),
            LedgerKind::Table => self.table.undo_len(),
            LedgerKind::Hyperlink => self.hyperlink.undo_len(),
            LedgerKind::Encryption => self.encryption.undo_len(),
            LedgerKind::Resource => self.resource.undo_len(),
            LedgerKind::ImageResize => self.image_resize.undo_len(),
            LedgerKind::Replace => self.replace.undo_len(),
            LedgerKind::Spelling => self.spelling.undo_len(),
        }
    }

    pub fn redo_len(&self, kind: LedgerKind) -> usize {
        match kind {
            LedgerKind::Text => self.text.redo_len(),
            LedgerKind::Table => self.table.redo_len(),
            LedgerKind::Hyperlink => self.hyperlink.redo_len(),
            LedgerKind::Encryption => self.encryption.redo_len(),
            LedgerKind::Resource => self.resource.redo_len(),
            LedgerKind::ImageResize => self.image_resize.redo_len(),
            LedgerKind::Replace => self.replace.redo_len(),
            LedgerKind::Spelling => self.spelling.redo_len(),
        }
    }

    fn dispatch(
        &mut self,
        kind: LedgerKind,
        dir: Direction,
        doc: &mut Document,
        observer: &mut ChangeObserver,
    ) -> Result<()> {
        macro_rules! go {
            ($ledger:expr) => {
                match dir {
                    Direction::Undo => $ledger.undo(doc, observer),
                    Direction::Redo => $ledger.redo(doc, observer),
                }
            };
        }
        match kind {
            LedgerKind::Text => go!(self.text),
            LedgerKind::Table => go!(self.table),
            LedgerKind::Hyperlink => go!(self.hyperlink),
            LedgerKind::Encryption => go!(self.encryption),
            LedgerKind::Resource => go!(self.resource),
            LedgerKind::ImageResize => go!(self.image_resize),
            LedgerKind::Replace => go!(self.replace),
            LedgerKind::Spelling => go!(self.spelling),
        }
    }

    /// Undo the newest step of one ledger.
    pub fn undo(&mut self, kind: LedgerKind, doc: &mut Document, observer: &mut ChangeObserver) -> Result<()> {
        let before = self.undo_len(kind);
        let result = self.dispatch(kind, Direction::Undo, doc, observer);
        if self.undo_len(kind) < before {
            remove_last(&mut self.history_undo, kind);
            if result.is_ok() {
                self.history_redo.push(kind);
            }
        }
        result
    }

    pub fn redo(&mut self, kind: LedgerKind, doc: &mut Document, observer: &mut ChangeObserver) -> Result<()> {
        let before = self.redo_len(kind);
        let result = self.dispatch(kind, Direction::Redo, doc, observer);
        if self.redo_len(kind) < before {
            remove_last(&mut self.history_redo, kind);
            if result.is_ok() {
                self.history_undo.push(kind);
            }
        }
        result
    }

    /// Undo whichever ledger was written to most recently. Returns the ledger
    /// that was undone.
    pub fn undo_last(&mut self, doc: &mut Document, observer: &mut ChangeObserver) -> Result<LedgerKind> {
        while let Some(&kind) = self.history_undo.last() {
            match self.undo(kind, doc, observer) {
                Err(EditorError::NothingToUndo(_)) => {
                    // Evicted by the depth bound.
                    self.history_undo.pop();
                }
                other => return other.map(|()| kind),
            }
        }
        Err(EditorError::HistoryEmpty)
    }

    pub fn redo_last(&mut self, doc: &mut Document, observer: &mut ChangeObserver) -> Result<LedgerKind> {
        while let Some(&kind) = self.history_redo.last() {
            match self.redo(kind, doc, observer) {
                Err(EditorError::NothingToRedo(_)) => {
                    self.history_redo.pop();
                }
                other => return other.map(|()| kind),
            }
        }
        Err(EditorError::HistoryEmpty)
    }

    pub fn clear(&mut self) {
        self.text.clear_history();
        self.table.clear_history();
        self.hyperlink.clear_history();
        self.encryption.clear_history();
        self.resource.clear_history();
        self.image_resize.clear_history();
        self.replace.clear_history();
        self.spelling.clear_history();
        self.history_undo.clear();
        self.history_redo.clear();
    }
}

fn remove_last(history: &mut Vec<LedgerKind>, kind: LedgerKind) {
    if let Some(pos) = history.iter().rposition(|&k| k == kind) {
        history.remove(pos);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkpad_dom::MutationRecord;

    fn observed(html: &str) -> (Document, ChangeObserver) {
        let mut doc = Document::from_html(html);
        let mut obs = ChangeObserver::new();
        obs.connect(&mut doc);
        (doc, obs)
    }

    /// Turn whatever the document recorded into one journal step.
    fn take_step(doc: &mut Document) -> Vec<NodeSnapshot> {
        doc.take_records().iter().map(NodeSnapshot::from_record).collect()
    }

    #[test]
    fn test_referenced_nodes_cover_both_stacks() {
        let (mut doc, mut obs) = observed("<p>a</p><p>b</p>");
        let body = doc.body();
        let first = doc.children(body)[0];
        let second = doc.children(body)[1];
        let mut ledgers = Ledgers::new(10);

        doc.remove(first);
        ledgers.record_nodes(LedgerKind::Text, take_step(&mut doc)).unwrap();
        let t = doc.text_nodes(body)[0];
        doc.set_text(t, "c").unwrap();
        ledgers.record_nodes(LedgerKind::Spelling, take_step(&mut doc)).unwrap();
        ledgers.undo(LedgerKind::Spelling, &mut doc, &mut obs).unwrap();

        // The removed paragraph is only reachable through the text ledger.
        assert_eq!(ledgers.referenced_nodes(), {
            let mut expected = vec![body, first, second, t];
            expected.sort();
            expected
        });
        ledgers.clear();
        assert!(ledgers.referenced_nodes().is_empty());
    }

    #[test]
    fn test_undo_redo_inverse_for_compound_edit() {
        let (mut doc, mut obs) = observed("<p>hello</p>");
        let body = doc.body();
        let original = doc.inner_html(body);
        let t = doc.text_nodes(body)[0];
        doc.set_text(t, "hello world").unwrap();
        let p2 = doc.create_element("p");
        let t2 = doc.create_text("second");
        doc.append_child(p2, t2).unwrap();
        doc.append_child(body, p2).unwrap();
        doc.set_attr(p2, "style", "color: red;").unwrap();
        let step = take_step(&mut doc);
        assert_eq!(step.len(), 3);
        let edited = doc.inner_html(body);

        let mut ledger = Ledger::new(LedgerKind::Text, 10);
        ledger.push(step);
        ledger.undo(&mut doc, &mut obs).unwrap();
        assert_eq!(doc.inner_html(body), original);
        assert!(!doc.is_connected(p2));
        ledger.redo(&mut doc, &mut obs).unwrap();
        assert_eq!(doc.inner_html(body), edited);
        // Same handles come back on redo.
        assert_eq!(doc.children(body)[1], p2);
        ledger.undo(&mut doc, &mut obs).unwrap();
        assert_eq!(doc.inner_html(body), original);

        // Replays never reach the observer.
        obs.collect(&mut doc);
        assert!(obs.drain().is_empty());
    }

    #[test]
    fn test_edit_inside_removed_subtree_replays() {
        let (mut doc, mut obs) = observed("<p>abc</p><p>x</p>");
        let body = doc.body();
        let original = doc.inner_html(body);
        let t = doc.text_nodes(body)[0];
        let p = doc.parent(t).unwrap();
        doc.set_text(t, "abcd").unwrap();
        doc.remove(p);
        let mut ledger = Ledger::new(LedgerKind::Text, 10);
        ledger.push(take_step(&mut doc));
        ledger.undo(&mut doc, &mut obs).unwrap();
        assert_eq!(doc.inner_html(body), original);
    }

    #[test]
    fn test_depth_bound_and_redo_clearing() {
        let (mut doc, mut obs) = observed("<p>0</p>");
        let t = doc.text_nodes(doc.body())[0];
        let mut ledger = Ledger::new(LedgerKind::Text, 2);
        for i in 1..=3 {
            doc.set_text(t, i.to_string()).unwrap();
            ledger.push(take_step(&mut doc));
        }
        assert_eq!(ledger.undo_len(), 2);
        ledger.undo(&mut doc, &mut obs).unwrap();
        ledger.undo(&mut doc, &mut obs).unwrap();
        assert_eq!(doc.text(t), Some("1"));
        assert!(matches!(
            ledger.undo(&mut doc, &mut obs),
            Err(EditorError::NothingToUndo(LedgerKind::Text))
        ));
        assert_eq!(ledger.redo_len(), 2);
        doc.set_text(t, "new").unwrap();
        ledger.push(take_step(&mut doc));
        assert!(!ledger.can_redo());
    }

    #[test]
    fn test_stale_step_is_dropped() {
        let (mut doc, mut obs) = observed("<p>a</p>");
        let t = doc.text_nodes(doc.body())[0];
        let p = doc.parent(t).unwrap();
        doc.set_text(t, "b").unwrap();
        let mut ledger = Ledger::new(LedgerKind::Text, 10);
        ledger.push(take_step(&mut doc));
        obs.suspended(&mut doc, |doc| doc.remove(p));
        assert!(matches!(ledger.undo(&mut doc, &mut obs), Err(EditorError::TargetGone(_))));
        assert!(!ledger.can_undo());
        assert!(!ledger.can_redo());
    }

    #[test]
    fn test_failed_replay_rolls_back_and_keeps_step() {
        let (mut doc, mut obs) = observed("<p>a</p><p>b</p>");
        let texts = doc.text_nodes(doc.body());
        let (a, b) = (texts[0], texts[1]);
        let pb = doc.parent(b).unwrap();
        // The newest entry is applied first and succeeds; the older one points
        // at a node that has since been detached.
        let detached = doc.create_text("loose");
        let step = vec![
            NodeSnapshot::from_record(&MutationRecord::CharacterData {
                target: detached,
                old_value: "x".into(),
                new_value: "loose".into(),
            }),
            NodeSnapshot::from_record(&MutationRecord::CharacterData {
                target: a,
                old_value: "zzz".into(),
                new_value: "a".into(),
            }),
        ];
        let before = doc.inner_html(doc.body());
        let mut ledger = Ledger::new(LedgerKind::Text, 10);
        ledger.push(step);
        assert!(ledger.undo(&mut doc, &mut obs).is_err());
        assert_eq!(doc.inner_html(doc.body()), before);
        assert_eq!(ledger.undo_len(), 1);
        assert!(doc.is_connected(pb));
    }

    #[test]
    fn test_history_follows_most_recent_ledger() {
        let (mut doc, mut obs) = observed("<p>a</p><table><tbody><tr><td>1</td></tr></tbody></table>");
        let body = doc.body();
        let t = doc.text_nodes(body)[0];
        let table = doc.find_all(body, |d, n| d.has_tag(n, "table"))[0];
        let mut ledgers = Ledgers::new(10);

        doc.set_text(t, "b").unwrap();
        ledgers.record_nodes(LedgerKind::Text, take_step(&mut doc)).unwrap();

        let snapshot = MarkupSnapshot::new(table, doc.inner_html(table));
        obs.suspended(&mut doc, |doc| doc.set_inner_html(table, "<tbody><tr><td>2</td></tr></tbody>").map(|_| ()))
            .unwrap();
        ledgers.record_table(vec![snapshot]);

        assert_eq!(ledgers.undo_last(&mut doc, &mut obs).unwrap(), LedgerKind::Table);
        assert_eq!(doc.text_content(table), "1");
        assert_eq!(ledgers.undo_last(&mut doc, &mut obs).unwrap(), LedgerKind::Text);
        assert_eq!(doc.text(t), Some("a"));
        assert!(matches!(ledgers.undo_last(&mut doc, &mut obs), Err(EditorError::HistoryEmpty)));
        assert_eq!(ledgers.redo_last(&mut doc, &mut obs).unwrap(), LedgerKind::Text);
        assert_eq!(doc.text(t), Some("b"));
    }

    #[test]
    fn test_journal_kinds_reject_wrong_ledger() {
        let mut ledgers = Ledgers::new(10);
        assert!(ledgers.record_nodes(LedgerKind::Table, Vec::new()).is_err());
    }
}
