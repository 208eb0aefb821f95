//! Change observation over the whole body.
//!
//! The observer turns the document's mutation records into [`ChangeBatch`]es.
//! Kernel-driven edits run while it is suspended so that only user edits reach
//! the host as "document changed". Suspension nests: every `stop` needs a
//! matching `start`, and observation resumes with the outermost one.

use std::collections::VecDeque;

use inkpad_dom::{Document, MutationRecord};

use crate::markers::DEFAULT_CURSOR_STYLE;

/// Records delivered together, in the order they happened.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeBatch {
    pub records: Vec<MutationRecord>,
}

impl ChangeBatch {
    pub fn new(records: Vec<MutationRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// A lone `style` attribute appearing with a default cursor value. The
    /// renderer produces this on its own when the pointer settles.
    pub fn is_cursor_noise(&self) -> bool {
        let [record] = self.records.as_slice() else {
            return false;
        };
        match record {
            MutationRecord::Attribute {
                name,
                old_value: None,
                new_value: Some(value),
                ..
            } => name.as_str() == "style" && same_declaration(value, DEFAULT_CURSOR_STYLE),
            _ => false,
        }
    }
}

fn same_declaration(a: &str, b: &str) -> bool {
    let norm = |s: &str| -> String {
        s.trim()
            .trim_end_matches(';')
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    };
    norm(a) == norm(b)
}

#[derive(Debug, Default)]
pub struct ChangeObserver {
    connected: bool,
    suspend_depth: usize,
    queue: VecDeque<ChangeBatch>,
}

impl ChangeObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin observing. Calling it again while connected does nothing.
    pub fn connect(&mut self, doc: &mut Document) {
        if self.connected {
            return;
        }
        self.connected = true;
        doc.set_recording(self.suspend_depth == 0);
        tracing::debug!(target: "inkpad::observer", "observer connected");
    }

    /// Stop observing for good. Pending records are dropped.
    pub fn disconnect(&mut self, doc: &mut Document) {
        if !self.connected {
            return;
        }
        self.connected = false;
        doc.set_recording(false);
        doc.take_records();
        self.queue.clear();
        tracing::debug!(target: "inkpad::observer", "observer disconnected");
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_suspended(&self) -> bool {
        self.suspend_depth > 0
    }

    pub fn suspend_depth(&self) -> usize {
        self.suspend_depth
    }

    /// Suspend observation. Records made before the outermost `stop` are
    /// batched first so they are still delivered.
    pub fn stop(&mut self, doc: &mut Document) {
        if self.suspend_depth == 0 {
            self.collect(doc);
            doc.set_recording(false);
        }
        self.suspend_depth += 1;
        tracing::trace!(target: "inkpad::observer", depth = self.suspend_depth, "observer stopped");
    }

    /// Undo one `stop`. Unbalanced calls are ignored.
    pub fn start(&mut self, doc: &mut Document) {
        if self.suspend_depth == 0 {
            tracing::warn!(target: "inkpad::observer", "start without matching stop");
            return;
        }
        self.suspend_depth -= 1;
        if self.suspend_depth == 0 && self.connected {
            // Anything recorded while suspended was produced by the kernel.
            doc.take_records();
            doc.set_recording(true);
        }
        tracing::trace!(target: "inkpad::observer", depth = self.suspend_depth, "observer started");
    }

    /// Run `f` with observation suspended.
    pub fn suspended<R>(&mut self, doc: &mut Document, f: impl FnOnce(&mut Document) -> R) -> R {
        self.stop(doc);
        let out = f(doc);
        self.start(doc);
        out
    }

    /// Move the document's outstanding records into one batch.
    pub fn collect(&mut self, doc: &mut Document) {
        if !self.connected || self.is_suspended() {
            return;
        }
        let records = doc.take_records();
        if !records.is_empty() {
            self.queue.push_back(ChangeBatch::new(records));
        }
    }

    /// Batches ready for delivery, oldest first.
    pub fn drain(&mut self) -> Vec<ChangeBatch> {
        self.queue.drain(..).collect()
    }

    /// Whether a batch should reach the host at all.
    pub fn accepts(batch: &ChangeBatch) -> bool {
        !batch.is_empty() && !batch.is_cursor_noise()
    }
}
