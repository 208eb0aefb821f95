//! The editing session: one document plus everything that watches it.
//!
//! [`EditorSession`] owns the document, the change observer, the ledgers, the
//! table resize bindings, and the outbox to the host. Every host call comes in
//! through [`EditorSession::handle_call`]; every command goes through the one
//! dispatch in [`EditorSession::execute`].
//!
//! Edits reach the ledgers two ways. User input (typing, backspace) runs with
//! the observer live, and each accepted batch becomes one step in the text
//! ledger. Commands run with the observer suspended inside a transaction that
//! records the prior state of everything they touch, and the whole command
//! becomes one step in its domain's ledger.
//!
//! Spelling highlights split text nodes, so they are lifted before anything
//! is recorded or replayed and put back afterwards. The ledgers only ever see
//! the document without them.

use std::collections::BTreeSet;

use inkpad_dom::{Document, NodeId};
use serde_json::{Value, json};

use crate::commands::formatting::{self, InlineStyle};
use crate::commands::spelling::Highlights;
use crate::commands::table::{self, ColumnResizeBindings};
use crate::commands::{
    CommandOutput, EditorCommand, encryption, find, hyperlink, image, resource, spelling, todo,
};
use crate::config::EditorConfig;
use crate::error::{EditorError, Result};
use crate::host::{
    CallResult, CapabilitySet, HostCall, HostNotification, HostRequest, HostResponse, LayoutBox,
    Outbox, Outgoing, ResourceButtonAction,
};
use crate::ledger::{self, LedgerKind, Ledgers, MarkupSnapshot, NodeSnapshot, Revertible};
use crate::markers::{
    CRYPT_ID, EN_CRYPT, EN_TAG, HASH, OPEN_RESOURCE_BUTTON, SAVE_RESOURCE_BUTTON, TYPE,
    is_image_mime,
};
use crate::observer::ChangeObserver;
use crate::resolver::{self, ContextMenuTarget, CursorPositionState, FragmentInfo, TextAlignment};
use crate::selection_codec::{self, SelectionSpan};

fn done<T>(_: T) -> CommandOutput {
    CommandOutput::Done
}

pub struct EditorSession {
    doc: Document,
    observer: ChangeObserver,
    ledgers: Ledgers,
    bindings: ColumnResizeBindings,
    outbox: Outbox,
    config: EditorConfig,
    /// Icon path for encrypted placeholders, once the host resolved it.
    encrypted_icon: Option<String>,
    /// Words currently highlighted as misspelled; reapplied on load.
    spell_words: Vec<String>,
    /// The splits behind the highlights now in the document.
    highlights: Highlights,
    /// Set while the highlights are taken out.
    highlights_lifted: bool,
    /// The word being typed, for the spell check helper.
    word_buffer: String,
}

impl Default for EditorSession {
    fn default() -> Self {
        Self::new(EditorConfig::default())
    }
}

impl EditorSession {
    pub fn new(config: EditorConfig) -> Self {
        let mut doc = Document::new();
        let mut observer = ChangeObserver::new();
        observer.connect(&mut doc);
        Self {
            doc,
            observer,
            ledgers: Ledgers::new(config.undo_depth),
            bindings: ColumnResizeBindings::new(),
            outbox: Outbox::new(),
            config,
            encrypted_icon: None,
            spell_words: Vec::new(),
            highlights: Highlights::default(),
            highlights_lifted: false,
            word_buffer: String::new(),
        }
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn ledgers(&self) -> &Ledgers {
        &self.ledgers
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn bindings(&self) -> &ColumnResizeBindings {
        &self.bindings
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    /// Bind the capability objects the host offered in its handshake.
    pub fn connect_host(&mut self, capabilities: CapabilitySet) {
        self.outbox.set_capabilities(capabilities);
    }

    /// The host is gone. Commands keep working; anything that needs the host
    /// is dropped with a warning.
    pub fn disconnect_host(&mut self) {
        tracing::warn!(target: "inkpad::session", pending = self.outbox.pending_len(), "host disconnected");
        self.outbox.clear_capabilities();
    }

    /// Messages waiting for the host, oldest first.
    pub fn drain_outgoing(&mut self) -> Vec<Outgoing> {
        self.pump();
        self.outbox.drain()
    }

    // === Document ===

    /// Replace the whole document. History is cleared.
    pub fn load_document(&mut self, html: &str) -> Result<()> {
        let body = self.doc.body();
        self.observer
            .suspended(&mut self.doc, |doc| doc.set_inner_html(body, html))?;
        self.doc.set_selection(None);
        self.ledgers.clear();
        self.highlights = Highlights::default();
        self.word_buffer.clear();
        self.bindings.rebind(&self.doc);
        self.reapply_highlights()?;

        let media = resource::all_media(&self.doc);
        self.request_resource_info(&media);
        self.refresh_encrypted_icons()?;

        tracing::info!(
            target: "inkpad::session",
            bytes = html.len(),
            resources = media.len(),
            tables = self.bindings.len(),
            "document loaded"
        );
        self.maybe_collect();
        Ok(())
    }

    /// The document as the host stores it: no resize wrappers, no spelling
    /// highlights.
    pub fn html(&self) -> Result<String> {
        Ok(self.doc.inner_html_unwrapping(self.doc.body(), &|doc, node| {
            spelling::is_highlight(doc, node) || image::is_resize_wrapper(doc, node)
        }))
    }

    fn request_resource_info(&mut self, elements: &[NodeId]) {
        let mut seen = BTreeSet::new();
        for &el in elements {
            let Some(hash) = self.doc.attr(el, HASH).map(str::to_string) else {
                continue;
            };
            if !seen.insert(hash.clone()) {
                continue;
            }
            let mime = self.doc.attr(el, TYPE).unwrap_or_default();
            let request = if self.doc.has_tag(el, "img") && !is_image_mime(mime) {
                HostRequest::GenericResourceImage { hash }
            } else {
                HostRequest::ResourceInfo { hash }
            };
            self.outbox.request(request);
        }
    }

    fn refresh_encrypted_icons(&mut self) -> Result<()> {
        match self.encrypted_icon.clone() {
            Some(path) => {
                self.observer
                    .suspended(&mut self.doc, |doc| encryption::provide_src_for_encrypted(doc, &path))?;
            }
            None => {
                let body = self.doc.body();
                let any_encrypted = !self
                    .doc
                    .find_all(body, |d, n| d.attr(n, EN_TAG) == Some(EN_CRYPT))
                    .is_empty();
                if any_encrypted {
                    self.outbox.request(HostRequest::IconPath {
                        theme_name: self.config.encrypted_icon_theme.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn set_encrypted_icon(&mut self, path: String) -> Result<usize> {
        self.encrypted_icon = Some(path.clone());
        self.observer
            .suspended(&mut self.doc, |doc| encryption::provide_src_for_encrypted(doc, &path))
    }

    // === Observation ===

    /// Turn pending user edits into text ledger steps and change
    /// notifications. Returns how many batches were accepted.
    pub fn pump(&mut self) -> usize {
        self.observer.collect(&mut self.doc);
        let mut accepted = 0;
        for batch in self.observer.drain() {
            if !ChangeObserver::accepts(&batch) {
                tracing::trace!(target: "inkpad::observer", records = batch.len(), "batch ignored");
                continue;
            }
            let mutations = batch.len();
            let step = batch.records.iter().map(NodeSnapshot::from_record).collect();
            if let Err(e) = self.ledgers.record_nodes(LedgerKind::Text, step) {
                tracing::warn!(target: "inkpad::ledger", error = %e, "could not record user edit");
            }
            self.outbox.notify(HostNotification::DocumentChanged { mutations });
            accepted += 1;
        }
        accepted
    }

    /// Run a command as one undoable step in a journal ledger. The prior state
    /// of every node it touches is recorded; if it fails, that state is put
    /// back and nothing is recorded.
    fn journal<T>(&mut self, kind: LedgerKind, f: impl FnOnce(&mut Document) -> Result<T>) -> Result<T> {
        self.without_highlights(|this| {
            this.observer.stop(&mut this.doc);
            this.doc.set_recording(true);
            let outcome = f(&mut this.doc);
            this.doc.set_recording(false);
            let step: Vec<NodeSnapshot> = this
                .doc
                .take_records()
                .iter()
                .map(NodeSnapshot::from_record)
                .collect();

            let result = match outcome {
                Ok(value) if step.is_empty() => Ok(value),
                Ok(value) => {
                    let mutations = step.len();
                    this.ledgers.record_nodes(kind, step).map(|()| {
                        this.outbox
                            .notify(HostNotification::DocumentChanged { mutations });
                        value
                    })
                }
                Err(err) => {
                    if let Err(rollback) = ledger::replay(&step, &mut this.doc) {
                        tracing::error!(target: "inkpad::ledger", ledger = %kind, error = %rollback, "rollback after failed command incomplete");
                    }
                    Err(err)
                }
            };
            this.observer.start(&mut this.doc);
            result
        })
    }

    /// Run a structural table edit. The table's whole markup is the undo unit.
    fn table_edit<T>(&mut self, table: NodeId, f: impl FnOnce(&mut Document) -> Result<T>) -> Result<T> {
        self.without_highlights(|this| {
            let before = MarkupSnapshot::of(&this.doc, table);
            let outcome = this.observer.suspended(&mut this.doc, f);
            match &outcome {
                Ok(_) => {
                    this.ledgers.record_table(vec![before]);
                    this.outbox
                        .notify(HostNotification::DocumentChanged { mutations: 1 });
                }
                Err(_) => {
                    if let Err(e) = this.observer.suspended(&mut this.doc, |doc| before.apply(doc)) {
                        tracing::error!(target: "inkpad::ledger", error = %e, "table rollback failed");
                    }
                }
            }
            this.bindings.rebind(&this.doc);
            outcome
        })
    }

    // === Spelling highlights ===

    /// Run `f` on the document with the spelling highlights taken out, then
    /// highlight again. Pending user edits are pumped first.
    fn without_highlights<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.pump();
        if self.highlights_lifted {
            return f(self);
        }
        self.lift_highlights()?;
        self.highlights_lifted = true;
        let outcome = f(self);
        self.highlights_lifted = false;
        let reapplied = self.reapply_highlights();
        let value = outcome?;
        reapplied?;
        Ok(value)
    }

    /// Join every highlighted text node back together. The selection keeps
    /// its text offsets.
    fn lift_highlights(&mut self) -> Result<()> {
        let highlights = std::mem::take(&mut self.highlights);
        if highlights.is_empty() {
            return Ok(());
        }
        let span = selection_codec::save(&self.doc);
        let joined = self
            .observer
            .suspended(&mut self.doc, |doc| spelling::join_highlights(doc, &highlights))?;
        if span.is_some() {
            selection_codec::restore(&mut self.doc, span);
        }
        tracing::trace!(target: "inkpad::session", joined, "spelling highlights lifted");
        Ok(())
    }

    /// Highlight `spell_words` again. Returns how many words were wrapped.
    fn reapply_highlights(&mut self) -> Result<usize> {
        if self.spell_words.is_empty() {
            return Ok(0);
        }
        let span = selection_codec::save(&self.doc);
        let words = &self.spell_words;
        let highlights = self
            .observer
            .suspended(&mut self.doc, |doc| spelling::apply_spell_check(doc, words))?;
        let wrapped = highlights.count();
        if wrapped > 0 && span.is_some() {
            selection_codec::restore(&mut self.doc, span);
        }
        self.highlights = highlights;
        Ok(wrapped)
    }

    /// Free detached nodes once enough have been created since the last
    /// sweep. Anything a ledger, a highlight or a resize handle names stays.
    fn maybe_collect(&mut self) {
        let interval = self.config.gc_interval;
        if interval == 0 || self.doc.allocated_since_gc() < interval {
            return;
        }
        self.pump();
        let roots: Vec<NodeId> = self
            .ledgers
            .referenced_nodes()
            .into_iter()
            .chain(self.highlights.nodes())
            .chain(self.bindings.nodes())
            .collect();
        let freed = self.doc.collect_garbage(roots);
        tracing::debug!(target: "inkpad::session", freed, "swept detached nodes");
    }

    // === Commands ===

    /// Run one editor command.
    pub fn execute(&mut self, command: &EditorCommand) -> Result<CommandOutput> {
        use EditorCommand as C;
        use LedgerKind::{Encryption, Hyperlink, Replace, Resource, Spelling, Text};

        tracing::debug!(target: "inkpad::commands", command = command.name(), "executing");
        let output = match command {
            C::Bold => self.journal(Text, |d| formatting::toggle_inline(d, InlineStyle::Bold)).map(done)?,
            C::Italic => self.journal(Text, |d| formatting::toggle_inline(d, InlineStyle::Italic)).map(done)?,
            C::Underline => self.journal(Text, |d| formatting::toggle_inline(d, InlineStyle::Underline)).map(done)?,
            C::Strikethrough => self
                .journal(Text, |d| formatting::toggle_inline(d, InlineStyle::Strikethrough))
                .map(done)?,
            C::JustifyLeft => self.journal(Text, |d| formatting::justify(d, TextAlignment::Left)).map(done)?,
            C::JustifyCenter => self.journal(Text, |d| formatting::justify(d, TextAlignment::Center)).map(done)?,
            C::JustifyRight => self.journal(Text, |d| formatting::justify(d, TextAlignment::Right)).map(done)?,
            C::JustifyFull => self.journal(Text, |d| formatting::justify(d, TextAlignment::Full)).map(done)?,
            C::InsertOrderedList => self.journal(Text, |d| formatting::toggle_list(d, true)).map(done)?,
            C::InsertUnorderedList => self.journal(Text, |d| formatting::toggle_list(d, false)).map(done)?,
            C::InsertHorizontalRule => self.journal(Text, formatting::insert_horizontal_rule).map(done)?,
            C::FontName { name } => self
                .journal(Text, |d| formatting::apply_span_style(d, "font-family", name))
                .map(done)?,
            C::FontSize { size } => self
                .journal(Text, |d| formatting::apply_span_style(d, "font-size", size))
                .map(done)?,
            C::ForeColor { color } => self
                .journal(Text, |d| formatting::apply_span_style(d, "color", color))
                .map(done)?,
            C::HiliteColor { color } => self
                .journal(Text, |d| formatting::apply_span_style(d, "background-color", color))
                .map(done)?,

            C::InsertHtml { html } | C::Paste { html } => {
                self.journal(Text, |d| formatting::insert_html(d, html)).map(done)?
            }
            C::InsertText { text } => self.journal(Text, |d| formatting::insert_text(d, text)).map(done)?,
            C::Delete => self.journal(Text, formatting::delete).map(done)?,
            C::Cut => CommandOutput::Html(self.journal(Text, formatting::cut)?),
            C::Copy => CommandOutput::Html(formatting::copy(&self.doc)?),
            C::SelectAll => {
                formatting::select_all(&mut self.doc);
                CommandOutput::Done
            }

            C::SetHyperlink { id, href, text } => {
                self.journal(Hyperlink, |d| hyperlink::set_hyperlink(d, *id, href, text.as_deref()))?;
                CommandOutput::Id(*id)
            }
            C::ReplaceHyperlink { id, href, text } => self
                .journal(Hyperlink, |d| hyperlink::replace_hyperlink(d, *id, href, text.as_deref()))
                .map(done)?,
            C::RemoveHyperlink { id, completely } => self
                .journal(Hyperlink, |d| hyperlink::remove_hyperlink(d, *id, *completely))
                .map(done)?,

            C::Encrypt {
                cipher,
                key_length,
                encrypted_text,
                hint,
            } => {
                let info = FragmentInfo {
                    cipher: cipher.clone(),
                    key_length: *key_length,
                    encrypted_text: encrypted_text.clone(),
                    hint: hint.clone(),
                    id: None,
                };
                let icon = self.encrypted_icon.clone();
                let id = self.journal(Encryption, |d| encryption::encrypt_selection(d, &info, icon.as_deref()))?;
                self.refresh_encrypted_icons()?;
                CommandOutput::Id(id)
            }
            C::Decrypt { id, decrypted_html } => self
                .journal(Encryption, |d| encryption::decrypt(d, *id, decrypted_html))
                .map(done)?,
            C::HideDecryptedText { id } => {
                let icon = self.encrypted_icon.clone();
                self.journal(Encryption, |d| encryption::hide_decrypted(d, *id, icon.as_deref()))?;
                self.refresh_encrypted_icons()?;
                CommandOutput::Done
            }
            C::DecryptPermanently { id } => self
                .journal(Encryption, |d| encryption::decrypt_permanently(d, *id))
                .map(done)?,

            C::InsertResource { html } => {
                let nodes = self.journal(Resource, |d| resource::insert_resource(d, html))?;
                let media: Vec<NodeId> = nodes
                    .iter()
                    .flat_map(|&n| std::iter::once(n).chain(self.doc.descendants(n)))
                    .filter(|&n| resource::is_media(&self.doc, n))
                    .collect();
                self.request_resource_info(&media);
                CommandOutput::Count(media.len())
            }
            C::RemoveResource { hash } => self
                .journal(Resource, |d| resource::remove_resource(d, hash))
                .map(done)?,

            C::InsertTable { rows, columns, width } => {
                let table = self.journal(Text, |d| table::insert_table(d, *rows, *columns, *width))?;
                self.bindings.rebind(&self.doc);
                let index = (0..self.bindings.len())
                    .find(|&i| self.bindings.table(i) == Some(table))
                    .unwrap_or_default();
                CommandOutput::Count(index)
            }
            C::InsertTableRow => {
                let cell = table::current_cell(&self.doc)?;
                self.table_edit(cell.table, table::insert_row).map(done)?
            }
            C::InsertTableColumn => {
                let cell = table::current_cell(&self.doc)?;
                self.table_edit(cell.table, table::insert_column).map(done)?
            }
            C::RemoveTableRow => {
                let cell = table::current_cell(&self.doc)?;
                self.table_edit(cell.table, table::remove_row).map(done)?
            }
            C::RemoveTableColumn => {
                let cell = table::current_cell(&self.doc)?;
                self.table_edit(cell.table, table::remove_column).map(done)?
            }
            C::ResizeTableColumn {
                table_index,
                column,
                width,
            } => self.resize_table_column(*table_index, *column, *width).map(done)?,

            C::ResizeImage { hash, width, height } => self.resize_image(hash, *width, *height).map(done)?,

            C::Find { text, match_case } => CommandOutput::Found(find::find(&mut self.doc, text, *match_case)?),
            C::Replace {
                find: needle,
                replacement,
                match_case,
            } => self
                .journal(Replace, |d| find::replace(d, needle, replacement, *match_case))
                .map(done)?,
            C::ReplaceAll {
                find: needle,
                replacement,
                match_case,
            } => CommandOutput::Count(
                self.journal(Replace, |d| find::replace_all(d, needle, replacement, *match_case))?,
            ),

            C::ApplySpellCheck { words } => {
                self.pump();
                self.lift_highlights()?;
                self.spell_words = words.clone();
                CommandOutput::Count(self.reapply_highlights()?)
            }
            C::RemoveSpellCheck => {
                self.pump();
                let tracked = self.highlights.count();
                self.lift_highlights()?;
                self.spell_words.clear();
                let stray = self
                    .observer
                    .suspended(&mut self.doc, spelling::remove_spell_check)?;
                CommandOutput::Count(tracked + stray)
            }
            C::CorrectSpelling { replacement } => {
                let target = spelling::correction_target(&self.doc)?;
                self.journal(Spelling, |d| spelling::correct_spelling(d, target, replacement))
                    .map(done)?
            }
        };

        if !self.bindings.is_current(&self.doc) {
            self.bindings.rebind(&self.doc);
        }
        self.maybe_collect();
        Ok(output)
    }

    fn resize_table_column(&mut self, table_index: usize, column: usize, width: f64) -> Result<()> {
        if !self.bindings.is_current(&self.doc) {
            self.bindings.rebind(&self.doc);
        }
        let table = self
            .bindings
            .table(table_index)
            .ok_or_else(|| EditorError::NotFound(format!("table {table_index}")))?;
        if self.bindings.handle(table_index, column).is_none() {
            return Err(EditorError::NotFound(format!("column {column} of table {table_index}")));
        }
        self.table_edit(table, |d| table::resize_column(d, table, column, width))?;
        self.outbox.notify(HostNotification::TableResized {
            table_index,
            column,
            width,
        });
        Ok(())
    }

    fn resize_image(&mut self, hash: &str, width: f64, height: f64) -> Result<()> {
        self.pump();
        let before = self
            .observer
            .suspended(&mut self.doc, |d| image::resize_image(d, hash, width, height))?;
        self.ledgers.record_geometry(vec![before]);
        self.outbox
            .notify(HostNotification::DocumentChanged { mutations: 1 });
        Ok(())
    }

    // === History ===

    /// Undo the newest step of `kind`, or of whichever ledger was written
    /// last. Returns the ledger that was undone.
    pub fn undo(&mut self, kind: Option<LedgerKind>) -> Result<LedgerKind> {
        let kind = self.without_highlights(|this| {
            let span = selection_codec::save(&this.doc);
            let kind = match kind {
                Some(kind) => this
                    .ledgers
                    .undo(kind, &mut this.doc, &mut this.observer)
                    .map(|()| kind),
                None => this.ledgers.undo_last(&mut this.doc, &mut this.observer),
            }?;
            this.after_history(span);
            Ok(kind)
        })?;
        self.maybe_collect();
        Ok(kind)
    }

    pub fn redo(&mut self, kind: Option<LedgerKind>) -> Result<LedgerKind> {
        let kind = self.without_highlights(|this| {
            let span = selection_codec::save(&this.doc);
            let kind = match kind {
                Some(kind) => this
                    .ledgers
                    .redo(kind, &mut this.doc, &mut this.observer)
                    .map(|()| kind),
                None => this.ledgers.redo_last(&mut this.doc, &mut this.observer),
            }?;
            this.after_history(span);
            Ok(kind)
        })?;
        self.maybe_collect();
        Ok(kind)
    }

    fn after_history(&mut self, span: Option<SelectionSpan>) {
        // Table markup may have been rebuilt under the handles.
        self.bindings.rebind(&self.doc);
        if self.doc.selection().is_none() {
            selection_codec::restore(&mut self.doc, span);
        }
        self.word_buffer.clear();
        self.outbox
            .notify(HostNotification::DocumentChanged { mutations: 1 });
    }

    // === Input ===

    /// Text typed by the user. Observed like any page edit.
    pub fn type_text(&mut self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        self.without_highlights(|this| {
            formatting::insert_text(&mut this.doc, text)?;
            this.pump();
            Ok(())
        })?;
        self.maybe_collect();
        let words = self.track_words(text);
        if !words.is_empty() {
            self.outbox
                .notify(HostNotification::LastEnteredWords { words });
        }
        Ok(())
    }

    fn track_words(&mut self, text: &str) -> Vec<String> {
        let mut finished = Vec::new();
        for c in text.chars() {
            if c.is_alphanumeric() || c == '\'' {
                self.word_buffer.push(c);
            } else if !self.word_buffer.is_empty() {
                finished.push(std::mem::take(&mut self.word_buffer));
            }
        }
        finished
    }

    pub fn delete_backward(&mut self) -> Result<bool> {
        let deleted = self.without_highlights(|this| {
            let deleted = formatting::delete_backward(&mut this.doc)?;
            this.pump();
            Ok(deleted)
        })?;
        self.maybe_collect();
        self.word_buffer.pop();
        Ok(deleted)
    }

    pub fn set_selection(&mut self, span: SelectionSpan) -> Result<()> {
        if !selection_codec::restore(&mut self.doc, Some(span)) {
            return Err(EditorError::InvalidArgument(format!(
                "selection {}..{} is outside the document",
                span.start, span.end
            )));
        }
        self.word_buffer.clear();
        if self.outbox.has(crate::host::Capability::TextCursorPositionHandler) {
            self.cursor_position_state()?;
        }
        Ok(())
    }

    /// Store renderer boxes for hit testing. Returns how many paths resolved.
    pub fn report_layout(&mut self, boxes: &[LayoutBox]) -> Result<usize> {
        self.doc.clear_rects();
        let body = self.doc.body();
        let mut applied = 0;
        for layout in boxes {
            match self.doc.node_at_path(body, &layout.path) {
                Some(node) => {
                    self.doc.set_rect(node, Some(layout.rect))?;
                    applied += 1;
                }
                None => {
                    tracing::trace!(target: "inkpad::session", path = ?layout.path, "layout box for missing node");
                }
            }
        }
        Ok(applied)
    }

    /// Route a click to the host handler for whatever was hit. Returns
    /// whether anything handled it.
    pub fn click(&mut self, x: f32, y: f32) -> Result<bool> {
        let hits = self.doc.elements_from_point(x, y);
        let Some(top) = resolver::unwrap_first(&hits) else {
            return Ok(false);
        };
        let deepest = resolver::deepest_element_at(&self.doc, top, x, y, self.config.hit_test_depth);
        let body = self.doc.body();
        let chain: Vec<NodeId> = std::iter::once(deepest)
            .chain(self.doc.ancestors(deepest))
            .take_while(|&n| n != body)
            .collect();

        for el in chain {
            if todo::is_checkbox(&self.doc, el) {
                let Some(id) = todo::todo_id(&self.doc, el) else {
                    continue;
                };
                let checked = self.journal(LedgerKind::Text, |d| todo::flip_todo(d, id))?;
                self.outbox
                    .notify(HostNotification::TodoCheckboxClicked { id, checked });
                return Ok(true);
            }
            let action = if self.doc.has_class(el, OPEN_RESOURCE_BUTTON) {
                Some(ResourceButtonAction::Open)
            } else if self.doc.has_class(el, SAVE_RESOURCE_BUTTON) {
                Some(ResourceButtonAction::Save)
            } else {
                None
            };
            if let Some(action) = action {
                let hash = self
                    .doc
                    .ancestors(el)
                    .find(|&a| resource::is_media(&self.doc, a))
                    .and_then(|m| self.doc.attr(m, HASH))
                    .map(str::to_string);
                if let Some(hash) = hash {
                    self.outbox
                        .notify(HostNotification::ResourceButtonClicked { action, hash });
                    return Ok(true);
                }
            }
            if self.doc.attr(el, EN_TAG) == Some(EN_CRYPT) {
                let info = FragmentInfo::read(&self.doc, el, CRYPT_ID);
                self.outbox
                    .notify(HostNotification::EncryptedAreaClicked(info));
                return Ok(true);
            }
            if self.doc.has_tag(el, "a") {
                let id = self
                    .doc
                    .attr(el, crate::markers::HYPERLINK_ID)
                    .and_then(|v| v.trim().parse().ok());
                let href = self.doc.attr(el, "href").map(str::to_string);
                self.outbox
                    .notify(HostNotification::HyperlinkClicked { id, href });
                return Ok(true);
            }
        }
        Ok(false)
    }

    // === Queries ===

    pub fn context_menu_target(&mut self, sequence_number: u64, x: f32, y: f32) -> Result<ContextMenuTarget> {
        let target = resolver::classify_at_point(&mut self.doc, x, y, self.config.hit_test_depth)?;
        self.outbox.notify(HostNotification::ContextMenuContent {
            sequence_number,
            target: target.clone(),
        });
        Ok(target)
    }

    pub fn cursor_position_state(&mut self) -> Result<CursorPositionState> {
        let state = resolver::classify_at_selection(&self.doc)?;
        self.outbox
            .notify(HostNotification::CursorPositionState(state.clone()));
        Ok(state)
    }

    // === Host calls ===

    /// Answer to an earlier request.
    pub fn handle_response(&mut self, id: u64, response: HostResponse) -> Result<()> {
        let Some(request) = self.outbox.resolve(id) else {
            tracing::warn!(target: "inkpad::host", id, "response to unknown request ignored");
            return Ok(());
        };
        tracing::debug!(target: "inkpad::host", id, ?request, "response received");
        match response {
            HostResponse::ResourceInfo(info) => {
                self.observer
                    .suspended(&mut self.doc, |d| resource::apply_resource_info(d, &info))?;
            }
            HostResponse::GenericResourceImage { hash, path } => {
                self.observer
                    .suspended(&mut self.doc, |d| resource::generic_image_received(d, &hash, &path))?;
            }
            HostResponse::IconPath { path } => {
                self.set_encrypted_icon(path)?;
            }
        }
        Ok(())
    }

    /// Entry point for every call the host makes. Failures are reported in
    /// the result, never raised.
    pub fn handle_call(&mut self, call: HostCall) -> CallResult {
        let name = call.name();
        match self.dispatch_call(call) {
            Ok(None) => CallResult::ok(),
            Ok(Some(data)) => CallResult::with_data(data),
            Err(e) => {
                tracing::warn!(target: "inkpad::host", call = name, error = %e, "host call failed");
                CallResult::failed(e)
            }
        }
    }

    fn dispatch_call(&mut self, call: HostCall) -> Result<Option<Value>> {
        let data = match call {
            HostCall::SetDocument { html } => {
                self.load_document(&html)?;
                None
            }
            HostCall::GetHtml => Some(Value::String(self.html()?)),
            HostCall::ProvideSrcForResourceTags { sources } => {
                let pairs: Vec<(String, String)> = sources.into_iter().map(|s| (s.hash, s.path)).collect();
                let updated = self
                    .observer
                    .suspended(&mut self.doc, |d| resource::provide_src_for_resources(d, &pairs))?;
                Some(json!(updated))
            }
            HostCall::ProvideSrcForEncryptedTags { path } => Some(json!(self.set_encrypted_icon(path)?)),
            HostCall::ResourceInfoReceived(info) => {
                let applied = self
                    .observer
                    .suspended(&mut self.doc, |d| resource::apply_resource_info(d, &info))?;
                Some(json!(applied))
            }
            HostCall::GenericResourceImageReceived { hash, path } => {
                let applied = self
                    .observer
                    .suspended(&mut self.doc, |d| resource::generic_image_received(d, &hash, &path))?;
                Some(json!(applied))
            }
            HostCall::DetermineContextMenuTarget { sequence_number, x, y } => {
                Some(serde_json::to_value(self.context_menu_target(sequence_number, x, y)?)?)
            }
            HostCall::DetermineCursorPositionStates => Some(serde_json::to_value(self.cursor_position_state()?)?),
            HostCall::DecryptPermanently { id } => {
                self.execute(&EditorCommand::DecryptPermanently { id })?;
                None
            }
            HostCall::HideDecryptedText { id } => {
                self.execute(&EditorCommand::HideDecryptedText { id })?;
                None
            }
            HostCall::FlipTodoState { id } => {
                let checked = self.journal(LedgerKind::Text, |d| todo::flip_todo(d, id))?;
                Some(json!(checked))
            }
            HostCall::UpdateResourceHash { old_hash, new_hash } => {
                let updated = self
                    .observer
                    .suspended(&mut self.doc, |d| resource::update_resource_hash(d, &old_hash, &new_hash))?;
                if updated > 0 {
                    self.outbox
                        .request(HostRequest::ResourceInfo { hash: new_hash });
                }
                Some(json!(updated))
            }
            HostCall::UpdateImageSrc { hash, path } => {
                let applied = self
                    .observer
                    .suspended(&mut self.doc, |d| resource::update_image_src(d, &hash, &path))?;
                Some(json!(applied))
            }
            HostCall::SetSelection { span } => {
                self.set_selection(span)?;
                None
            }
            HostCall::ReportLayout { boxes } => Some(json!(self.report_layout(&boxes)?)),
            HostCall::TypeText { text } => {
                self.type_text(&text)?;
                None
            }
            HostCall::DeleteBackward => Some(json!(self.delete_backward()?)),
            HostCall::Click { x, y } => Some(json!(self.click(x, y)?)),
            HostCall::Execute { command } => self.execute(&command)?.to_value(),
            HostCall::Undo { ledger } => Some(json!(self.undo(ledger)?)),
            HostCall::Redo { ledger } => Some(json!(self.redo(ledger)?)),
        };
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Capability;
    use crate::markers::{DECRYPTED_ID, ENCRYPTED_TEXT};
    use inkpad_dom::Rect;

    fn session(html: &str) -> EditorSession {
        let mut session = EditorSession::default();
        session.connect_host(CapabilitySet::all());
        session.load_document(html).unwrap();
        session.drain_outgoing();
        session
    }

    fn body_html(session: &EditorSession) -> String {
        session.document().inner_html(session.document().body())
    }

    fn select(session: &mut EditorSession, start: usize, end: usize) {
        session.set_selection(SelectionSpan::new(start, end)).unwrap();
    }

    fn notifications(session: &mut EditorSession) -> Vec<HostNotification> {
        session
            .drain_outgoing()
            .into_iter()
            .filter_map(|o| match o {
                Outgoing::Notify(n) => Some(n),
                Outgoing::Request { .. } => None,
            })
            .collect()
    }

    #[test]
    fn test_bold_undo_redo() {
        let mut s = session("<p>abc</p>");
        select(&mut s, 1, 2);
        s.execute(&EditorCommand::Bold).unwrap();
        assert_eq!(body_html(&s), "<p>a<b>b</b>c</p>");
        assert_eq!(s.ledgers().undo_len(LedgerKind::Text), 1);

        assert_eq!(s.undo(None).unwrap(), LedgerKind::Text);
        assert_eq!(body_html(&s), "<p>abc</p>");
        assert_eq!(s.redo(None).unwrap(), LedgerKind::Text);
        assert_eq!(body_html(&s), "<p>a<b>b</b>c</p>");
    }

    #[test]
    fn test_bold_toggle_off_undoes_exactly() {
        let mut s = session("<p>hello <b>world</b></p>");
        select(&mut s, 6, 11);
        s.execute(&EditorCommand::Bold).unwrap();
        assert_eq!(body_html(&s), "<p>hello world</p>");

        s.undo(None).unwrap();
        assert_eq!(body_html(&s), "<p>hello <b>world</b></p>");
        s.redo(None).unwrap();
        assert_eq!(body_html(&s), "<p>hello world</p>");
    }

    #[test]
    fn test_undo_typing_under_spelling_highlights() {
        let mut s = session("<p>x</p>");
        select(&mut s, 1, 1);
        s.type_text(" teh cat").unwrap();
        let out = s
            .execute(&EditorCommand::ApplySpellCheck { words: vec!["teh".into()] })
            .unwrap();
        assert_eq!(out, CommandOutput::Count(1));
        assert_eq!(body_html(&s), r#"<p>x <span class="misspell">teh</span> cat</p>"#);

        assert_eq!(s.undo(None).unwrap(), LedgerKind::Text);
        assert_eq!(s.html().unwrap(), "<p>x</p>");
        assert_eq!(body_html(&s), "<p>x</p>");

        s.redo(None).unwrap();
        assert_eq!(s.html().unwrap(), "<p>x teh cat</p>");
        assert_eq!(body_html(&s), r#"<p>x <span class="misspell">teh</span> cat</p>"#);
    }

    #[test]
    fn test_spelling_correction_is_one_step() {
        let mut s = session("<p>a teh b teh</p>");
        s.execute(&EditorCommand::ApplySpellCheck { words: vec!["teh".into()] })
            .unwrap();
        select(&mut s, 3, 3);
        s.execute(&EditorCommand::CorrectSpelling { replacement: "the".into() })
            .unwrap();
        assert_eq!(body_html(&s), r#"<p>a the b <span class="misspell">teh</span></p>"#);
        assert_eq!(s.ledgers().undo_len(LedgerKind::Spelling), 1);

        s.undo(Some(LedgerKind::Spelling)).unwrap();
        assert_eq!(
            body_html(&s),
            r#"<p>a <span class="misspell">teh</span> b <span class="misspell">teh</span></p>"#
        );
        let out = s.execute(&EditorCommand::RemoveSpellCheck).unwrap();
        assert_eq!(out, CommandOutput::Count(2));
        assert_eq!(body_html(&s), "<p>a teh b teh</p>");
        let doc = s.document();
        let p = doc.first_child(doc.body()).unwrap();
        assert_eq!(doc.children(p).len(), 1);
    }

    #[test]
    fn test_sweep_keeps_history_working() {
        let mut s = EditorSession::new(EditorConfig {
            gc_interval: 1,
            ..EditorConfig::default()
        });
        s.load_document("<p>old</p>").unwrap();
        s.load_document("<p>abc</p>").unwrap();
        // The first document's paragraph and text were swept.
        assert!(s.document().free_len() >= 2);

        select(&mut s, 1, 2);
        s.execute(&EditorCommand::Bold).unwrap();
        let bold = body_html(&s);
        select(&mut s, 0, 3);
        s.execute(&EditorCommand::Italic).unwrap();
        let both = body_html(&s);
        assert_eq!(s.document().allocated_since_gc(), 0);

        s.undo(None).unwrap();
        assert_eq!(body_html(&s), bold);
        s.undo(None).unwrap();
        assert_eq!(body_html(&s), "<p>abc</p>");
        s.redo(None).unwrap();
        s.redo(None).unwrap();
        assert_eq!(body_html(&s), both);
    }

    #[test]
    fn test_failed_command_leaves_no_trace() {
        let mut s = session(r#"<p><a en-hyperlink-id="1" href="x">a</a><a en-hyperlink-id="1" href="y">b</a></p>"#);
        let before = body_html(&s);
        let result = s.handle_call(HostCall::Execute {
            command: EditorCommand::RemoveHyperlink { id: 1, completely: true },
        });
        assert!(!result.status);
        assert!(result.error.unwrap().contains("2 elements"));
        assert_eq!(body_html(&s), before);
        assert!(!s.ledgers().can_undo(LedgerKind::Hyperlink));
    }

    #[test]
    fn test_table_row_insert_is_one_table_step() {
        let mut s = session(
            r#"<table><tbody><tr><td style="width: 50px;">a</td><td style="width: 50px;">b</td></tr><tr><td>c</td><td>d</td></tr></tbody></table>"#,
        );
        assert_eq!(s.bindings().len(), 1);
        select(&mut s, 0, 0);
        s.execute(&EditorCommand::InsertTableRow).unwrap();
        let table = s.bindings().table(0).unwrap();
        assert_eq!(table::rows_of(s.document(), table).len(), 3);

        assert_eq!(s.undo(Some(LedgerKind::Table)).unwrap(), LedgerKind::Table);
        assert_eq!(table::rows_of(s.document(), table).len(), 2);
        // Undo rebuilt the rows, so the handles were rebound.
        assert!(s.bindings().is_current(s.document()));
    }

    #[test]
    fn test_column_resize_through_bindings() {
        let mut s = session(
            r#"<table><tbody><tr><td style="width: 100px;">a</td><td style="width: 100px;">b</td></tr></tbody></table>"#,
        );
        s.execute(&EditorCommand::ResizeTableColumn {
            table_index: 0,
            column: 0,
            width: 120.0,
        })
        .unwrap();
        assert_eq!(
            body_html(&s),
            r#"<table><tbody><tr><td style="width: 120px;">a</td><td style="width: 80px;">b</td></tr></tbody></table>"#
        );
        assert!(notifications(&mut s).contains(&HostNotification::TableResized {
            table_index: 0,
            column: 0,
            width: 120.0,
        }));
        assert!(s.execute(&EditorCommand::ResizeTableColumn { table_index: 3, column: 0, width: 1.0 }).is_err());
    }

    #[test]
    fn test_replace_all_undoes_as_one_step() {
        let mut s = session("<p>cat cat cat</p>");
        let out = s
            .execute(&EditorCommand::ReplaceAll {
                find: "cat".into(),
                replacement: "dog".into(),
                match_case: false,
            })
            .unwrap();
        assert_eq!(out, CommandOutput::Count(3));
        assert_eq!(body_html(&s), "<p>dog dog dog</p>");

        s.undo(Some(LedgerKind::Replace)).unwrap();
        assert_eq!(body_html(&s), "<p>cat cat cat</p>");
        assert!(!s.ledgers().can_undo(LedgerKind::Replace));
    }

    #[test]
    fn test_encrypted_round_trip() {
        let mut s = session("<p>my secret here</p>");
        select(&mut s, 3, 9);
        let id = match s
            .execute(&EditorCommand::Encrypt {
                cipher: "AES".into(),
                key_length: 128,
                encrypted_text: "Q0lQSEVS".into(),
                hint: None,
            })
            .unwrap()
        {
            CommandOutput::Id(id) => id,
            other => panic!("unexpected output {other:?}"),
        };
        assert!(!s.document().text_content(s.document().body()).contains("secret"));
        // No icon yet, so one was asked for.
        assert!(s.drain_outgoing().iter().any(|o| matches!(
            o,
            Outgoing::Request { request: HostRequest::IconPath { .. }, .. }
        )));

        s.execute(&EditorCommand::Decrypt {
            id,
            decrypted_html: "secret".into(),
        })
        .unwrap();
        assert!(crate::lookup::by_attr(s.document(), DECRYPTED_ID, &id.to_string()).first().is_some());

        s.undo(Some(LedgerKind::Encryption)).unwrap();
        let encrypted = crate::lookup::by_attr(s.document(), CRYPT_ID, &id.to_string())
            .unique("fragment")
            .unwrap();
        assert_eq!(s.document().attr(encrypted, ENCRYPTED_TEXT), Some("Q0lQSEVS"));
    }

    #[test]
    fn test_typing_is_observed() {
        let mut s = session("<p>x</p>");
        select(&mut s, 1, 1);
        s.drain_outgoing();
        s.type_text(" hello wor").unwrap();
        let sent = notifications(&mut s);
        assert!(sent.iter().any(|n| matches!(n, HostNotification::DocumentChanged { .. })));
        assert!(sent.contains(&HostNotification::LastEnteredWords {
            words: vec!["hello".into()]
        }));
        assert_eq!(s.ledgers().undo_len(LedgerKind::Text), 1);

        s.undo(None).unwrap();
        assert_eq!(body_html(&s), "<p>x</p>");
    }

    #[test]
    fn test_missing_capability_does_not_fail_calls() {
        let mut s = EditorSession::default();
        s.load_document("<p>abc</p>").unwrap();
        let result = s.handle_call(HostCall::SetSelection {
            span: SelectionSpan::new(0, 3),
        });
        assert!(result.status);
        assert!(s.drain_outgoing().is_empty());
    }

    #[test]
    fn test_click_flips_todo() {
        let mut s = session(r#"<div><img class="checkbox_unchecked" en-todo-id="7">buy milk</div>"#);
        let applied = s
            .report_layout(&[
                LayoutBox { path: vec![], rect: Rect::new(0.0, 0.0, 500.0, 500.0) },
                LayoutBox { path: vec![0], rect: Rect::new(0.0, 0.0, 500.0, 20.0) },
                LayoutBox { path: vec![0, 0], rect: Rect::new(0.0, 0.0, 16.0, 16.0) },
            ])
            .unwrap();
        assert_eq!(applied, 3);
        assert!(s.click(4.0, 4.0).unwrap());
        assert!(notifications(&mut s).contains(&HostNotification::TodoCheckboxClicked { id: 7, checked: true }));
        assert!(body_html(&s).contains("checkbox_checked"));
        assert!(!s.click(400.0, 100.0).unwrap());
    }

    #[test]
    fn test_html_strips_page_chrome() {
        let mut s = session(r#"<p>teh <img en-tag="en-media" hash="h" type="image/png" width="10" height="10"></p>"#);
        s.execute(&EditorCommand::ApplySpellCheck { words: vec!["teh".into()] })
            .unwrap();
        s.execute(&EditorCommand::ResizeImage {
            hash: "h".into(),
            width: 20.0,
            height: 20.0,
        })
        .unwrap();
        assert!(body_html(&s).contains("ui-wrapper"));
        assert_eq!(
            s.html().unwrap(),
            r#"<p>teh <img en-tag="en-media" hash="h" type="image/png" width="20" height="20"></p>"#
        );

        s.undo(Some(LedgerKind::ImageResize)).unwrap();
        assert!(s.html().unwrap().contains(r#"width="10""#));
    }

    #[test]
    fn test_resource_info_round_trip() {
        let mut s = EditorSession::default();
        s.connect_host([Capability::ResourceCache].into_iter().collect());
        s.load_document(r#"<div en-tag="en-media" hash="pdf" type="application/pdf"></div>"#)
            .unwrap();
        let id = match s.drain_outgoing().as_slice() {
            [Outgoing::Request { id, request: HostRequest::ResourceInfo { hash } }] if hash == "pdf" => *id,
            other => panic!("unexpected outgoing {other:?}"),
        };
        let info = resource::ResourceInfo {
            hash: "pdf".into(),
            mime: "application/pdf".into(),
            display_name: "a.pdf".into(),
            display_size: "1 KB".into(),
            icon_path: None,
            file_path: None,
        };
        s.handle_response(id, HostResponse::ResourceInfo(info)).unwrap();
        assert!(body_html(&s).contains(r#"<span class="resource-name">a.pdf</span>"#));
        assert_eq!(s.outbox().pending_len(), 0);
        // Host-driven updates are not user edits.
        assert!(!s.ledgers().can_undo(LedgerKind::Resource));
    }
}
