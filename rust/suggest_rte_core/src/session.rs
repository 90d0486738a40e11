//! Synchronous editing session: document, undo history and mutation tracker
//! moving together through one update cycle.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::debug;

use crate::command::Command;
use crate::config::{AccessLevel, EngineConfig};
use crate::doc::Document;
use crate::error::Result;
use crate::history::History;
use crate::resolve::{self, Resolution};
use crate::suggestion::SuggestionId;
use crate::summary::{summarize_ranges, SummaryFragment};
use crate::tracker::{MutationTracker, TrackerOutcome, UpdateTag};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EditorMode {
    /// Edits apply directly.
    Edit,
    /// Edits are recorded as suggestions.
    Suggest,
    /// Read-only.
    Preview,
}

#[derive(Debug)]
pub struct Session {
    doc: Document,
    history: History,
    tracker: MutationTracker,
    mode: EditorMode,
    editable: bool,
    config: EngineConfig,
}

impl Session {
    pub fn new(mut doc: Document, config: EngineConfig) -> Self {
        let mut tracker = MutationTracker::new();
        doc.normalize();
        // Ranges already in the document are indexed but never get threads
        // created on their behalf.
        tracker.observe(&doc.take_mutations(), UpdateTag::Collaboration);
        let mode = config.access_level.initial_mode();
        Self {
            doc,
            history: History::new(config.history_limit),
            tracker,
            mode,
            editable: mode != EditorMode::Preview,
            config,
        }
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn tracker(&self) -> &MutationTracker {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut MutationTracker {
        &mut self.tracker
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn mode(&self) -> EditorMode {
        self.mode
    }

    pub fn is_editable(&self) -> bool {
        self.editable
    }

    /// Switching to an editing mode makes the editor editable again.
    pub fn set_mode(&mut self, mode: EditorMode) {
        self.mode = mode;
        self.editable = mode != EditorMode::Preview;
    }

    pub fn set_editable(&mut self, editable: bool) {
        self.editable = editable;
    }

    /// Flip between edit and suggest, within what the access level allows.
    pub fn toggle_mode(&mut self) -> EditorMode {
        let next = match (self.config.access_level, self.mode) {
            (AccessLevel::Read, _) => EditorMode::Preview,
            (AccessLevel::Comment, _) => EditorMode::Suggest,
            (_, EditorMode::Suggest) => EditorMode::Edit,
            _ => EditorMode::Suggest,
        };
        self.set_mode(next);
        next
    }

    /// Composition input cannot be tracked as a suggestion: leave suggest
    /// mode for a read-only preview. Returns false outside suggest mode.
    pub fn start_composition(&mut self) -> bool {
        if self.mode != EditorMode::Suggest {
            return false;
        }
        self.set_mode(EditorMode::Preview);
        true
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Run a command as a suggestion. Only acts in suggest mode.
    pub fn dispatch(&mut self, command: &Command) -> Result<(bool, TrackerOutcome)> {
        if self.mode != EditorMode::Suggest || !self.editable {
            debug!(mode = %self.mode, editable = self.editable, "not recording suggestions");
            return Ok((false, TrackerOutcome::default()));
        }
        let before = self.doc.snapshot();
        match command.apply(&mut self.doc, &mut self.tracker) {
            Ok(true) => {
                self.history.push(before);
                Ok((true, self.finish(UpdateTag::Local)))
            }
            Ok(false) => {
                // A builder may have split text before giving up.
                Ok((false, self.finish(UpdateTag::Local)))
            }
            Err(e) => {
                self.doc.rollback(before);
                Err(e)
            }
        }
    }

    /// Apply a direct edit. Collaboration updates stay out of the undo history.
    pub fn update<T>(&mut self, tag: UpdateTag, f: impl FnOnce(&mut Document) -> Result<T>) -> Result<(T, TrackerOutcome)> {
        let before = self.doc.snapshot();
        match f(&mut self.doc) {
            Ok(value) => {
                if tag != UpdateTag::Collaboration {
                    self.history.push(before);
                }
                Ok((value, self.finish(tag)))
            }
            Err(e) => {
                self.doc.rollback(before);
                Err(e)
            }
        }
    }

    pub fn undo(&mut self) -> Option<TrackerOutcome> {
        self.history.undo(&mut self.doc).then(|| self.finish(UpdateTag::Undo))
    }

    pub fn redo(&mut self) -> Option<TrackerOutcome> {
        self.history.redo(&mut self.doc).then(|| self.finish(UpdateTag::Redo))
    }

    /// Tree half of accept/reject, recorded in the undo history.
    pub fn resolve(&mut self, id: &SuggestionId, resolution: Resolution) -> Result<(bool, TrackerOutcome)> {
        if !self.editable {
            return Ok((false, TrackerOutcome::default()));
        }
        let before = self.doc.snapshot();
        let ranges = self.tracker.marks().ranges(&self.doc, id);
        match resolve::resolve_ranges(&mut self.doc, id, ranges, resolution) {
            Ok(true) => {
                self.history.push(before);
                Ok((true, self.finish(UpdateTag::Local)))
            }
            Ok(false) => Ok((false, TrackerOutcome::default())),
            Err(e) => {
                self.doc.rollback(before);
                Err(e)
            }
        }
    }

    pub fn summary(&self, id: &SuggestionId) -> Vec<SummaryFragment> {
        let ranges = self.tracker.marks().ranges(&self.doc, id);
        summarize_ranges(&self.doc, &ranges, self.config.summary_char_cap)
    }

    fn finish(&mut self, tag: UpdateTag) -> TrackerOutcome {
        self.doc.normalize();
        let mutations = self.doc.take_mutations();
        self.tracker.observe(&mutations, tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc::Point;
    use crate::selection::TextRange;
    use crate::summary::{generate_summary, DEFAULT_CHAR_CAP};

    fn suggesting(doc: Document) -> Session {
        let config = EngineConfig { access_level: AccessLevel::Comment, ..Default::default() };
        Session::new(doc, config)
    }

    #[test]
    fn test_dispatch_reports_new_suggestion() {
        let mut doc = Document::new();
        let (_, text) = doc.append_paragraph("abc");
        let mut session = suggesting(doc);
        let (handled, outcome) =
            session.dispatch(&Command::InsertText { at: Point::new(text, 3), text: "d".into() }).unwrap();
        assert!(handled);
        assert_eq!(outcome.to_create.len(), 1);
        assert!(session.can_undo());
    }

    #[test]
    fn test_edit_mode_does_not_record() {
        let mut doc = Document::new();
        let (_, text) = doc.append_paragraph("abc");
        let mut session = Session::new(doc, EngineConfig::default());
        assert_eq!(session.mode(), EditorMode::Edit);
        let (handled, _) = session.dispatch(&Command::InsertText { at: Point::new(text, 0), text: "x".into() }).unwrap();
        assert!(!handled);
    }

    #[test]
    fn test_undo_and_redo_report_range_changes() {
        let mut doc = Document::new();
        let (_, text) = doc.append_paragraph("abc");
        let mut session = suggesting(doc);
        let (_, outcome) =
            session.dispatch(&Command::InsertText { at: Point::new(text, 3), text: "d".into() }).unwrap();
        let id = outcome.to_create[0].clone();
        session.tracker_mut().thread_created(&id);

        let undone = session.undo().unwrap();
        assert_eq!(undone.vanished, vec![id.clone()]);
        let redone = session.redo().unwrap();
        assert!(redone.to_create.is_empty());
        assert!(session.document().suggestion_ids().contains(&id));
    }

    #[test]
    fn test_existing_ranges_are_indexed_without_threads() {
        let json = r#"{"root":{"type":"root","children":[{"type":"block","block_type":"paragraph","children":[{"type":"suggestion","id":"old","kind":"insert","children":[{"type":"text","text":"x"}]}]}]}}"#;
        let session = suggesting(Document::from_json(json).unwrap());
        assert!(session.tracker().marks().contains(&SuggestionId::from("old")));
        assert!(!session.tracker().is_awaiting_thread(&SuggestionId::from("old")));
    }

    #[test]
    fn test_mark_map_finds_ranges_in_document_order() {
        let mut doc = Document::new();
        let (_, first) = doc.append_paragraph("abc");
        let (_, second) = doc.append_paragraph("xyz");
        let mut session = suggesting(doc);
        let (_, outcome) = session
            .dispatch(&Command::ReplaceText { range: TextRange::new(Point::new(second, 0), Point::new(second, 1)), text: "Q".into() })
            .unwrap();
        let id = outcome.to_create[0].clone();
        session.dispatch(&Command::InsertText { at: Point::new(first, 0), text: "n".into() }).unwrap();

        let mapped = session.tracker().marks().ranges(session.document(), &id);
        assert_eq!(mapped, session.document().suggestion_nodes(&id));
        assert_eq!(session.summary(&id), generate_summary(session.document(), &id, DEFAULT_CHAR_CAP));

        let (changed, _) = session.resolve(&id, Resolution::Reject).unwrap();
        assert!(changed);
        assert_eq!(session.document().text_content(session.document().root()), "nabcxyz");
        assert!(session.tracker().marks().ranges(session.document(), &id).is_empty());
    }

    #[test]
    fn test_toggle_respects_access_level() {
        let mut session = Session::new(Document::new(), EngineConfig::default());
        assert_eq!(session.toggle_mode(), EditorMode::Suggest);
        assert_eq!(session.toggle_mode(), EditorMode::Edit);

        let mut commenter = suggesting(Document::new());
        assert_eq!(commenter.toggle_mode(), EditorMode::Suggest);
        assert!(commenter.start_composition());
        assert_eq!(commenter.mode(), EditorMode::Preview);
        assert!(!commenter.is_editable());
        assert!(!commenter.start_composition());
    }
}
