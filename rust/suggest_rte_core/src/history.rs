//! Snapshot undo/redo history for the document.

use std::collections::VecDeque;

use crate::doc::Document;

#[derive(Debug, Clone)]
pub struct History {
    undo_stack: VecDeque<Document>,
    redo_stack: Vec<Document>,
    limit: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(200)
    }
}

impl History {
    pub fn new(limit: usize) -> Self {
        Self { undo_stack: VecDeque::new(), redo_stack: Vec::new(), limit: limit.max(1) }
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Record the current state before making a change.
    pub fn record_before_change(&mut self, current: &Document) {
        self.push(current.snapshot());
    }

    /// Record a snapshot taken before a change that has since been applied.
    pub fn push(&mut self, snapshot: Document) {
        if self.undo_stack.len() == self.limit {
            self.undo_stack.pop_front();
        }
        self.undo_stack.push_back(snapshot);
        self.redo_stack.clear();
    }

    /// Drop the last recorded state, for a change that turned out to be a no-op.
    pub fn discard_last(&mut self) {
        self.undo_stack.pop_back();
    }

    /// Undo into the provided doc. Returns true if a change occurred.
    pub fn undo(&mut self, doc: &mut Document) -> bool {
        match self.undo_stack.pop_back() {
            Some(prev) => {
                self.redo_stack.push(doc.snapshot());
                doc.restore(prev);
                true
            }
            None => false,
        }
    }

    /// Redo into the provided doc. Returns true if a change occurred.
    pub fn redo(&mut self, doc: &mut Document) -> bool {
        match self.redo_stack.pop() {
            Some(next) => {
                self.undo_stack.push_back(doc.snapshot());
                doc.restore(next);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undo_redo_round_trip() {
        let mut doc = Document::new();
        let mut history = History::new(10);
        history.record_before_change(&doc);
        doc.append_paragraph("typed");
        assert!(history.undo(&mut doc));
        assert_eq!(doc.text_content(doc.root()), "");
        assert!(history.redo(&mut doc));
        assert_eq!(doc.text_content(doc.root()), "typed");
        assert!(!history.redo(&mut doc));
    }

    #[test]
    fn test_limit_drops_oldest() {
        let mut doc = Document::new();
        let mut history = History::new(2);
        for word in ["a", "b", "c"] {
            history.record_before_change(&doc);
            doc.append_paragraph(word);
        }
        assert!(history.undo(&mut doc));
        assert!(history.undo(&mut doc));
        assert!(!history.undo(&mut doc));
        assert_eq!(doc.text_content(doc.root()), "a");
    }
}
