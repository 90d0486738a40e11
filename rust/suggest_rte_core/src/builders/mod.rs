//! Per-operation suggestion builders.
//!
//! Each builder performs one edit on the document and records it as a
//! suggestion: it creates a new range, extends or absorbs into an existing one,
//! or cancels a complementary suggestion made earlier in the session. Builders
//! return `Ok(true)` when they handled the edit and `Ok(false)` when a
//! precondition is missing, so the host can fall through to its default.

pub mod block_type;
pub mod divider;
pub mod format;
pub mod image;
pub mod link;
pub mod list;
pub mod table;
pub mod text;

use crate::doc::{Document, NodeKey};
use crate::suggestion::{SuggestionId, SuggestionMark, SuggestionType};

/// Receives ids of suggestions created by builders.
pub trait SuggestionSink {
    fn on_created(&mut self, id: &SuggestionId);

    /// Whether `id` was authored in this editing session.
    fn is_local(&self, id: &SuggestionId) -> bool;
}

/// A sink that only records ids. Handy for one-shot transformations.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub created: Vec<SuggestionId>,
}

impl SuggestionSink for CollectingSink {
    fn on_created(&mut self, id: &SuggestionId) {
        if !self.created.contains(id) {
            self.created.push(id.clone());
        }
    }

    fn is_local(&self, id: &SuggestionId) -> bool {
        self.created.contains(id)
    }
}

/// Nearest enclosing range of `kind` around `key`, inside `block`.
pub(crate) fn enclosing(doc: &Document, key: NodeKey, block: NodeKey, kind: SuggestionType) -> Option<NodeKey> {
    doc.enclosing_suggestion(key, block, |m| m.kind == kind)
}

/// Nearest enclosing `insert` range authored in this session.
pub(crate) fn local_insert(doc: &Document, key: NodeKey, block: NodeKey, sink: &dyn SuggestionSink) -> Option<NodeKey> {
    doc.enclosing_suggestion(key, block, |m| m.kind == SuggestionType::Insert && sink.is_local(&m.id))
}

/// Marker of `kind` sitting among `block`'s direct children.
pub(crate) fn block_marker(doc: &Document, block: NodeKey, kind: SuggestionType) -> Option<NodeKey> {
    doc.children(block).iter().copied().find(|&k| doc.mark(k).is_some_and(|m| m.kind == kind))
}

/// Put a fresh marker in front of a block's content.
pub(crate) fn insert_marker(doc: &mut Document, block: NodeKey, mark: SuggestionMark) -> crate::error::Result<NodeKey> {
    let marker = doc.create_suggestion(mark);
    doc.insert_at(block, 0, marker)?;
    Ok(marker)
}
