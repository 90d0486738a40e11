//! Mutation tracker: keeps the mark-node map current and decides which
//! suggestion ids need a thread.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::debug;

use crate::builders::SuggestionSink;
use crate::doc::{Document, NodeKey, SuggestionMutation};
use crate::suggestion::SuggestionId;

/// Where an update came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateTag {
    Local,
    /// Applied from a remote collaborator; never creates threads.
    Collaboration,
    Undo,
    Redo,
}

/// Index from suggestion id to the range nodes carrying it. A cache over the
/// tree, not the source of truth.
#[derive(Debug, Default, Clone)]
pub struct MarkNodeMap {
    by_id: HashMap<SuggestionId, BTreeSet<NodeKey>>,
    key_to_id: HashMap<NodeKey, SuggestionId>,
}

impl MarkNodeMap {
    pub fn keys(&self, id: &SuggestionId) -> Option<&BTreeSet<NodeKey>> {
        self.by_id.get(id)
    }

    /// Range nodes of `id` in document order. Keys that no longer carry the
    /// id are skipped.
    pub fn ranges(&self, doc: &Document, id: &SuggestionId) -> Vec<NodeKey> {
        let Some(keys) = self.by_id.get(id) else { return Vec::new() };
        doc.in_document_order(keys.iter().copied().filter(|&k| doc.mark(k).is_some_and(|m| &m.id == id)))
    }

    pub fn contains(&self, id: &SuggestionId) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &SuggestionId> {
        self.by_id.keys()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Returns true when this is the first key for the id.
    fn insert(&mut self, key: NodeKey, id: SuggestionId) -> bool {
        self.key_to_id.insert(key, id.clone());
        let keys = self.by_id.entry(id).or_default();
        keys.insert(key);
        keys.len() == 1
    }

    /// Returns the id when its last key went away.
    fn remove(&mut self, key: NodeKey) -> Option<SuggestionId> {
        let id = self.key_to_id.remove(&key)?;
        let keys = self.by_id.get_mut(&id)?;
        keys.remove(&key);
        if keys.is_empty() {
            self.by_id.remove(&id);
            return Some(id);
        }
        None
    }
}

/// What one batch of mutations means for threads.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TrackerOutcome {
    /// Ids that just appeared and were authored here: create a thread.
    pub to_create: Vec<SuggestionId>,
    /// Ids whose last range went away.
    pub vanished: Vec<SuggestionId>,
}

impl TrackerOutcome {
    pub fn merge(&mut self, other: TrackerOutcome) {
        for id in other.to_create {
            if !self.to_create.contains(&id) {
                self.to_create.push(id);
            }
        }
        self.vanished.extend(other.vanished);
    }
}

#[derive(Debug, Default)]
pub struct MutationTracker {
    marks: MarkNodeMap,
    /// Created in this session and still waiting for a thread.
    awaiting_thread: HashSet<SuggestionId>,
    /// Every id authored in this session.
    authored: HashSet<SuggestionId>,
    /// Ids whose ranges disappeared during a redo.
    redo_vanished: HashSet<SuggestionId>,
}

impl MutationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn marks(&self) -> &MarkNodeMap {
        &self.marks
    }

    pub fn is_awaiting_thread(&self, id: &SuggestionId) -> bool {
        self.awaiting_thread.contains(id)
    }

    /// A thread now exists for `id`.
    pub fn thread_created(&mut self, id: &SuggestionId) {
        self.awaiting_thread.remove(id);
    }

    /// Consume the "vanished during redo" flag for `id`.
    pub fn take_redo_vanished(&mut self, id: &SuggestionId) -> bool {
        self.redo_vanished.remove(id)
    }

    pub fn observe(&mut self, mutations: &[SuggestionMutation], tag: UpdateTag) -> TrackerOutcome {
        let mut outcome = TrackerOutcome::default();
        for m in mutations {
            match m {
                SuggestionMutation::Created { key, id } => {
                    let first = self.marks.insert(*key, id.clone());
                    self.redo_vanished.remove(id);
                    if first && tag != UpdateTag::Collaboration && self.awaiting_thread.contains(id) {
                        if !outcome.to_create.contains(id) {
                            outcome.to_create.push(id.clone());
                        }
                    } else if first {
                        debug!(%id, ?tag, "suggestion appeared without a local author");
                    }
                }
                SuggestionMutation::Destroyed { key } => {
                    if let Some(id) = self.marks.remove(*key) {
                        if tag == UpdateTag::Redo {
                            self.redo_vanished.insert(id.clone());
                        }
                        outcome.to_create.retain(|c| c != &id);
                        outcome.vanished.push(id);
                    }
                }
            }
        }
        outcome
    }
}

impl SuggestionSink for MutationTracker {
    fn on_created(&mut self, id: &SuggestionId) {
        self.authored.insert(id.clone());
        self.awaiting_thread.insert(id.clone());
    }

    fn is_local(&self, id: &SuggestionId) -> bool {
        self.authored.contains(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn created(key: u32, id: &str) -> SuggestionMutation {
        SuggestionMutation::Created { key: NodeKey::from(key), id: SuggestionId::from(id) }
    }

    fn destroyed(key: u32) -> SuggestionMutation {
        SuggestionMutation::Destroyed { key: NodeKey::from(key) }
    }

    #[test]
    fn test_first_key_of_local_id_requests_thread() {
        let mut tracker = MutationTracker::new();
        let id = SuggestionId::from("s1");
        tracker.on_created(&id);
        let outcome = tracker.observe(&[created(1, "s1"), created(2, "s1")], UpdateTag::Local);
        assert_eq!(outcome.to_create, vec![id.clone()]);
        assert_eq!(tracker.marks().keys(&id).unwrap().len(), 2);

        tracker.thread_created(&id);
        assert!(!tracker.is_awaiting_thread(&id));
        assert!(tracker.is_local(&id));
    }

    #[test]
    fn test_collaboration_updates_never_create_threads() {
        let mut tracker = MutationTracker::new();
        tracker.on_created(&SuggestionId::from("s1"));
        let outcome = tracker.observe(&[created(1, "s1")], UpdateTag::Collaboration);
        assert!(outcome.to_create.is_empty());

        let outcome = tracker.observe(&[created(7, "remote")], UpdateTag::Local);
        assert!(outcome.to_create.is_empty());
    }

    #[test]
    fn test_last_key_gone_reports_vanished_and_remembers_redo() {
        let mut tracker = MutationTracker::new();
        tracker.observe(&[created(1, "a"), created(2, "a")], UpdateTag::Local);
        let outcome = tracker.observe(&[destroyed(1)], UpdateTag::Redo);
        assert!(outcome.vanished.is_empty());
        let outcome = tracker.observe(&[destroyed(2)], UpdateTag::Redo);
        assert_eq!(outcome.vanished, vec![SuggestionId::from("a")]);
        assert!(tracker.take_redo_vanished(&SuggestionId::from("a")));
        assert!(!tracker.take_redo_vanished(&SuggestionId::from("a")));
    }
}
