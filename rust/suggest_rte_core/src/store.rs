//! Thread store interface and an in-process implementation.
//!
//! Suggestions are discussed on threads held outside the document. The
//! engine only talks to the store through [`ThreadStore`]; threads reference
//! a suggestion by its id (`mark_id`).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ThreadStatus {
    Open,
    Accepted,
    Rejected,
    Archived,
}

impl ThreadStatus {
    pub fn is_resolved(self) -> bool {
        matches!(self, ThreadStatus::Accepted | ThreadStatus::Rejected)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadInfo {
    pub id: String,
    pub mark_id: Option<String>,
    /// `None` when the store has not decided a status yet.
    pub status: Option<ThreadStatus>,
    pub has_child_comments: bool,
    /// Terminal status the thread had before its last reopen.
    pub status_before_reopen: Option<ThreadStatus>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("thread not found: {0}")]
    ThreadNotFound(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("request rejected: {0}")]
    Rejected(String),
}

/// Change notifications pushed by a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEvent {
    ThreadsChanged,
    SyncStatusChanged,
}

#[async_trait]
pub trait ThreadStore: Send + Sync {
    async fn get_all_threads(&self) -> Result<Vec<ThreadInfo>, StoreError>;

    /// Create the thread for `suggestion_id`. Creating twice for one id
    /// returns the existing thread.
    async fn create_suggestion_thread(
        &self,
        suggestion_id: &str,
        summary_content: &str,
        summary_type: &str,
    ) -> Result<ThreadInfo, StoreError>;

    async fn reopen_suggestion(&self, thread_id: &str) -> Result<bool, StoreError>;

    async fn set_thread_status(&self, thread_id: &str, status: ThreadStatus) -> Result<bool, StoreError>;

    async fn delete_suggestion_thread(&self, thread_id: &str) -> Result<bool, StoreError>;

    async fn update_suggestion_summary(&self, suggestion_id: &str, summary_content: &str) -> Result<bool, StoreError>;

    fn is_collaborative(&self) -> bool;

    fn is_synced(&self) -> bool;

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentMessage {
    pub author: String,
    pub text: String,
    pub ts_ms: i64,
}

/// A thread as the in-memory store keeps it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredThread {
    pub id: String,
    pub mark_id: String,
    pub status: ThreadStatus,
    pub status_before_reopen: Option<ThreadStatus>,
    pub summary_content: String,
    pub summary_type: String,
    pub messages: Vec<CommentMessage>,
}

impl StoredThread {
    fn info(&self) -> ThreadInfo {
        ThreadInfo {
            id: self.id.clone(),
            mark_id: Some(self.mark_id.clone()),
            status: Some(self.status),
            has_child_comments: !self.messages.is_empty(),
            status_before_reopen: self.status_before_reopen,
        }
    }
}

/// Thread store held in memory. Used by tests and by hosts without a backend.
pub struct MemoryThreadStore {
    threads: Mutex<BTreeMap<String, StoredThread>>,
    next_id: AtomicU32,
    collaborative: bool,
    synced: AtomicBool,
    fail_remaining: AtomicUsize,
    create_calls: AtomicUsize,
    events: broadcast::Sender<StoreEvent>,
}

impl Default for MemoryThreadStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryThreadStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            threads: Mutex::new(BTreeMap::new()),
            next_id: AtomicU32::new(1),
            collaborative: false,
            synced: AtomicBool::new(true),
            fail_remaining: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
            events,
        }
    }

    /// A store shared with collaborators; starts unsynced.
    pub fn collaborative() -> Self {
        Self { collaborative: true, synced: AtomicBool::new(false), ..Self::new() }
    }

    pub fn set_synced(&self, synced: bool) {
        self.synced.store(synced, Ordering::SeqCst);
        self.notify(StoreEvent::SyncStatusChanged);
    }

    /// Make the next `count` calls fail with [`StoreError::Unavailable`].
    pub fn fail_next(&self, count: usize) {
        self.fail_remaining.store(count, Ordering::SeqCst);
    }

    /// How many times thread creation was requested.
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn thread_for(&self, mark_id: &str) -> Option<StoredThread> {
        self.threads.lock().values().find(|t| t.mark_id == mark_id).cloned()
    }

    pub fn threads(&self) -> Vec<StoredThread> {
        self.threads.lock().values().cloned().collect()
    }

    pub fn add_comment(&self, thread_id: &str, author: &str, text: &str, ts_ms: i64) -> Result<(), StoreError> {
        {
            let mut threads = self.threads.lock();
            let thread = threads.get_mut(thread_id).ok_or_else(|| StoreError::ThreadNotFound(thread_id.to_string()))?;
            thread.messages.push(CommentMessage { author: author.to_string(), text: text.to_string(), ts_ms });
        }
        self.notify(StoreEvent::ThreadsChanged);
        Ok(())
    }

    fn check_available(&self) -> Result<(), StoreError> {
        let failing = self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::Unavailable("injected failure".into()));
        }
        Ok(())
    }

    fn notify(&self, event: StoreEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn update_thread(&self, thread_id: &str, f: impl FnOnce(&mut StoredThread)) -> Result<bool, StoreError> {
        {
            let mut threads = self.threads.lock();
            let thread = threads.get_mut(thread_id).ok_or_else(|| StoreError::ThreadNotFound(thread_id.to_string()))?;
            f(thread);
        }
        self.notify(StoreEvent::ThreadsChanged);
        Ok(true)
    }
}

#[async_trait]
impl ThreadStore for MemoryThreadStore {
    async fn get_all_threads(&self) -> Result<Vec<ThreadInfo>, StoreError> {
        self.check_available()?;
        Ok(self.threads.lock().values().map(StoredThread::info).collect())
    }

    async fn create_suggestion_thread(
        &self,
        suggestion_id: &str,
        summary_content: &str,
        summary_type: &str,
    ) -> Result<ThreadInfo, StoreError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let info = {
            let mut threads = self.threads.lock();
            if let Some(existing) = threads.values().find(|t| t.mark_id == suggestion_id) {
                return Ok(existing.info());
            }
            let id = format!("thread-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
            let thread = StoredThread {
                id: id.clone(),
                mark_id: suggestion_id.to_string(),
                status: ThreadStatus::Open,
                status_before_reopen: None,
                summary_content: summary_content.to_string(),
                summary_type: summary_type.to_string(),
                messages: Vec::new(),
            };
            let info = thread.info();
            threads.insert(id, thread);
            info
        };
        self.notify(StoreEvent::ThreadsChanged);
        Ok(info)
    }

    async fn reopen_suggestion(&self, thread_id: &str) -> Result<bool, StoreError> {
        self.check_available()?;
        self.update_thread(thread_id, |t| {
            if t.status.is_resolved() {
                t.status_before_reopen = Some(t.status);
            }
            t.status = ThreadStatus::Open;
        })
    }

    async fn set_thread_status(&self, thread_id: &str, status: ThreadStatus) -> Result<bool, StoreError> {
        self.check_available()?;
        self.update_thread(thread_id, |t| {
            t.status = status;
            t.status_before_reopen = None;
        })
    }

    async fn delete_suggestion_thread(&self, thread_id: &str) -> Result<bool, StoreError> {
        self.check_available()?;
        let removed = self.threads.lock().remove(thread_id).is_some();
        if !removed {
            return Err(StoreError::ThreadNotFound(thread_id.to_string()));
        }
        self.notify(StoreEvent::ThreadsChanged);
        Ok(true)
    }

    async fn update_suggestion_summary(&self, suggestion_id: &str, summary_content: &str) -> Result<bool, StoreError> {
        self.check_available()?;
        let thread_id = self
            .thread_for(suggestion_id)
            .map(|t| t.id)
            .ok_or_else(|| StoreError::ThreadNotFound(suggestion_id.to_string()))?;
        let unchanged = self.threads.lock().get(&thread_id).is_some_and(|t| t.summary_content == summary_content);
        if unchanged {
            return Ok(false);
        }
        self.update_thread(&thread_id, |t| t.summary_content = summary_content.to_string())
    }

    fn is_collaborative(&self) -> bool {
        self.collaborative
    }

    fn is_synced(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_creation_is_idempotent_per_mark() {
        let store = MemoryThreadStore::new();
        let a = store.create_suggestion_thread("s1", "[]", "insert").await.unwrap();
        let b = store.create_suggestion_thread("s1", "[]", "insert").await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(store.get_all_threads().await.unwrap().len(), 1);
        assert_eq!(store.create_calls(), 2);
    }

    #[tokio::test]
    async fn test_reopen_remembers_terminal_status() {
        let store = MemoryThreadStore::new();
        let t = store.create_suggestion_thread("s1", "[]", "insert").await.unwrap();
        store.set_thread_status(&t.id, ThreadStatus::Accepted).await.unwrap();
        store.reopen_suggestion(&t.id).await.unwrap();
        let thread = store.thread_for("s1").unwrap();
        assert_eq!(thread.status, ThreadStatus::Open);
        assert_eq!(thread.status_before_reopen, Some(ThreadStatus::Accepted));

        store.set_thread_status(&t.id, ThreadStatus::Accepted).await.unwrap();
        assert_eq!(store.thread_for("s1").unwrap().status_before_reopen, None);
    }

    #[tokio::test]
    async fn test_failure_injection_and_events() {
        let store = MemoryThreadStore::new();
        let mut events = store.subscribe();
        store.fail_next(1);
        assert!(matches!(store.get_all_threads().await, Err(StoreError::Unavailable(_))));
        assert!(store.get_all_threads().await.is_ok());

        let t = store.create_suggestion_thread("s1", "[]", "insert").await.unwrap();
        assert_eq!(events.recv().await.unwrap(), StoreEvent::ThreadsChanged);
        store.add_comment(&t.id, "ana", "looks good", 0).unwrap();
        assert!(store.get_all_threads().await.unwrap()[0].has_child_comments);
    }
}
