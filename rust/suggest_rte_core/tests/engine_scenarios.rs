use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use suggest_rte_core::{
    AccessLevel, Command, Document, EditorMode, EngineConfig, EngineError, ErrorReporter, MemoryThreadStore,
    ModeChange, NodeKey, Point, StoreError, StoreEvent, SuggestionEngine, SuggestionId, TextFormatType, TextRange,
    ThreadInfo, ThreadStatus, ThreadStore,
};
use tokio::sync::{broadcast, Notify};

fn commenter() -> EngineConfig {
    EngineConfig { access_level: AccessLevel::Comment, ..Default::default() }
}

/// One paragraph "abc"; returns the document and its text node.
fn abc() -> (Document, NodeKey) {
    let mut doc = Document::new();
    let (_, text) = doc.append_paragraph("abc");
    (doc, text)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn engine_with<S: ThreadStore>(store: Arc<S>) -> (SuggestionEngine<S>, NodeKey) {
    init_tracing();
    let (doc, text) = abc();
    (SuggestionEngine::new(store, doc, commenter()), text)
}

fn only_id<S: ThreadStore>(engine: &SuggestionEngine<S>) -> SuggestionId {
    let ids = engine.suggestion_ids();
    assert_eq!(ids.len(), 1, "expected exactly one suggestion, got {ids:?}");
    ids.into_iter().next().unwrap()
}

/// First text node inside the ranges of `id`.
fn text_in<S: ThreadStore>(engine: &SuggestionEngine<S>, id: &SuggestionId) -> NodeKey {
    engine.read(|session| {
        let doc = session.document();
        doc.text_nodes(doc.suggestion_nodes(id)[0])[0]
    })
}

fn plain_text<S: ThreadStore>(engine: &SuggestionEngine<S>) -> String {
    engine.read(|session| session.document().text_content(session.document().root()))
}

fn insert(text: NodeKey, offset: usize, chars: &str) -> Command {
    Command::InsertText { at: Point::new(text, offset), text: chars.into() }
}

fn range(text: NodeKey, start: usize, end: usize) -> TextRange {
    TextRange::new(Point::new(text, start), Point::new(text, end))
}

#[tokio::test]
async fn test_accept_insert_marks_thread_accepted() {
    let store = Arc::new(MemoryThreadStore::new());
    let (engine, text) = engine_with(store.clone());

    assert!(engine.dispatch(&insert(text, 3, "d")).await.unwrap());
    let id = only_id(&engine);
    let thread = store.thread_for(id.as_str()).unwrap();
    assert_eq!(thread.status, ThreadStatus::Open);
    assert_eq!(thread.summary_type, "insert");

    assert!(engine.accept_suggestion(&id).await.unwrap());
    assert_eq!(store.thread_for(id.as_str()).unwrap().status, ThreadStatus::Accepted);
    assert!(engine.suggestion_ids().is_empty());
    assert_eq!(plain_text(&engine), "abcd");
}

#[tokio::test]
async fn test_reject_delete_restores_text() {
    let store = Arc::new(MemoryThreadStore::new());
    let (engine, text) = engine_with(store.clone());

    assert!(engine.dispatch(&Command::DeleteText { range: range(text, 1, 2) }).await.unwrap());
    let id = only_id(&engine);
    assert_eq!(store.thread_for(id.as_str()).unwrap().summary_type, "delete");

    assert!(engine.reject_suggestion(&id).await.unwrap());
    assert_eq!(store.thread_for(id.as_str()).unwrap().status, ThreadStatus::Rejected);
    assert_eq!(plain_text(&engine), "abc");
    assert!(engine.suggestion_ids().is_empty());
}

#[tokio::test]
async fn test_apply_then_reject_reproduces_document() {
    let store = Arc::new(MemoryThreadStore::new());
    let (engine, text) = engine_with(store);
    let original = engine.document_json();

    let bold = Command::FormatText { range: range(text, 1, 2), format: TextFormatType::Bold };
    assert!(engine.dispatch(&bold).await.unwrap());
    assert_ne!(engine.document_json(), original);

    let id = only_id(&engine);
    assert!(engine.reject_suggestion(&id).await.unwrap());
    assert_eq!(engine.document_json(), original);
}

#[tokio::test]
async fn test_deleting_own_insertion_deletes_thread() {
    let store = Arc::new(MemoryThreadStore::new());
    let (engine, text) = engine_with(store.clone());

    engine.dispatch(&insert(text, 3, "xyz")).await.unwrap();
    let id = only_id(&engine);
    assert!(store.thread_for(id.as_str()).is_some());

    let inserted = text_in(&engine, &id);
    engine.dispatch(&Command::DeleteText { range: range(inserted, 0, 3) }).await.unwrap();
    assert!(engine.suggestion_ids().is_empty());
    assert!(store.threads().is_empty());
    assert_eq!(plain_text(&engine), "abc");
}

#[tokio::test]
async fn test_implicit_deletion_archives_discussed_thread() {
    let store = Arc::new(MemoryThreadStore::new());
    let (engine, text) = engine_with(store.clone());

    engine.dispatch(&insert(text, 3, "xyz")).await.unwrap();
    let id = only_id(&engine);
    let thread = store.thread_for(id.as_str()).unwrap();
    store.add_comment(&thread.id, "ana", "why this?", 1).unwrap();

    let inserted = text_in(&engine, &id);
    engine.dispatch(&Command::DeleteText { range: range(inserted, 0, 3) }).await.unwrap();
    assert_eq!(store.thread_for(id.as_str()).unwrap().status, ThreadStatus::Archived);
}

#[tokio::test]
async fn test_undo_reopens_and_redo_restores_status() {
    let store = Arc::new(MemoryThreadStore::new());
    let (engine, text) = engine_with(store.clone());

    engine.dispatch(&insert(text, 3, "d")).await.unwrap();
    let id = only_id(&engine);
    engine.accept_suggestion(&id).await.unwrap();

    assert!(engine.undo().await);
    assert!(engine.suggestion_ids().contains(&id));
    let thread = store.thread_for(id.as_str()).unwrap();
    assert_eq!(thread.status, ThreadStatus::Open);
    assert_eq!(thread.status_before_reopen, Some(ThreadStatus::Accepted));

    assert!(engine.redo().await);
    assert!(engine.suggestion_ids().is_empty());
    assert_eq!(store.thread_for(id.as_str()).unwrap().status, ThreadStatus::Accepted);
    assert_eq!(store.create_calls(), 1);
}

#[tokio::test]
async fn test_thread_creation_is_idempotent_and_summary_follows_edits() {
    let store = Arc::new(MemoryThreadStore::new());
    let (engine, text) = engine_with(store.clone());

    engine.dispatch(&insert(text, 3, "d")).await.unwrap();
    let id = only_id(&engine);
    let inserted = text_in(&engine, &id);
    engine.dispatch(&insert(inserted, 1, "e")).await.unwrap();
    engine.reconcile().await;
    engine.reconcile().await;

    assert_eq!(only_id(&engine), id);
    assert_eq!(store.create_calls(), 1);
    assert_eq!(store.threads().len(), 1);
    assert_eq!(store.thread_for(id.as_str()).unwrap().summary_content, r#"[{"type":"insert","content":"de"}]"#);
}

#[tokio::test]
async fn test_replace_summary_and_convergence() {
    let store = Arc::new(MemoryThreadStore::new());
    let (engine, text) = engine_with(store.clone());

    engine.dispatch(&Command::ReplaceText { range: range(text, 1, 2), text: "x".into() }).await.unwrap();
    let id = only_id(&engine);
    let thread = store.thread_for(id.as_str()).unwrap();
    assert_eq!(thread.summary_type, "replace");
    assert_eq!(thread.summary_content, r#"[{"type":"replace","content":"b","replaceWith":"x"}]"#);

    engine.dispatch(&Command::InsertParagraph { at: Point::new(text, 1) }).await.unwrap();
    engine.reconcile().await;
    let open: Vec<String> = store
        .threads()
        .into_iter()
        .filter(|t| t.status == ThreadStatus::Open)
        .map(|t| t.mark_id)
        .collect();
    let in_tree: Vec<String> = engine.suggestion_ids().iter().map(|id| id.to_string()).collect();
    assert_eq!(open.len(), 2);
    assert_eq!(
        open.iter().collect::<std::collections::BTreeSet<_>>(),
        in_tree.iter().collect::<std::collections::BTreeSet<_>>()
    );
}

#[tokio::test]
async fn test_unsynced_collaborative_store_defers_decisions() {
    let store = Arc::new(MemoryThreadStore::collaborative());
    let (engine, text) = engine_with(store.clone());

    engine.dispatch(&insert(text, 3, "d")).await.unwrap();
    let id = only_id(&engine);
    assert_eq!(store.create_calls(), 0);
    assert!(store.threads().is_empty());

    store.set_synced(true);
    engine.reconcile().await;
    assert_eq!(store.thread_for(id.as_str()).unwrap().status, ThreadStatus::Open);
}

#[derive(Default)]
struct RecordingReporter {
    contexts: Mutex<Vec<String>>,
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, context: &str, _error: &EngineError) {
        self.contexts.lock().push(context.to_string());
    }
}

#[tokio::test]
async fn test_store_failures_are_reported_and_editing_continues() {
    let store = Arc::new(MemoryThreadStore::new());
    let reporter = Arc::new(RecordingReporter::default());
    let (doc, text) = abc();
    let engine = SuggestionEngine::new(store.clone(), doc, commenter()).with_reporter(reporter.clone());

    store.fail_next(2);
    assert!(engine.dispatch(&insert(text, 3, "d")).await.unwrap());
    let id = only_id(&engine);
    assert!(store.threads().is_empty());
    assert_eq!(*reporter.contexts.lock(), vec!["create_suggestion_thread".to_string(), "get_all_threads".to_string()]);

    engine.reconcile().await;
    assert!(store.thread_for(id.as_str()).is_some());
}

#[tokio::test]
async fn test_composition_forces_read_only_preview() {
    let store = Arc::new(MemoryThreadStore::new());
    let (engine, text) = engine_with(store);
    let changes: Arc<Mutex<Vec<ModeChange>>> = Arc::default();
    let seen = changes.clone();
    engine.on_mode_change(move |change| seen.lock().push(change.clone()));

    engine.dispatch(&insert(text, 3, "d")).await.unwrap();
    let id = only_id(&engine);

    assert!(engine.composition_start());
    assert_eq!(engine.mode(), EditorMode::Preview);
    assert!(!engine.is_editable());
    let recorded = changes.lock().clone();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].mode, EditorMode::Preview);
    assert!(recorded[0].notice.is_some());

    assert!(!engine.dispatch(&insert(text, 0, "z")).await.unwrap());
    assert!(!engine.accept_suggestion(&id).await.unwrap());
    assert!(!engine.composition_start());

    assert_eq!(engine.toggle_suggestion_mode(), EditorMode::Suggest);
    assert!(engine.is_editable());
}

#[tokio::test]
async fn test_direct_edits_in_edit_mode_leave_no_suggestions() {
    let store = Arc::new(MemoryThreadStore::new());
    let (doc, text) = abc();
    let engine = SuggestionEngine::new(store.clone(), doc, EngineConfig::default());
    assert_eq!(engine.mode(), EditorMode::Edit);

    assert!(!engine.dispatch(&insert(text, 3, "d")).await.unwrap());
    engine.update(|doc| doc.insert_text(Point::new(text, 3), "d").map(|_| ())).await.unwrap();
    assert_eq!(plain_text(&engine), "abcd");
    assert!(engine.suggestion_ids().is_empty());
    assert!(store.threads().is_empty());

    assert!(engine.undo().await);
    assert_eq!(plain_text(&engine), "abc");
}

/// Which store call the test holds back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    Listing,
    Create,
    Status,
}

/// Store whose gated call waits for the test to release it.
struct GatedStore {
    inner: MemoryThreadStore,
    gate: Mutex<Option<Gate>>,
    entered: Notify,
    release: Notify,
}

impl GatedStore {
    fn new() -> Self {
        Self { inner: MemoryThreadStore::new(), gate: Mutex::new(None), entered: Notify::new(), release: Notify::new() }
    }

    fn close_gate(&self, gate: Gate) {
        *self.gate.lock() = Some(gate);
    }

    fn open_gate(&self) {
        *self.gate.lock() = None;
        self.release.notify_one();
    }

    async fn pass(&self, gate: Gate) {
        let closed = *self.gate.lock() == Some(gate);
        if closed {
            self.entered.notify_one();
            self.release.notified().await;
        }
    }
}

#[async_trait]
impl ThreadStore for GatedStore {
    async fn get_all_threads(&self) -> Result<Vec<ThreadInfo>, StoreError> {
        self.pass(Gate::Listing).await;
        self.inner.get_all_threads().await
    }

    async fn create_suggestion_thread(
        &self,
        suggestion_id: &str,
        summary_content: &str,
        summary_type: &str,
    ) -> Result<ThreadInfo, StoreError> {
        self.pass(Gate::Create).await;
        self.inner.create_suggestion_thread(suggestion_id, summary_content, summary_type).await
    }

    async fn reopen_suggestion(&self, thread_id: &str) -> Result<bool, StoreError> {
        self.inner.reopen_suggestion(thread_id).await
    }

    async fn set_thread_status(&self, thread_id: &str, status: ThreadStatus) -> Result<bool, StoreError> {
        self.pass(Gate::Status).await;
        self.inner.set_thread_status(thread_id, status).await
    }

    async fn delete_suggestion_thread(&self, thread_id: &str) -> Result<bool, StoreError> {
        self.inner.delete_suggestion_thread(thread_id).await
    }

    async fn update_suggestion_summary(&self, suggestion_id: &str, summary_content: &str) -> Result<bool, StoreError> {
        self.inner.update_suggestion_summary(suggestion_id, summary_content).await
    }

    fn is_collaborative(&self) -> bool {
        false
    }

    fn is_synced(&self) -> bool {
        true
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.subscribe()
    }
}

#[tokio::test]
async fn test_reconcile_leaves_pending_resolution_alone() {
    let store = Arc::new(GatedStore::new());
    let (engine, text) = engine_with(store.clone());

    engine.dispatch(&insert(text, 3, "d")).await.unwrap();
    let id = only_id(&engine);

    store.close_gate(Gate::Status);
    let accept = engine.accept_suggestion(&id);
    let racer = async {
        store.entered.notified().await;
        // Ranges are gone and the thread is still open: without the pending
        // guard this pass would delete the thread.
        engine.reconcile().await;
        assert!(store.inner.thread_for(id.as_str()).is_some());
        store.open_gate();
    };
    let (accepted, ()) = tokio::join!(accept, racer);

    assert!(accepted.unwrap());
    assert_eq!(store.inner.thread_for(id.as_str()).unwrap().status, ThreadStatus::Accepted);
}

#[tokio::test]
async fn test_accept_during_thread_creation_keeps_the_resolution() {
    let store = Arc::new(GatedStore::new());
    let (engine, text) = engine_with(store.clone());

    store.close_gate(Gate::Create);
    let tr = insert(text, 3, "d");
    let edit = engine.dispatch(&tr);
    let resolve = async {
        store.entered.notified().await;
        let id = only_id(&engine);
        assert!(engine.accept_suggestion(&id).await.unwrap());
        assert!(store.inner.thread_for(id.as_str()).is_none());
        store.open_gate();
        id
    };
    let (dispatched, id) = tokio::join!(edit, resolve);
    assert!(dispatched.unwrap());

    engine.reconcile().await;
    assert!(engine.suggestion_ids().is_empty());
    assert_eq!(plain_text(&engine), "abcd");
    assert_eq!(store.inner.thread_for(id.as_str()).unwrap().status, ThreadStatus::Accepted);
}

#[tokio::test]
async fn test_thread_created_during_a_pass_survives_it() {
    let store = Arc::new(GatedStore::new());
    let (engine, text) = engine_with(store.clone());

    store.close_gate(Gate::Listing);
    let pass = engine.reconcile();
    let edit = async {
        store.entered.notified().await;
        assert!(engine.dispatch(&insert(text, 3, "d")).await.unwrap());
        let id = only_id(&engine);
        let created = store.inner.thread_for(id.as_str()).unwrap();
        store.open_gate();
        (id, created)
    };
    let ((), (id, created)) = tokio::join!(pass, edit);

    let thread = store.inner.thread_for(id.as_str()).unwrap();
    assert_eq!(thread.id, created.id);
    assert_eq!(thread.status, ThreadStatus::Open);
    assert_eq!(store.inner.threads().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_watcher_reopens_thread_closed_elsewhere() {
    let store = Arc::new(MemoryThreadStore::new());
    let (engine, text) = engine_with(store.clone());
    engine.dispatch(&insert(text, 3, "d")).await.unwrap();
    let id = only_id(&engine);

    let engine = Arc::new(engine);
    let watcher = tokio::spawn(engine.clone().watch_store());
    tokio::time::sleep(Duration::from_millis(20)).await;

    let thread = store.thread_for(id.as_str()).unwrap();
    store.set_thread_status(&thread.id, ThreadStatus::Rejected).await.unwrap();

    let reopened = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if store.thread_for(id.as_str()).is_some_and(|t| t.status == ThreadStatus::Open) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(reopened.is_ok());
    watcher.abort();
}
