//! The suggestion engine: drives a [`Session`] and keeps the thread store in
//! step with the suggestion ranges in the tree.
//!
//! All tree work happens synchronously under the session lock. Store calls
//! are awaited with no lock held, so a pass may observe the store and the
//! tree at slightly different moments; `pending_resolution` and the
//! resolution counter keep a pass from acting on a resolution it raced with.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, instrument, warn};

use crate::command::Command;
use crate::config::EngineConfig;
use crate::doc::Document;
use crate::error::{EngineError, Result, SharedReporter, TracingReporter};
use crate::resolve::Resolution;
use crate::session::{EditorMode, Session};
use crate::store::{ThreadInfo, ThreadStatus, ThreadStore};
use crate::suggestion::SuggestionId;
use crate::summary::{summary_json, summary_type, SummaryFragment};
use crate::tracker::{TrackerOutcome, UpdateTag};

/// Shown when composition input forces the editor out of suggest mode.
pub const COMPOSITION_NOTICE: &str =
    "Composition input cannot be tracked as a suggestion. The editor switched to preview mode.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeChange {
    pub mode: EditorMode,
    /// Message the host must show before the user continues.
    pub notice: Option<String>,
}

type ModeCallback = Arc<dyn Fn(&ModeChange) + Send + Sync>;

/// Single-slot queue: at most one pass runs, at most one more is owed.
#[derive(Debug, Default)]
struct ReconcileQueue {
    running: bool,
    rerun_requested: bool,
}

impl ReconcileQueue {
    fn try_start(&mut self) -> bool {
        if self.running {
            self.rerun_requested = true;
            return false;
        }
        self.running = true;
        true
    }

    /// Returns true when another pass is owed; otherwise stops the queue.
    fn finish_pass(&mut self) -> bool {
        if self.rerun_requested {
            self.rerun_requested = false;
            return true;
        }
        self.running = false;
        false
    }
}

#[derive(Debug, Default)]
struct EngineContext {
    /// Ids whose accept/reject has not settled in the store yet.
    pending_resolution: HashSet<SuggestionId>,
    /// Ids with a thread creation request in flight.
    creating: HashSet<SuggestionId>,
    /// Resolutions whose thread did not exist yet; applied when creation
    /// finishes.
    resolved_before_thread: HashMap<SuggestionId, ThreadStatus>,
    queue: ReconcileQueue,
    /// Bumped after every tree-side resolution.
    resolutions: u64,
}

/// Resets the queue if a pass is abandoned midway.
struct RunningGuard<'a> {
    context: &'a Mutex<EngineContext>,
    armed: bool,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut context = self.context.lock();
            context.queue.running = false;
            context.queue.rerun_requested = false;
        }
    }
}

/// Removes an id from one of the context sets on every exit path.
struct SetEntry<'a> {
    context: &'a Mutex<EngineContext>,
    set: fn(&mut EngineContext) -> &mut HashSet<SuggestionId>,
    id: SuggestionId,
}

impl<'a> SetEntry<'a> {
    fn insert(
        context: &'a Mutex<EngineContext>,
        set: fn(&mut EngineContext) -> &mut HashSet<SuggestionId>,
        id: &SuggestionId,
    ) -> Option<Self> {
        set(&mut context.lock()).insert(id.clone()).then(|| Self { context, set, id: id.clone() })
    }
}

impl Drop for SetEntry<'_> {
    fn drop(&mut self) {
        (self.set)(&mut self.context.lock()).remove(&self.id);
    }
}

fn pending(context: &mut EngineContext) -> &mut HashSet<SuggestionId> {
    &mut context.pending_resolution
}

fn creating(context: &mut EngineContext) -> &mut HashSet<SuggestionId> {
    &mut context.creating
}

pub struct SuggestionEngine<S: ThreadStore> {
    store: Arc<S>,
    session: Mutex<Session>,
    context: Mutex<EngineContext>,
    reporter: SharedReporter,
    mode_listener: Mutex<Option<ModeCallback>>,
}

impl<S: ThreadStore> fmt::Debug for SuggestionEngine<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuggestionEngine").field("session", &self.session).field("context", &self.context).finish()
    }
}

impl<S: ThreadStore> SuggestionEngine<S> {
    pub fn new(store: Arc<S>, doc: Document, config: EngineConfig) -> Self {
        Self {
            store,
            session: Mutex::new(Session::new(doc, config)),
            context: Mutex::new(EngineContext::default()),
            reporter: Arc::new(TracingReporter),
            mode_listener: Mutex::new(None),
        }
    }

    pub fn with_reporter(mut self, reporter: SharedReporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn on_mode_change(&self, callback: impl Fn(&ModeChange) + Send + Sync + 'static) {
        *self.mode_listener.lock() = Some(Arc::new(callback));
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Read access to the session, e.g. to locate nodes for a command.
    pub fn read<T>(&self, f: impl FnOnce(&Session) -> T) -> T {
        f(&self.session.lock())
    }

    pub fn document_json(&self) -> String {
        self.session.lock().document().to_json()
    }

    pub fn suggestion_ids(&self) -> BTreeSet<SuggestionId> {
        self.session.lock().document().suggestion_ids()
    }

    pub fn summary(&self, id: &SuggestionId) -> Vec<SummaryFragment> {
        self.session.lock().summary(id)
    }

    pub fn mode(&self) -> EditorMode {
        self.session.lock().mode()
    }

    pub fn is_editable(&self) -> bool {
        self.session.lock().is_editable()
    }

    // =========================================================================
    // Updates
    // =========================================================================

    /// Record `command` as a suggestion. `Ok(false)` when nothing was
    /// suggested (wrong mode, read-only, or no precondition met).
    #[instrument(skip(self))]
    pub async fn dispatch(&self, command: &Command) -> Result<bool> {
        let (handled, outcome) = self.session.lock().dispatch(command)?;
        if handled || outcome != TrackerOutcome::default() {
            self.after_update(outcome).await;
        }
        Ok(handled)
    }

    /// Apply a direct local edit.
    #[instrument(skip_all)]
    pub async fn update<T: Send>(&self, f: impl FnOnce(&mut Document) -> Result<T> + Send) -> Result<T> {
        let (value, outcome) = self.session.lock().update(UpdateTag::Local, f)?;
        self.after_update(outcome).await;
        Ok(value)
    }

    /// Apply an edit received from a collaborator.
    #[instrument(skip_all)]
    pub async fn apply_remote<T: Send>(&self, f: impl FnOnce(&mut Document) -> Result<T> + Send) -> Result<T> {
        let (value, outcome) = self.session.lock().update(UpdateTag::Collaboration, f)?;
        self.after_update(outcome).await;
        Ok(value)
    }

    #[instrument(skip(self))]
    pub async fn undo(&self) -> bool {
        let outcome = self.session.lock().undo();
        match outcome {
            Some(outcome) => {
                self.after_update(outcome).await;
                true
            }
            None => false,
        }
    }

    #[instrument(skip(self))]
    pub async fn redo(&self) -> bool {
        let outcome = self.session.lock().redo();
        match outcome {
            Some(outcome) => {
                self.after_update(outcome).await;
                true
            }
            None => false,
        }
    }

    async fn after_update(&self, outcome: TrackerOutcome) {
        if !outcome.vanished.is_empty() {
            debug!(vanished = ?outcome.vanished, "suggestion ranges vanished");
        }
        if self.store_ready() {
            for id in &outcome.to_create {
                let fragments = self.session.lock().summary(id);
                self.create_thread(id, &fragments).await;
            }
        }
        self.reconcile().await;
    }

    fn store_ready(&self) -> bool {
        !self.store.is_collaborative() || self.store.is_synced()
    }

    async fn create_thread(&self, id: &SuggestionId, fragments: &[SummaryFragment]) {
        let Some(_in_flight) = SetEntry::insert(&self.context, creating, id) else {
            debug!(%id, "thread creation already in flight");
            return;
        };
        let result = async {
            let content = summary_json(fragments)?;
            let info = self.store.create_suggestion_thread(id.as_str(), &content, &summary_type(fragments)).await?;
            Ok::<ThreadInfo, EngineError>(info)
        }
        .await;
        match result {
            Ok(info) => {
                info!(%id, thread = %info.id, "suggestion thread created");
                self.session.lock().tracker_mut().thread_created(id);
                let deferred = self.context.lock().resolved_before_thread.get(id).copied();
                if let Some(status) = deferred {
                    match self.store.set_thread_status(&info.id, status).await {
                        Ok(_) => info!(%id, %status, "suggestion resolved"),
                        Err(e) => self.reporter.report("set_thread_status", &e.into()),
                    }
                    self.context.lock().resolved_before_thread.remove(id);
                }
            }
            Err(e) => {
                self.context.lock().resolved_before_thread.remove(id);
                self.reporter.report("create_suggestion_thread", &e);
            }
        }
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    /// Bring the store in line with the tree. A call made while a pass is
    /// running is folded into one more pass.
    #[instrument(skip(self))]
    pub async fn reconcile(&self) {
        if !self.context.lock().queue.try_start() {
            debug!("reconcile already running; rerun requested");
            return;
        }
        let mut guard = RunningGuard { context: &self.context, armed: true };
        loop {
            self.reconcile_once().await;
            if !self.context.lock().queue.finish_pass() {
                break;
            }
        }
        guard.armed = false;
    }

    async fn reconcile_once(&self) {
        if !self.store_ready() {
            debug!("collaborative store not synced; skipping reconcile");
            return;
        }
        let (open, epoch) = {
            let session = self.session.lock();
            let open: Vec<(SuggestionId, Vec<SummaryFragment>)> = session
                .document()
                .suggestion_ids()
                .into_iter()
                .map(|id| {
                    let fragments = session.summary(&id);
                    (id, fragments)
                })
                .collect();
            let epoch = self.context.lock().resolutions;
            (open, epoch)
        };

        let threads = match self.store.get_all_threads().await {
            Ok(threads) => threads,
            Err(e) => {
                self.reporter.report("get_all_threads", &e.into());
                return;
            }
        };
        let by_mark: HashMap<&str, &ThreadInfo> =
            threads.iter().filter_map(|t| t.mark_id.as_deref().map(|m| (m, t))).collect();

        for (id, fragments) in &open {
            let Some(thread) = by_mark.get(id.as_str()) else {
                self.create_thread(id, fragments).await;
                continue;
            };
            if thread.status != Some(ThreadStatus::Open) {
                if self.resolution_moved(id, epoch) {
                    continue;
                }
                info!(%id, thread = %thread.id, "reopening thread for restored suggestion");
                if let Err(e) = self.store.reopen_suggestion(&thread.id).await {
                    self.reporter.report("reopen_suggestion", &e.into());
                }
            }
            let updated = async {
                let content = summary_json(fragments)?;
                Ok::<bool, EngineError>(self.store.update_suggestion_summary(id.as_str(), &content).await?)
            }
            .await;
            if let Err(e) = updated {
                self.reporter.report("update_suggestion_summary", &e);
            }
        }

        let open_ids: HashSet<&str> = open.iter().map(|(id, _)| id.as_str()).collect();
        for thread in &threads {
            let Some(mark) = thread.mark_id.as_deref() else { continue };
            if open_ids.contains(mark) || !matches!(thread.status, None | Some(ThreadStatus::Open)) {
                continue;
            }
            let id = SuggestionId::from(mark);
            if self.resolution_moved(&id, epoch) || self.appeared_since_snapshot(&id) {
                continue;
            }
            let redo_vanished = self.session.lock().tracker_mut().take_redo_vanished(&id);
            let (context, result) = match thread.status_before_reopen {
                Some(previous) if redo_vanished => {
                    info!(%id, status = %previous, "restoring status after redo");
                    ("set_thread_status", self.store.set_thread_status(&thread.id, previous).await)
                }
                _ if thread.has_child_comments => {
                    info!(%id, thread = %thread.id, "archiving thread of deleted suggestion");
                    ("set_thread_status", self.store.set_thread_status(&thread.id, ThreadStatus::Archived).await)
                }
                _ => {
                    info!(%id, thread = %thread.id, "deleting thread of deleted suggestion");
                    ("delete_suggestion_thread", self.store.delete_suggestion_thread(&thread.id).await)
                }
            };
            if let Err(e) = result {
                self.reporter.report(context, &e.into());
            }
        }
    }

    /// True when `id` is being resolved, or a resolution finished after the
    /// pass took its snapshot of the tree.
    fn resolution_moved(&self, id: &SuggestionId, epoch: u64) -> bool {
        let mut context = self.context.lock();
        if context.pending_resolution.contains(id) || context.resolved_before_thread.contains_key(id) {
            debug!(%id, "resolution pending; leaving thread alone");
            return true;
        }
        if context.resolutions != epoch {
            context.queue.rerun_requested = true;
            return true;
        }
        false
    }

    /// True when `id` gained ranges or a creation request after the pass
    /// took its snapshot of the tree.
    fn appeared_since_snapshot(&self, id: &SuggestionId) -> bool {
        let session = self.session.lock();
        let context = self.context.lock();
        let appeared = session.tracker().marks().contains(id) || context.creating.contains(id);
        if appeared {
            debug!(%id, "suggestion appeared during the pass; leaving thread alone");
        }
        appeared
    }

    // =========================================================================
    // Accept / reject
    // =========================================================================

    #[instrument(skip(self))]
    pub async fn accept_suggestion(&self, id: &SuggestionId) -> Result<bool> {
        self.resolve(id, Resolution::Accept).await
    }

    #[instrument(skip(self))]
    pub async fn reject_suggestion(&self, id: &SuggestionId) -> Result<bool> {
        self.resolve(id, Resolution::Reject).await
    }

    async fn resolve(&self, id: &SuggestionId, resolution: Resolution) -> Result<bool> {
        if !self.session.lock().is_editable() {
            debug!(%id, "editor is read-only; not resolving");
            return Ok(false);
        }
        let Some(pending_entry) = SetEntry::insert(&self.context, pending, id) else {
            debug!(%id, "resolution already in progress");
            return Ok(false);
        };
        let (changed, outcome) = self.session.lock().resolve(id, resolution)?;
        self.context.lock().resolutions += 1;
        if changed {
            self.settle_thread(id, resolution.thread_status()).await;
        }
        drop(pending_entry);
        self.after_update(outcome).await;
        Ok(changed)
    }

    /// Record `status` on the thread of `id`. When the thread is still being
    /// created the status is left for [`Self::create_thread`] to apply.
    async fn settle_thread(&self, id: &SuggestionId, status: ThreadStatus) {
        self.context.lock().resolved_before_thread.insert(id.clone(), status);
        let result = async {
            let threads = self.store.get_all_threads().await?;
            let Some(thread) = threads.iter().find(|t| t.mark_id.as_deref() == Some(id.as_str())) else {
                return Ok(false);
            };
            self.store.set_thread_status(&thread.id, status).await?;
            Ok::<bool, EngineError>(true)
        }
        .await;

        let deferred = {
            let session = self.session.lock();
            let mut context = self.context.lock();
            let awaiting = context.creating.contains(id) || session.tracker().is_awaiting_thread(id);
            let deferred = matches!(result, Ok(false)) && awaiting;
            if !deferred {
                context.resolved_before_thread.remove(id);
            }
            deferred
        };
        match result {
            Ok(true) => info!(%id, %status, "suggestion resolved"),
            Ok(false) if deferred => debug!(%id, %status, "thread still being created; status deferred"),
            Ok(false) => warn!(%id, "no thread for resolved suggestion"),
            Err(e) => self.reporter.report("set_thread_status", &e),
        }
    }

    // =========================================================================
    // Modes
    // =========================================================================

    pub fn set_mode(&self, mode: EditorMode) {
        self.session.lock().set_mode(mode);
        info!(%mode, "editor mode changed");
        self.emit(ModeChange { mode, notice: None });
    }

    /// Flip between edit and suggest, within what the access level allows.
    pub fn toggle_suggestion_mode(&self) -> EditorMode {
        let next = self.session.lock().toggle_mode();
        info!(mode = %next, "editor mode changed");
        self.emit(ModeChange { mode: next, notice: None });
        next
    }

    /// Composition input (IME) starting. Suggest mode cannot track it, so
    /// the editor goes read-only in preview mode and the host is told why.
    pub fn composition_start(&self) -> bool {
        if !self.session.lock().start_composition() {
            return false;
        }
        warn!("composition started in suggest mode; switching to preview");
        self.emit(ModeChange { mode: EditorMode::Preview, notice: Some(COMPOSITION_NOTICE.to_string()) });
        true
    }

    fn emit(&self, change: ModeChange) {
        let listener = self.mode_listener.lock().clone();
        if let Some(listener) = listener {
            listener(&change);
        }
    }
}

impl<S: ThreadStore + 'static> SuggestionEngine<S> {
    /// Reconcile on every store notification until the store goes away.
    pub async fn watch_store(self: Arc<Self>) {
        let mut events = self.store.subscribe();
        loop {
            match events.recv().await {
                Ok(event) => {
                    debug!(?event, "store changed");
                    self.reconcile().await;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "store notifications lagged");
                    self.reconcile().await;
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_folds_triggers_into_one_rerun() {
        let mut queue = ReconcileQueue::default();
        assert!(queue.try_start());
        assert!(!queue.try_start());
        assert!(!queue.try_start());
        assert!(queue.finish_pass());
        assert!(!queue.finish_pass());
        assert!(!queue.running);
        assert!(queue.try_start());
    }

    #[test]
    fn test_set_entry_releases_on_drop() {
        let context = Mutex::new(EngineContext::default());
        let id = SuggestionId::from("s1");
        {
            let entry = SetEntry::insert(&context, pending, &id);
            assert!(entry.is_some());
            assert!(SetEntry::insert(&context, pending, &id).is_none());
        }
        assert!(context.lock().pending_resolution.is_empty());
    }

    #[test]
    fn test_abandoned_pass_resets_queue() {
        let context = Mutex::new(EngineContext::default());
        assert!(context.lock().queue.try_start());
        drop(RunningGuard { context: &context, armed: true });
        assert!(context.lock().queue.try_start());
    }
}
