//! The sync controller.
//!
//! Owns the in-memory [`Document`], picks the backend from the current
//! identity, and reconciles remote snapshots with local edits.
//!
//! # States
//!
//! 1. **Unresolved** - identity not known yet, nothing loaded
//! 2. **LocalMode** - signed out; the local cache is loaded, then Ready
//! 3. **RemoteMode** - signed in; waiting for the first remote snapshot
//! 4. **Ready** - mutations accepted
//!
//! # Conflict policy
//!
//! Last writer wins. Every remote snapshot received in RemoteMode replaces
//! the in-memory document outright. Adopting a snapshot never writes back.
//!
//! # Threading
//!
//! All state changes happen through `&mut self`. Backends report through the
//! event channel; call [`SyncController::process_pending`] or
//! [`SyncController::run_until_ready`] to handle what they sent.

mod notice;
mod request;

pub use notice::{Notice, NoticeKind};
pub use request::{PendingAction, Request, RequestId, Response};

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::backend::{
    DataStore, LocalCache, RemoteError, SessionError, SessionProvider, Subscription, WriteMode,
};
use crate::codec::{self, ImportError};
use crate::event::{
    event_channel, EventReceiver, EventSender, IdentitySink, Session, SnapshotSink,
    SubscriptionId, SyncEvent,
};
use crate::models::{Column, Document, IdGenerator, PartialDocument, RandomIds, Subject};
use crate::mutation::{Mutation, MutationError};
use crate::progress::{self, Completion};

/// Notice text for a failed import.
pub const INVALID_BACKUP_MESSAGE: &str = "Invalid backup file.";

/// Notice text for a remote permission failure.
pub const ACCESS_DENIED_MESSAGE: &str = "Cloud access denied. Check document store permissions.";

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("Not ready: identity or data still loading")]
    NotReady,

    #[error(transparent)]
    Mutation(#[from] MutationError),

    #[error("Import failed: {0}")]
    Import(#[from] ImportError),

    #[error("No pending request {0}")]
    UnknownRequest(RequestId),

    #[error("Response does not match request {0}")]
    MismatchedResponse(RequestId),
}

/// The collaborators a controller is built from.
#[derive(Clone)]
pub struct Backends {
    pub store: Arc<dyn DataStore>,
    pub cache: Arc<dyn LocalCache>,
    pub sessions: Arc<dyn SessionProvider>,
}

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// Columns of a first-use document, also used when a snapshot lacks columns.
    pub default_columns: Vec<Column>,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            default_columns: Document::builtin_columns(),
        }
    }
}

/// Which backend the controller reads from and writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Unresolved,
    Local,
    Remote(Session),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Unresolved,
    LocalMode,
    RemoteMode,
    Ready,
}

/// A backup ready to be saved by the view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backup {
    pub file_name: String,
    pub mime_type: &'static str,
    pub contents: String,
}

pub struct SyncController {
    store: Arc<dyn DataStore>,
    cache: Arc<dyn LocalCache>,
    sessions: Arc<dyn SessionProvider>,
    options: ControllerOptions,
    ids: Box<dyn IdGenerator + Send>,

    events: EventSender,
    inbox: EventReceiver,
    started: bool,

    mode: Mode,
    ready: bool,
    document: Document,
    active_subject: Option<String>,
    notice: Option<Notice>,
    requests: VecDeque<Request>,
    next_request: u64,
    subscription: Option<(SubscriptionId, Subscription)>,
    next_subscription: u64,
}

impl SyncController {
    pub fn new(backends: Backends, options: ControllerOptions) -> Self {
        let (events, inbox) = event_channel();
        let document = Document::with_columns(options.default_columns.clone());
        Self {
            store: backends.store,
            cache: backends.cache,
            sessions: backends.sessions,
            options,
            ids: Box::new(RandomIds),
            events,
            inbox,
            started: false,
            mode: Mode::Unresolved,
            ready: false,
            document,
            active_subject: None,
            notice: None,
            requests: VecDeque::new(),
            next_request: 1,
            subscription: None,
            next_subscription: 1,
        }
    }

    /// Replaces the id source for new entities.
    pub fn with_id_generator(mut self, ids: impl IdGenerator + Send + 'static) -> Self {
        self.ids = Box::new(ids);
        self
    }

    /// Attaches to the session provider. Identity arrives as an event.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        self.sessions.attach(IdentitySink::new(self.events.clone()));
    }

    /// Handles every event already queued. Returns how many were handled.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.inbox.try_recv() {
            self.handle(event);
            handled += 1;
        }
        handled
    }

    /// Waits for and handles one event.
    pub async fn process_next(&mut self) -> bool {
        match self.inbox.recv().await {
            Some(event) => {
                self.handle(event);
                true
            }
            None => false,
        }
    }

    /// Handles events until the controller is Ready.
    pub async fn run_until_ready(&mut self) {
        self.process_pending();
        while !self.ready {
            if !self.process_next().await {
                return;
            }
        }
    }

    pub fn handle(&mut self, event: SyncEvent) {
        match event {
            SyncEvent::IdentityChanged(session) => self.on_identity(session),
            SyncEvent::SessionFailed(error) => self.on_session_failed(error),
            SyncEvent::RemoteSnapshot {
                subscription,
                document,
            } => self.on_snapshot(subscription, document),
            SyncEvent::RemoteFailed {
                subscription,
                error,
            } => self.on_remote_failed(subscription, error),
        }
    }

    fn on_identity(&mut self, session: Option<Session>) {
        match session {
            None => {
                if matches!(self.mode, Mode::Remote(_)) {
                    self.teardown_subscription();
                    self.clear_subjects();
                }
                info!("signed out, using local cache");
                self.mode = Mode::Local;
                self.ready = false;
                self.load_local();
                self.ready = true;
            }
            Some(session) => {
                if self.mode == Mode::Remote(session.clone()) && self.subscription.is_some() {
                    debug!("identity unchanged for {}, keeping subscription", session.user_id);
                    return;
                }
                self.teardown_subscription();
                info!("signed in as {}, waiting for remote document", session.user_id);
                self.mode = Mode::Remote(session.clone());
                self.ready = false;
                self.subscribe(&session);
            }
        }
    }

    fn on_session_failed(&mut self, error: SessionError) {
        match error {
            SessionError::Configuration(message) => {
                debug!("session configuration error: {}", message);
                self.set_notice(NoticeKind::SessionConfiguration, message);
            }
            SessionError::Cancelled => debug!("sign-in cancelled"),
            SessionError::Transient(message) => debug!("sign-in failed transiently: {}", message),
        }
    }

    fn on_snapshot(&mut self, subscription: SubscriptionId, document: Option<PartialDocument>) {
        if !self.is_current(subscription) {
            debug!("discarding snapshot from stale subscription {}", subscription);
            return;
        }
        let Mode::Remote(session) = &self.mode else {
            return;
        };

        match document {
            Some(partial) => {
                debug!("adopting remote snapshot for {}", session.user_id);
                self.document = partial.into_document(&self.options.default_columns);
                if self.active_subject.is_none() {
                    self.active_subject = self.document.subjects.first().map(|s| s.id.clone());
                }
            }
            None => {
                info!("no remote document for {}, uploading current state", session.user_id);
                self.store
                    .write(&session.user_id, &self.document, WriteMode::Replace);
            }
        }
        self.ready = true;
    }

    fn on_remote_failed(&mut self, subscription: SubscriptionId, error: RemoteError) {
        if !self.is_current(subscription) {
            debug!("discarding failure from stale subscription {}", subscription);
            return;
        }
        debug!("remote subscription failed: {}", error);
        self.subscription = None;

        let message = match &error {
            RemoteError::AccessDenied(_) => ACCESS_DENIED_MESSAGE.to_string(),
            RemoteError::Transport(e) | RemoteError::Decode(e) => {
                format!("Cloud sync unavailable: {}", e)
            }
        };
        self.set_notice(NoticeKind::RemoteAccess, message);
        self.ready = true;
    }

    fn is_current(&self, subscription: SubscriptionId) -> bool {
        matches!(&self.subscription, Some((id, _)) if *id == subscription)
    }

    fn subscribe(&mut self, session: &Session) {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;

        // Register the id before subscribing: the store may deliver at once.
        let sink = SnapshotSink::new(id, self.events.clone());
        let handle = self.store.subscribe(&session.user_id, sink);
        self.subscription = Some((id, handle));
    }

    fn teardown_subscription(&mut self) {
        if let Some((id, handle)) = self.subscription.take() {
            debug!("tearing down subscription {}", id);
            drop(handle);
        }
    }

    fn clear_subjects(&mut self) {
        self.document.subjects.clear();
        self.active_subject = None;
    }

    fn load_local(&mut self) {
        let text = match self.cache.read() {
            Ok(Some(text)) => text,
            Ok(None) => {
                debug!("local cache empty");
                return;
            }
            Err(e) => {
                debug!("local cache read failed: {}", e);
                return;
            }
        };

        match serde_json::from_str::<PartialDocument>(&text) {
            Ok(partial) => {
                self.document = partial.into_document(&self.options.default_columns);
                if let Some(first) = self.document.subjects.first() {
                    self.active_subject = Some(first.id.clone());
                }
            }
            Err(e) => debug!("local cache holds an unreadable document: {}", e),
        }
    }

    fn persist(&self) {
        match &self.mode {
            Mode::Local => match serde_json::to_string(&self.document) {
                Ok(text) => {
                    if let Err(e) = self.cache.write(&text) {
                        warn!("local cache write failed: {}", e);
                    }
                }
                Err(e) => warn!("failed to serialize document: {}", e),
            },
            Mode::Remote(session) => {
                self.store
                    .write(&session.user_id, &self.document, WriteMode::Merge);
            }
            Mode::Unresolved => debug!("no backend selected, change kept in memory only"),
        }
    }

    fn set_notice(&mut self, kind: NoticeKind, message: impl Into<String>) {
        self.notice = Some(Notice::new(kind, message));
    }

    /// Applies `mutation`, adopts the result and persists it.
    ///
    /// Returns the id of a newly created entity, if any.
    pub fn apply(&mut self, mutation: Mutation) -> Result<Option<String>, ControllerError> {
        if !self.ready {
            return Err(ControllerError::NotReady);
        }

        let applied = mutation.apply(&self.document, self.ids.as_mut())?;
        self.document = applied.document;

        match &mutation {
            Mutation::AddSubject { .. } => self.active_subject = applied.created_id.clone(),
            Mutation::DeleteSubject { subject_id }
                if self.active_subject.as_ref() == Some(subject_id) =>
            {
                self.active_subject = None
            }
            Mutation::ReplaceDocument(_) => {
                if let Some(first) = self.document.subjects.first() {
                    self.active_subject = Some(first.id.clone());
                }
            }
            _ => {}
        }

        self.persist();
        Ok(applied.created_id)
    }

    pub fn add_subject(&mut self, name: &str) -> Result<String, ControllerError> {
        self.apply(Mutation::AddSubject {
            name: name.to_string(),
        })
        .map(Option::unwrap_or_default)
    }

    pub fn rename_subject(&mut self, subject_id: &str, name: &str) -> Result<(), ControllerError> {
        self.apply(Mutation::RenameSubject {
            subject_id: subject_id.to_string(),
            name: name.to_string(),
        })
        .map(|_| ())
    }

    pub fn delete_subject(&mut self, subject_id: &str) -> Result<(), ControllerError> {
        self.apply(Mutation::DeleteSubject {
            subject_id: subject_id.to_string(),
        })
        .map(|_| ())
    }

    pub fn add_chapter(&mut self, subject_id: &str, name: &str) -> Result<String, ControllerError> {
        self.apply(Mutation::AddChapter {
            subject_id: subject_id.to_string(),
            name: name.to_string(),
        })
        .map(Option::unwrap_or_default)
    }

    pub fn rename_chapter(
        &mut self,
        subject_id: &str,
        chapter_id: &str,
        name: &str,
    ) -> Result<(), ControllerError> {
        self.apply(Mutation::RenameChapter {
            subject_id: subject_id.to_string(),
            chapter_id: chapter_id.to_string(),
            name: name.to_string(),
        })
        .map(|_| ())
    }

    pub fn delete_chapter(&mut self, subject_id: &str, chapter_id: &str) -> Result<(), ControllerError> {
        self.apply(Mutation::DeleteChapter {
            subject_id: subject_id.to_string(),
            chapter_id: chapter_id.to_string(),
        })
        .map(|_| ())
    }

    pub fn toggle_progress(
        &mut self,
        subject_id: &str,
        chapter_id: &str,
        column_id: &str,
    ) -> Result<(), ControllerError> {
        self.apply(Mutation::ToggleProgress {
            subject_id: subject_id.to_string(),
            chapter_id: chapter_id.to_string(),
            column_id: column_id.to_string(),
        })
        .map(|_| ())
    }

    pub fn add_column(&mut self, name: &str) -> Result<String, ControllerError> {
        self.apply(Mutation::AddColumn {
            name: name.to_string(),
        })
        .map(Option::unwrap_or_default)
    }

    pub fn delete_column(&mut self, column_id: &str) -> Result<(), ControllerError> {
        self.apply(Mutation::DeleteColumn {
            column_id: column_id.to_string(),
        })
        .map(|_| ())
    }

    fn enqueue(&mut self, build: impl FnOnce(RequestId) -> Request) -> RequestId {
        let id = RequestId(self.next_request);
        self.next_request += 1;
        self.requests.push_back(build(id));
        id
    }

    fn prompt(&mut self, title: &str, default_value: &str, action: PendingAction) -> RequestId {
        self.enqueue(|id| Request::Prompt {
            id,
            title: title.to_string(),
            default_value: default_value.to_string(),
            action,
        })
    }

    fn confirm(&mut self, title: &str, action: PendingAction) -> RequestId {
        self.enqueue(|id| Request::Confirm {
            id,
            title: title.to_string(),
            message: "Are you sure?".to_string(),
            action,
        })
    }

    fn subject_name(&self, subject_id: &str) -> Result<String, ControllerError> {
        self.document
            .subject(subject_id)
            .map(|s| s.name.clone())
            .ok_or_else(|| MutationError::SubjectNotFound(subject_id.to_string()).into())
    }

    pub fn request_add_subject(&mut self) -> RequestId {
        self.prompt("Enter subject name:", "", PendingAction::AddSubject)
    }

    pub fn request_rename_subject(&mut self, subject_id: &str) -> Result<RequestId, ControllerError> {
        let current = self.subject_name(subject_id)?;
        Ok(self.prompt(
            "Rename subject:",
            &current,
            PendingAction::RenameSubject {
                subject_id: subject_id.to_string(),
            },
        ))
    }

    pub fn request_delete_subject(&mut self, subject_id: &str) -> Result<RequestId, ControllerError> {
        self.subject_name(subject_id)?;
        Ok(self.confirm(
            "Delete Subject",
            PendingAction::DeleteSubject {
                subject_id: subject_id.to_string(),
            },
        ))
    }

    pub fn request_add_chapter(&mut self, subject_id: &str) -> Result<RequestId, ControllerError> {
        self.subject_name(subject_id)?;
        Ok(self.prompt(
            "Enter chapter name:",
            "",
            PendingAction::AddChapter {
                subject_id: subject_id.to_string(),
            },
        ))
    }

    pub fn request_rename_chapter(
        &mut self,
        subject_id: &str,
        chapter_id: &str,
    ) -> Result<RequestId, ControllerError> {
        let current = self
            .document
            .subject(subject_id)
            .ok_or_else(|| MutationError::SubjectNotFound(subject_id.to_string()))?
            .chapter(chapter_id)
            .map(|c| c.name.clone())
            .ok_or_else(|| MutationError::ChapterNotFound(chapter_id.to_string()))?;
        Ok(self.prompt(
            "Rename chapter:",
            &current,
            PendingAction::RenameChapter {
                subject_id: subject_id.to_string(),
                chapter_id: chapter_id.to_string(),
            },
        ))
    }

    pub fn request_delete_chapter(
        &mut self,
        subject_id: &str,
        chapter_id: &str,
    ) -> Result<RequestId, ControllerError> {
        let subject = self
            .document
            .subject(subject_id)
            .ok_or_else(|| MutationError::SubjectNotFound(subject_id.to_string()))?;
        if subject.chapter(chapter_id).is_none() {
            return Err(MutationError::ChapterNotFound(chapter_id.to_string()).into());
        }
        Ok(self.confirm(
            "Delete Chapter",
            PendingAction::DeleteChapter {
                subject_id: subject_id.to_string(),
                chapter_id: chapter_id.to_string(),
            },
        ))
    }

    pub fn request_add_column(&mut self) -> RequestId {
        self.prompt("New column name:", "", PendingAction::AddColumn)
    }

    pub fn request_delete_column(&mut self, column_id: &str) -> Result<RequestId, ControllerError> {
        if self.document.column(column_id).is_none() {
            return Err(MutationError::ColumnNotFound(column_id.to_string()).into());
        }
        Ok(self.confirm(
            "Delete Column",
            PendingAction::DeleteColumn {
                column_id: column_id.to_string(),
            },
        ))
    }

    /// Oldest unresolved request.
    pub fn next_request(&self) -> Option<&Request> {
        self.requests.front()
    }

    pub fn pending_requests(&self) -> impl Iterator<Item = &Request> {
        self.requests.iter()
    }

    /// Resolves a queued request.
    ///
    /// Empty prompt text and cancellations drop the request without changes.
    pub fn resolve(
        &mut self,
        id: RequestId,
        response: Response,
    ) -> Result<Option<String>, ControllerError> {
        let position = self
            .requests
            .iter()
            .position(|r| r.id() == id)
            .ok_or(ControllerError::UnknownRequest(id))?;

        let mismatched = matches!(
            (&self.requests[position], &response),
            (Request::Prompt { .. }, Response::Confirmed)
                | (Request::Confirm { .. }, Response::Text(_))
        );
        if mismatched {
            return Err(ControllerError::MismatchedResponse(id));
        }

        let Some(request) = self.requests.remove(position) else {
            return Err(ControllerError::UnknownRequest(id));
        };
        let action = match request {
            Request::Prompt { action, .. } | Request::Confirm { action, .. } => action,
        };

        match response {
            Response::Cancelled => Ok(None),
            Response::Text(text) if text.trim().is_empty() => Ok(None),
            Response::Text(text) => self.apply(action.into_mutation(text)),
            Response::Confirmed => self.apply(action.into_mutation(String::new())),
        }
    }

    /// Replaces the document with a backup. On failure the document is left
    /// alone and an "invalid backup" notice is raised.
    pub fn import_backup(&mut self, text: &str) -> Result<(), ControllerError> {
        if !self.ready {
            return Err(ControllerError::NotReady);
        }
        match codec::import_document(text, &self.options.default_columns) {
            Ok(document) => self.apply(Mutation::ReplaceDocument(document)).map(|_| ()),
            Err(e) => {
                debug!("import rejected: {}", e);
                self.set_notice(NoticeKind::InvalidImport, INVALID_BACKUP_MESSAGE);
                Err(e.into())
            }
        }
    }

    /// Serializes the current document as a backup dated `date`.
    pub fn export_backup(&self, date: NaiveDate) -> Backup {
        Backup {
            file_name: codec::backup_file_name(date),
            mime_type: codec::BACKUP_MIME,
            contents: codec::export_document(&self.document),
        }
    }

    /// Clears the notice and asks the provider to sign in.
    pub fn sign_in(&mut self) {
        self.notice = None;
        if let Err(e) = self.sessions.sign_in() {
            self.on_session_failed(e);
        }
    }

    /// Asks the provider to sign out and drops subjects from memory at once.
    /// Columns are kept.
    pub fn sign_out(&mut self) {
        if let Err(e) = self.sessions.sign_out() {
            warn!("sign-out failed: {}", e);
        }
        self.teardown_subscription();
        self.clear_subjects();
    }

    pub fn state(&self) -> SyncState {
        if self.ready {
            return SyncState::Ready;
        }
        match self.mode {
            Mode::Unresolved => SyncState::Unresolved,
            Mode::Local => SyncState::LocalMode,
            Mode::Remote(_) => SyncState::RemoteMode,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn columns(&self) -> &[Column] {
        &self.document.columns
    }

    pub fn subjects(&self) -> &[Subject] {
        &self.document.subjects
    }

    pub fn active_subject(&self) -> Option<&Subject> {
        self.active_subject
            .as_deref()
            .and_then(|id| self.document.subject(id))
    }

    /// Selects the subject shown by the view.
    pub fn select_subject(&mut self, subject_id: &str) -> Result<(), ControllerError> {
        self.subject_name(subject_id)?;
        self.active_subject = Some(subject_id.to_string());
        Ok(())
    }

    pub fn overall_completion(&self) -> Completion {
        progress::overall_completion(&self.document)
    }

    pub fn subject_completion(&self, subject_id: &str) -> Option<Completion> {
        self.document
            .subject(subject_id)
            .map(|s| progress::subject_completion(s, &self.document.columns))
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{MemoryCache, MemoryDataStore, MemorySessionProvider, RecordedWrite};
    use crate::models::{Chapter, SequentialIds};

    struct Fixture {
        store: Arc<MemoryDataStore>,
        cache: Arc<MemoryCache>,
        sessions: Arc<MemorySessionProvider>,
        controller: SyncController,
    }

    fn fixture(cache: MemoryCache, sessions: MemorySessionProvider) -> Fixture {
        fixture_with_store(MemoryDataStore::new(), cache, sessions)
    }

    fn fixture_with_store(
        store: MemoryDataStore,
        cache: MemoryCache,
        sessions: MemorySessionProvider,
    ) -> Fixture {
        let store = Arc::new(store);
        let cache = Arc::new(cache);
        let sessions = Arc::new(sessions);
        let backends = Backends {
            store: store.clone(),
            cache: cache.clone(),
            sessions: sessions.clone(),
        };
        let controller = SyncController::new(backends, ControllerOptions::default())
            .with_id_generator(SequentialIds::new("p"));
        Fixture {
            store,
            cache,
            sessions,
            controller,
        }
    }

    fn started(mut f: Fixture) -> Fixture {
        f.controller.start();
        f.controller.process_pending();
        f
    }

    fn two_column_doc() -> Document {
        Document::with_columns(vec![Column::new("a", "A"), Column::new("b", "B")])
            .with_subjects(vec![Subject::new("s1", "S1")])
    }

    #[test]
    fn test_initial_state_is_unresolved() {
        let f = fixture(MemoryCache::new(), MemorySessionProvider::signed_out());
        assert_eq!(f.controller.state(), SyncState::Unresolved);
        assert!(matches!(
            f.controller.columns().first(),
            Some(c) if c.name == "Notes"
        ));
    }

    #[test]
    fn test_mutation_before_ready_is_rejected() {
        let mut f = fixture(MemoryCache::new(), MemorySessionProvider::signed_out());
        let err = f.controller.add_subject("Math").unwrap_err();
        assert!(matches!(err, ControllerError::NotReady));
    }

    #[test]
    fn test_signed_out_start_with_empty_cache() {
        let f = started(fixture(MemoryCache::new(), MemorySessionProvider::signed_out()));
        assert_eq!(f.controller.state(), SyncState::Ready);
        assert_eq!(f.controller.mode(), &Mode::Local);
        assert_eq!(f.controller.columns(), Document::builtin_columns().as_slice());
        assert!(f.controller.subjects().is_empty());
        assert!(f.controller.notice().is_none());
    }

    #[test]
    fn test_local_cache_is_adopted() {
        let text = serde_json::to_string(&two_column_doc()).unwrap();
        let f = started(fixture(
            MemoryCache::with_contents(text),
            MemorySessionProvider::signed_out(),
        ));
        assert_eq!(f.controller.document(), &two_column_doc());
        assert_eq!(f.controller.active_subject().map(|s| s.id.as_str()), Some("s1"));
    }

    #[test]
    fn test_corrupt_cache_falls_back_silently() {
        let f = started(fixture(
            MemoryCache::with_contents("{not json"),
            MemorySessionProvider::signed_out(),
        ));
        assert!(f.controller.is_ready());
        assert_eq!(f.controller.document(), &Document::default());
        assert!(f.controller.notice().is_none());

        let f = started(fixture(
            MemoryCache::unreadable(),
            MemorySessionProvider::signed_out(),
        ));
        assert!(f.controller.is_ready());
        assert!(f.controller.notice().is_none());
    }

    #[test]
    fn test_local_mutation_writes_cache() {
        let mut f = started(fixture(MemoryCache::new(), MemorySessionProvider::signed_out()));
        let id = f.controller.add_subject("  Math ").unwrap();

        assert_eq!(id, "p1");
        assert_eq!(f.controller.active_subject().map(|s| s.name.as_str()), Some("Math"));
        let cached: Document = serde_json::from_str(&f.cache.contents().unwrap()).unwrap();
        assert_eq!(&cached, f.controller.document());
        assert!(f.store.writes().is_empty());
    }

    #[test]
    fn test_empty_name_is_rejected_without_change() {
        let mut f = started(fixture(MemoryCache::new(), MemorySessionProvider::signed_out()));
        let err = f.controller.add_subject("   ").unwrap_err();
        assert!(matches!(err, ControllerError::Mutation(MutationError::EmptyName)));
        assert!(f.controller.subjects().is_empty());
        assert!(f.cache.contents().is_none());
    }

    #[test]
    fn test_toggle_notes_then_mock() {
        let mut f = started(fixture(MemoryCache::new(), MemorySessionProvider::signed_out()));
        f.controller.delete_column("c2").unwrap();
        f.controller.delete_column("c1").unwrap();
        let notes = f.controller.add_column("Notes").unwrap();
        let mock = f.controller.add_column("Mock").unwrap();
        let math = f.controller.add_subject("Math").unwrap();
        let algebra = f.controller.add_chapter(&math, "Algebra").unwrap();

        f.controller.toggle_progress(&math, &algebra, &notes).unwrap();
        assert_eq!(f.controller.overall_completion().percent(), 50);

        f.controller.toggle_progress(&math, &algebra, &mock).unwrap();
        assert_eq!(f.controller.overall_completion().percent(), 100);
        assert_eq!(f.controller.subject_completion(&math).map(|c| c.percent()), Some(100));

        f.controller.toggle_progress(&math, &algebra, &mock).unwrap();
        assert_eq!(f.controller.overall_completion().percent(), 50);
    }

    #[test]
    fn test_delete_active_subject_clears_selection() {
        let mut f = started(fixture(MemoryCache::new(), MemorySessionProvider::signed_out()));
        let first = f.controller.add_subject("Math").unwrap();
        let second = f.controller.add_subject("Physics").unwrap();

        f.controller.delete_subject(&first).unwrap();
        assert_eq!(f.controller.active_subject().map(|s| s.id.clone()), Some(second.clone()));

        f.controller.delete_subject(&second).unwrap();
        assert!(f.controller.active_subject().is_none());
    }

    #[test]
    fn test_sign_in_without_remote_document_uploads_local() {
        let local = two_column_doc();
        let mut f = started(fixture(
            MemoryCache::with_contents(serde_json::to_string(&local).unwrap()),
            MemorySessionProvider::signed_out(),
        ));

        f.sessions.allow_sign_in("u1");
        f.controller.sign_in();
        f.controller.process_pending();

        assert_eq!(f.controller.mode(), &Mode::Remote(Session::new("u1")));
        assert!(f.controller.is_ready());
        assert_eq!(
            f.store.writes(),
            vec![RecordedWrite {
                key: "u1".to_string(),
                document: local.clone(),
                mode: WriteMode::Replace,
            }]
        );
        assert_eq!(f.store.get("u1").map(|p| p.into_document(&[])), Some(local.clone()));
        assert_eq!(f.controller.document(), &local);
    }

    #[test]
    fn test_adopting_snapshot_does_not_write() {
        let store = MemoryDataStore::new();
        let remote = two_column_doc();
        store.put_external("u1", &remote);

        let f = started(fixture_with_store(
            store,
            MemoryCache::new(),
            MemorySessionProvider::signed_in("u1"),
        ));
        assert_eq!(f.controller.document(), &remote);
        assert_eq!(f.controller.active_subject().map(|s| s.id.as_str()), Some("s1"));

        let mut f = f;
        let newer = remote.clone().with_subjects(vec![Subject::new("s2", "S2")]);
        f.store.put_external("u1", &newer);
        f.controller.process_pending();

        assert_eq!(f.controller.document(), &newer);
        assert!(f.store.writes().is_empty());
    }

    #[test]
    fn test_remote_mutation_merges() {
        let store = MemoryDataStore::new();
        store.put_external("u1", &Document::default());
        let mut f = started(fixture_with_store(
            store,
            MemoryCache::new(),
            MemorySessionProvider::signed_in("u1"),
        ));

        f.controller.add_subject("Math").unwrap();
        f.controller.process_pending();

        let writes = f.store.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].mode, WriteMode::Merge);
        assert_eq!(f.controller.subjects().len(), 1);
        assert!(f.cache.contents().is_none());
    }

    #[test]
    fn test_sign_out_clears_subjects_keeps_columns() {
        let store = MemoryDataStore::new();
        let remote = Document::with_columns(vec![Column::new("x", "X")])
            .with_subjects(vec![Subject::new("r1", "Remote")]);
        store.put_external("u1", &remote);
        let local = Document::default().with_subjects(vec![Subject::new("l1", "Local")]);

        let mut f = started(fixture_with_store(
            store,
            MemoryCache::with_contents(serde_json::to_string(&local).unwrap()),
            MemorySessionProvider::signed_in("u1"),
        ));
        assert_eq!(f.controller.document(), &remote);

        f.controller.sign_out();
        assert!(f.controller.subjects().is_empty());
        assert!(f.controller.active_subject().is_none());
        assert_eq!(f.controller.columns(), remote.columns.as_slice());
        assert_eq!(f.store.watcher_count("u1"), 0);

        f.controller.process_pending();
        assert_eq!(f.controller.mode(), &Mode::Local);
        assert_eq!(f.controller.document(), &local);
    }

    #[test]
    fn test_stale_snapshot_is_ignored() {
        let store = MemoryDataStore::new();
        store.put_external("u1", &two_column_doc());
        let mut f = started(fixture_with_store(
            store,
            MemoryCache::new(),
            MemorySessionProvider::signed_in("u1"),
        ));

        f.sessions.set_session(Some(Session::new("u2")));
        f.controller.process_pending();
        let before = f.controller.document().clone();

        f.controller.handle(SyncEvent::RemoteSnapshot {
            subscription: SubscriptionId(1),
            document: Some(Document::default().into()),
        });
        f.controller.handle(SyncEvent::RemoteFailed {
            subscription: SubscriptionId(1),
            error: RemoteError::Transport("closed".to_string()),
        });

        assert_eq!(f.controller.document(), &before);
        assert!(f.controller.notice().is_none());
        assert_eq!(f.store.watcher_count("u1"), 0);
        assert_eq!(f.store.watcher_count("u2"), 1);
    }

    #[test]
    fn test_same_identity_keeps_subscription() {
        let mut f = started(fixture(MemoryCache::new(), MemorySessionProvider::signed_in("u1")));
        let writes = f.store.writes().len();

        f.sessions.set_session(Some(Session::new("u1")));
        f.controller.process_pending();

        assert_eq!(f.store.watcher_count("u1"), 1);
        assert_eq!(f.store.writes().len(), writes);
    }

    #[test]
    fn test_access_denied_fails_open() {
        let store = MemoryDataStore::new();
        store.deny("u1");
        let f = started(fixture_with_store(
            store,
            MemoryCache::new(),
            MemorySessionProvider::signed_in("u1"),
        ));

        assert!(f.controller.is_ready());
        let notice = f.controller.notice().unwrap();
        assert_eq!(notice.kind, NoticeKind::RemoteAccess);
        assert_eq!(notice.message, ACCESS_DENIED_MESSAGE);
        assert_eq!(f.controller.document(), &Document::default());
    }

    #[test]
    fn test_session_errors() {
        let mut f = started(fixture(MemoryCache::new(), MemorySessionProvider::signed_out()));

        f.controller.sign_in();
        f.controller.process_pending();
        assert!(f.controller.notice().is_none());

        f.sessions
            .fail_next_sign_in(SessionError::Configuration("No sync server configured".into()));
        f.controller.sign_in();
        assert_eq!(
            f.controller.notice().map(|n| n.kind),
            Some(NoticeKind::SessionConfiguration)
        );
        assert_eq!(f.controller.mode(), &Mode::Local);

        f.sessions
            .fail_next_sign_in(SessionError::Transient("timeout".into()));
        f.controller.sign_in();
        assert!(f.controller.notice().is_none());
    }

    #[test]
    fn test_malformed_import_leaves_document() {
        let mut f = started(fixture(MemoryCache::new(), MemorySessionProvider::signed_out()));
        f.controller.add_subject("Math").unwrap();
        let before = f.controller.document().clone();

        let err = f.controller.import_backup(r#"{"columns": []}"#).unwrap_err();
        assert!(matches!(err, ControllerError::Import(_)));
        assert_eq!(f.controller.document(), &before);
        assert_eq!(
            f.controller.notice(),
            Some(&Notice::new(NoticeKind::InvalidImport, INVALID_BACKUP_MESSAGE))
        );

        f.controller.dismiss_notice();
        assert!(f.controller.notice().is_none());
    }

    #[test]
    fn test_import_replaces_and_selects_first() {
        let mut f = started(fixture(MemoryCache::new(), MemorySessionProvider::signed_out()));
        f.controller.add_subject("Old").unwrap();

        let backup = Document::default().with_subjects(vec![
            Subject::new("s9", "History").with_chapters(vec![Chapter::new("h1", "Rome")]),
            Subject::new("s8", "Art"),
        ]);
        f.controller
            .import_backup(&codec::export_document(&backup))
            .unwrap();

        assert_eq!(f.controller.document(), &backup);
        assert_eq!(f.controller.active_subject().map(|s| s.id.as_str()), Some("s9"));
        let cached: Document = serde_json::from_str(&f.cache.contents().unwrap()).unwrap();
        assert_eq!(cached, backup);
    }

    #[test]
    fn test_export_backup() {
        let f = started(fixture(MemoryCache::new(), MemorySessionProvider::signed_out()));
        let backup = f
            .controller
            .export_backup(NaiveDate::from_ymd_opt(2025, 1, 31).unwrap());
        assert_eq!(backup.file_name, "prepmap_backup_2025-01-31.json");
        assert_eq!(backup.mime_type, "application/json");
        assert_eq!(backup.contents, codec::export_document(&Document::default()));
    }

    #[test]
    fn test_prompt_requests() {
        let mut f = started(fixture(MemoryCache::new(), MemorySessionProvider::signed_out()));

        let id = f.controller.request_add_subject();
        assert!(matches!(
            f.controller.next_request(),
            Some(Request::Prompt { title, .. }) if title == "Enter subject name:"
        ));
        assert_eq!(f.controller.resolve(id, Response::Text("  ".into())).unwrap(), None);
        assert!(f.controller.subjects().is_empty());
        assert!(f.controller.next_request().is_none());

        let id = f.controller.request_add_subject();
        let created = f.controller.resolve(id, Response::Text("Math".into())).unwrap();
        assert_eq!(created.as_deref(), Some("p1"));

        let id = f.controller.request_rename_subject("p1").unwrap();
        assert!(matches!(
            f.controller.next_request(),
            Some(Request::Prompt { default_value, .. }) if default_value == "Math"
        ));
        f.controller.resolve(id, Response::Text("Maths".into())).unwrap();
        assert_eq!(f.controller.subjects()[0].name, "Maths");
    }

    #[test]
    fn test_confirm_requests() {
        let mut f = started(fixture(MemoryCache::new(), MemorySessionProvider::signed_out()));
        let math = f.controller.add_subject("Math").unwrap();

        let id = f.controller.request_delete_subject(&math).unwrap();
        assert!(matches!(
            f.controller.resolve(id, Response::Text("yes".into())),
            Err(ControllerError::MismatchedResponse(_))
        ));
        assert_eq!(f.controller.pending_requests().count(), 1);

        f.controller.resolve(id, Response::Cancelled).unwrap();
        assert_eq!(f.controller.subjects().len(), 1);
        assert!(matches!(
            f.controller.resolve(id, Response::Confirmed),
            Err(ControllerError::UnknownRequest(_))
        ));

        let id = f.controller.request_delete_subject(&math).unwrap();
        f.controller.resolve(id, Response::Confirmed).unwrap();
        assert!(f.controller.subjects().is_empty());
    }

    #[test]
    fn test_requests_for_unknown_items() {
        let mut f = started(fixture(MemoryCache::new(), MemorySessionProvider::signed_out()));
        assert!(f.controller.request_delete_subject("nope").is_err());
        assert!(f.controller.request_add_chapter("nope").is_err());
        assert!(f.controller.request_delete_column("nope").is_err());
        assert!(f.controller.pending_requests().next().is_none());
    }

    #[tokio::test]
    async fn test_run_until_ready() {
        let store = MemoryDataStore::new();
        store.put_external("u1", &two_column_doc());
        let mut f = fixture_with_store(
            store,
            MemoryCache::new(),
            MemorySessionProvider::signed_in("u1"),
        );

        f.controller.start();
        f.controller.run_until_ready().await;

        assert_eq!(f.controller.state(), SyncState::Ready);
        assert_eq!(f.controller.document(), &two_column_doc());
    }
}
