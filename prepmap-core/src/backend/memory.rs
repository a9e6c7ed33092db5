//! In-memory backends.
//!
//! These behave like the real backends closely enough to drive the controller
//! in tests: the data store keeps JSON objects with real merge semantics and
//! notifies every watcher (including the writer) after each write.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};

use super::{
    lock, CacheError, DataStore, LocalCache, RemoteError, SessionError, SessionProvider, Subscription,
    WriteMode,
};
use crate::event::{IdentitySink, Session, SnapshotSink};
use crate::models::{Document, PartialDocument};

/// A write observed by [`MemoryDataStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    pub key: String,
    pub document: Document,
    pub mode: WriteMode,
}

struct Watcher {
    id: u64,
    key: String,
    sink: SnapshotSink,
}

#[derive(Default)]
struct StoreState {
    documents: HashMap<String, Map<String, Value>>,
    watchers: Vec<Watcher>,
    next_watcher: u64,
    denied: HashSet<String>,
    writes: Vec<RecordedWrite>,
}

impl StoreState {
    fn snapshot(&self, key: &str) -> Result<Option<PartialDocument>, RemoteError> {
        let Some(object) = self.documents.get(key) else {
            return Ok(None);
        };
        serde_json::from_value(Value::Object(object.clone()))
            .map(Some)
            .map_err(|e| RemoteError::Decode(e.to_string()))
    }

    /// A stored document that cannot be decoded ends every watch on `key`.
    fn notify(&mut self, key: &str) {
        match self.snapshot(key) {
            Ok(snapshot) => {
                for watcher in self.watchers.iter().filter(|w| w.key == key) {
                    watcher.sink.snapshot(snapshot.clone());
                }
            }
            Err(error) => {
                for watcher in self.watchers.iter().filter(|w| w.key == key) {
                    watcher.sink.fail(error.clone());
                }
                self.watchers.retain(|w| w.key != key);
            }
        }
    }

    fn store(&mut self, key: &str, document: &Document, mode: WriteMode) {
        let Ok(Value::Object(patch)) = serde_json::to_value(document) else {
            return;
        };
        match mode {
            WriteMode::Replace => {
                self.documents.insert(key.to_string(), patch);
            }
            WriteMode::Merge => {
                let stored = self.documents.entry(key.to_string()).or_default();
                stored.extend(patch);
            }
        }
        self.notify(key);
    }
}

/// In-memory [`DataStore`].
#[derive(Clone, Default)]
pub struct MemoryDataStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current document under `key`.
    pub fn get(&self, key: &str) -> Option<PartialDocument> {
        lock(&self.state).snapshot(key).ok().flatten()
    }

    /// Raw stored JSON object under `key`.
    pub fn get_raw(&self, key: &str) -> Option<Map<String, Value>> {
        lock(&self.state).documents.get(key).cloned()
    }

    /// Stores `object` verbatim under `key` and notifies watchers.
    pub fn put_raw(&self, key: &str, object: Map<String, Value>) {
        let mut state = lock(&self.state);
        state.documents.insert(key.to_string(), object);
        state.notify(key);
    }

    /// Writes as another device would: not recorded, but watchers are notified.
    pub fn put_external(&self, key: &str, document: &Document) {
        lock(&self.state).store(key, document, WriteMode::Replace);
    }

    /// Makes every access to `key` fail with [`RemoteError::AccessDenied`].
    pub fn deny(&self, key: &str) {
        lock(&self.state).denied.insert(key.to_string());
    }

    /// Writes issued through the [`DataStore`] trait, in order.
    pub fn writes(&self) -> Vec<RecordedWrite> {
        lock(&self.state).writes.clone()
    }

    pub fn watcher_count(&self, key: &str) -> usize {
        lock(&self.state)
            .watchers
            .iter()
            .filter(|w| w.key == key)
            .count()
    }
}

impl DataStore for MemoryDataStore {
    fn write(&self, key: &str, document: &Document, mode: WriteMode) {
        let mut state = lock(&self.state);
        if state.denied.contains(key) {
            tracing::warn!("memory store: write to {} denied", key);
            return;
        }
        state.writes.push(RecordedWrite {
            key: key.to_string(),
            document: document.clone(),
            mode,
        });
        state.store(key, document, mode);
    }

    fn subscribe(&self, key: &str, sink: SnapshotSink) -> Subscription {
        let mut state = lock(&self.state);
        if state.denied.contains(key) {
            sink.fail(RemoteError::AccessDenied(format!("no access to {}", key)));
            return Subscription::detached();
        }

        match state.snapshot(key) {
            Ok(snapshot) => sink.snapshot(snapshot),
            Err(error) => {
                sink.fail(error);
                return Subscription::detached();
            }
        }

        let id = state.next_watcher;
        state.next_watcher += 1;
        state.watchers.push(Watcher {
            id,
            key: key.to_string(),
            sink,
        });

        let shared = Arc::downgrade(&self.state);
        Subscription::new(move || {
            if let Some(shared) = shared.upgrade() {
                lock(&shared).watchers.retain(|w| w.id != id);
            }
        })
    }
}

/// In-memory [`LocalCache`].
#[derive(Debug, Default)]
pub struct MemoryCache {
    slot: Mutex<Option<String>>,
    fail_reads: bool,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contents(text: impl Into<String>) -> Self {
        Self {
            slot: Mutex::new(Some(text.into())),
            fail_reads: false,
        }
    }

    /// A cache whose reads always fail with an I/O error.
    pub fn unreadable() -> Self {
        Self {
            slot: Mutex::new(None),
            fail_reads: true,
        }
    }

    pub fn contents(&self) -> Option<String> {
        lock(&self.slot).clone()
    }
}

impl LocalCache for MemoryCache {
    fn read(&self) -> Result<Option<String>, CacheError> {
        if self.fail_reads {
            return Err(CacheError::Io(
                super::LOCAL_CACHE_KEY.into(),
                std::io::Error::other("unreadable"),
            ));
        }
        Ok(lock(&self.slot).clone())
    }

    fn write(&self, text: &str) -> Result<(), CacheError> {
        *lock(&self.slot) = Some(text.to_string());
        Ok(())
    }
}

#[derive(Default)]
struct SessionState {
    current: Option<Session>,
    sinks: Vec<IdentitySink>,
    sign_in_as: Option<Session>,
    sign_in_error: Option<SessionError>,
}

impl SessionState {
    fn set(&mut self, session: Option<Session>) {
        self.current = session;
        for sink in &self.sinks {
            sink.changed(self.current.clone());
        }
    }
}

/// In-memory [`SessionProvider`] whose identity is set by the test.
#[derive(Default)]
pub struct MemorySessionProvider {
    state: Mutex<SessionState>,
}

impl MemorySessionProvider {
    /// A provider that is signed out.
    pub fn signed_out() -> Self {
        Self::default()
    }

    /// A provider that is already signed in as `user_id`.
    pub fn signed_in(user_id: &str) -> Self {
        let provider = Self::default();
        lock(&provider.state).current = Some(Session::new(user_id));
        provider
    }

    /// Who [`SessionProvider::sign_in`] signs in as.
    pub fn allow_sign_in(&self, user_id: &str) {
        lock(&self.state).sign_in_as = Some(Session::new(user_id));
    }

    /// Makes the next sign-in attempt fail with `error`.
    pub fn fail_next_sign_in(&self, error: SessionError) {
        lock(&self.state).sign_in_error = Some(error);
    }

    /// Changes identity and notifies every attached sink.
    pub fn set_session(&self, session: Option<Session>) {
        lock(&self.state).set(session);
    }

    pub fn current(&self) -> Option<Session> {
        lock(&self.state).current.clone()
    }
}

impl SessionProvider for MemorySessionProvider {
    fn attach(&self, sink: IdentitySink) {
        let mut state = lock(&self.state);
        sink.changed(state.current.clone());
        state.sinks.push(sink);
    }

    fn sign_in(&self) -> Result<(), SessionError> {
        let mut state = lock(&self.state);
        if let Some(error) = state.sign_in_error.take() {
            return Err(error);
        }
        let session = state.sign_in_as.clone().ok_or(SessionError::Cancelled)?;
        state.set(Some(session));
        Ok(())
    }

    fn sign_out(&self) -> Result<(), SessionError> {
        lock(&self.state).set(None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{event_channel, SubscriptionId, SyncEvent};
    use crate::models::Subject;

    fn snapshot_of(event: Option<SyncEvent>) -> Option<PartialDocument> {
        match event {
            Some(SyncEvent::RemoteSnapshot { document, .. }) => document,
            other => panic!("expected snapshot, got {:?}", other),
        }
    }

    #[test]
    fn test_subscribe_sends_initial_snapshot() {
        let store = MemoryDataStore::new();
        let (tx, mut rx) = event_channel();

        let _sub = store.subscribe("u1", SnapshotSink::new(SubscriptionId(1), tx));
        assert!(snapshot_of(rx.try_recv()).is_none());
    }

    #[test]
    fn test_undecodable_document_fails_subscription() {
        let store = MemoryDataStore::new();
        let raw = serde_json::json!({"columns": [], "subjects": 5});
        let Value::Object(object) = raw else { unreachable!() };
        store.put_raw("u1", object);

        let (tx, mut rx) = event_channel();
        let _sub = store.subscribe("u1", SnapshotSink::new(SubscriptionId(1), tx));

        match rx.try_recv() {
            Some(SyncEvent::RemoteFailed { error, .. }) => {
                assert!(matches!(error, RemoteError::Decode(_)));
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(store.watcher_count("u1"), 0);
    }

    #[test]
    fn test_undecodable_write_fails_watchers() {
        let store = MemoryDataStore::new();
        let (tx, mut rx) = event_channel();
        let _sub = store.subscribe("u1", SnapshotSink::new(SubscriptionId(1), tx));
        rx.try_recv();

        let raw = serde_json::json!({"columns": "Notes"});
        let Value::Object(object) = raw else { unreachable!() };
        store.put_raw("u1", object);

        assert!(matches!(
            rx.try_recv(),
            Some(SyncEvent::RemoteFailed {
                error: RemoteError::Decode(_),
                ..
            })
        ));
        assert_eq!(store.watcher_count("u1"), 0);
        assert!(store.get("u1").is_none());
    }

    #[test]
    fn test_write_notifies_watchers() {
        let store = MemoryDataStore::new();
        let (tx, mut rx) = event_channel();
        let _sub = store.subscribe("u1", SnapshotSink::new(SubscriptionId(1), tx));
        rx.try_recv();

        store.write("u1", &Document::default(), WriteMode::Merge);

        let doc = snapshot_of(rx.try_recv()).unwrap();
        assert_eq!(doc.columns, Some(Document::builtin_columns()));
        assert_eq!(store.writes().len(), 1);
    }

    #[test]
    fn test_dropped_subscription_stops_notifications() {
        let store = MemoryDataStore::new();
        let (tx, mut rx) = event_channel();
        let sub = store.subscribe("u1", SnapshotSink::new(SubscriptionId(1), tx));
        rx.try_recv();
        assert_eq!(store.watcher_count("u1"), 1);

        drop(sub);
        store.put_external("u1", &Document::default());

        assert_eq!(store.watcher_count("u1"), 0);
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn test_merge_keeps_unrelated_fields() {
        let store = MemoryDataStore::new();
        {
            let mut state = lock(&store.state);
            let mut object = Map::new();
            object.insert("theme".to_string(), Value::String("dark".to_string()));
            state.documents.insert("u1".to_string(), object);
        }

        let doc = Document::default().with_subjects(vec![Subject::new("s1", "Math")]);
        store.write("u1", &doc, WriteMode::Merge);

        let raw = store.get_raw("u1").unwrap();
        assert_eq!(raw.get("theme"), Some(&Value::String("dark".to_string())));
        assert_eq!(store.get("u1").unwrap().subjects.unwrap().len(), 1);
    }

    #[test]
    fn test_denied_subscription_fails() {
        let store = MemoryDataStore::new();
        store.deny("u1");
        let (tx, mut rx) = event_channel();

        let _sub = store.subscribe("u1", SnapshotSink::new(SubscriptionId(3), tx));

        match rx.try_recv() {
            Some(SyncEvent::RemoteFailed {
                subscription,
                error,
            }) => {
                assert_eq!(subscription, SubscriptionId(3));
                assert!(matches!(error, RemoteError::AccessDenied(_)));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_session_provider_reports_on_attach() {
        let provider = MemorySessionProvider::signed_in("u1");
        let (tx, mut rx) = event_channel();
        provider.attach(IdentitySink::new(tx));

        match rx.try_recv() {
            Some(SyncEvent::IdentityChanged(Some(session))) => assert_eq!(session.user_id, "u1"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_sign_in_without_account_is_cancelled() {
        let provider = MemorySessionProvider::signed_out();
        assert_eq!(provider.sign_in(), Err(SessionError::Cancelled));
    }

    #[test]
    fn test_memory_cache() {
        let cache = MemoryCache::new();
        assert!(cache.read().unwrap().is_none());
        cache.write("{}").unwrap();
        assert_eq!(cache.contents().as_deref(), Some("{}"));
        assert!(MemoryCache::unreadable().read().is_err());
    }
}
