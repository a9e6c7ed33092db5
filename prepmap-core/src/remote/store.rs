//! [`DataStore`] backed by the document server.

use futures::{SinkExt, StreamExt};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite, tungstenite::Message};
use tracing::{debug, warn};

use super::client::RemoteClient;
use super::protocol::WatchMessage;
use crate::backend::{DataStore, RemoteError, Subscription, WriteMode};
use crate::event::SnapshotSink;
use crate::models::Document;

enum WriteJob {
    Put {
        key: String,
        document: Document,
        mode: WriteMode,
    },
    Flush(oneshot::Sender<()>),
}

/// Remote store speaking HTTP for writes and WebSocket for watches.
///
/// Writes are queued to a single background task, so they reach the server
/// in the order they were issued.
pub struct HttpDataStore {
    client: RemoteClient,
    runtime: Handle,
    writes: mpsc::UnboundedSender<WriteJob>,
}

impl HttpDataStore {
    /// Creates the store, spawning its writer on `runtime`.
    pub fn new(client: RemoteClient, runtime: Handle) -> Self {
        let (writes, queue) = mpsc::unbounded_channel();
        runtime.spawn(run_writer(client.clone(), queue));
        Self {
            client,
            runtime,
            writes,
        }
    }

    pub fn client(&self) -> &RemoteClient {
        &self.client
    }

    /// Waits until every write issued so far has completed.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.writes.send(WriteJob::Flush(done)).is_err() {
            return;
        }
        let _ = wait.await;
    }
}

impl DataStore for HttpDataStore {
    fn write(&self, key: &str, document: &Document, mode: WriteMode) {
        let job = WriteJob::Put {
            key: key.to_string(),
            document: document.clone(),
            mode,
        };
        if self.writes.send(job).is_err() {
            warn!("remote writer stopped, dropping write to {}", key);
        }
    }

    fn subscribe(&self, key: &str, sink: SnapshotSink) -> Subscription {
        let task = self
            .runtime
            .spawn(watch(self.client.clone(), key.to_string(), sink));
        Subscription::new(move || task.abort())
    }
}

async fn run_writer(client: RemoteClient, mut queue: mpsc::UnboundedReceiver<WriteJob>) {
    while let Some(job) = queue.recv().await {
        match job {
            WriteJob::Put {
                key,
                document,
                mode,
            } => match client.put_document(&key, &document, mode).await {
                Ok(()) => debug!("wrote document {} ({:?})", key, mode),
                Err(e) => warn!("remote write to {} failed: {}", key, e),
            },
            WriteJob::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

async fn watch(client: RemoteClient, key: String, sink: SnapshotSink) {
    let url = client.build_ws_url(&key);
    let (stream, _) = match connect_async(&url).await {
        Ok(connected) => connected,
        Err(e) => {
            sink.fail(connect_error(e));
            return;
        }
    };
    debug!("watching {} as {}", key, sink.subscription());

    let (mut sender, mut receiver) = stream.split();
    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                match WatchMessage::decode(text.as_str()).and_then(WatchMessage::into_document) {
                    Ok(document) => sink.snapshot(document),
                    Err(e) => {
                        sink.fail(RemoteError::Decode(e.to_string()));
                        return;
                    }
                }
            }
            Ok(Message::Ping(data)) => {
                if let Err(e) = sender.send(Message::Pong(data)).await {
                    sink.fail(RemoteError::Transport(e.to_string()));
                    return;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                sink.fail(RemoteError::Transport(e.to_string()));
                return;
            }
        }
    }
    sink.fail(RemoteError::Transport(
        "Server closed the watch connection".to_string(),
    ));
}

fn connect_error(error: tungstenite::Error) -> RemoteError {
    match error {
        tungstenite::Error::Http(response)
            if matches!(response.status().as_u16(), 401 | 403) =>
        {
            RemoteError::AccessDenied(format!("watch refused ({})", response.status()))
        }
        other => RemoteError::Transport(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{event_channel, SubscriptionId, SyncEvent};

    #[tokio::test]
    async fn test_watch_unreachable_server_fails() {
        let store = HttpDataStore::new(
            RemoteClient::new("http://127.0.0.1:1".to_string(), "k".to_string()),
            Handle::current(),
        );
        let (tx, mut rx) = event_channel();

        let _sub = store.subscribe("u1", SnapshotSink::new(SubscriptionId(1), tx));

        match rx.recv().await {
            Some(SyncEvent::RemoteFailed {
                subscription,
                error,
            }) => {
                assert_eq!(subscription, SubscriptionId(1));
                assert!(matches!(error, RemoteError::Transport(_)));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_flush_waits_for_failed_writes() {
        let store = HttpDataStore::new(
            RemoteClient::new("http://127.0.0.1:1".to_string(), "k".to_string()),
            Handle::current(),
        );
        store.write("u1", &Document::default(), WriteMode::Merge);
        store.flush().await;
    }
}
