//! Events delivered to the sync controller.
//!
//! Backends never touch controller state directly. They push [`SyncEvent`]s
//! into an unbounded channel; the controller drains it on its own thread of
//! control and reacts to each event in order.

use std::fmt;

use tokio::sync::mpsc;

use crate::backend::{RemoteError, SessionError};
use crate::models::PartialDocument;

/// A signed-in identity. `user_id` doubles as the remote document key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
}

impl Session {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

/// Tags every remote delivery with the subscription that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[derive(Debug)]
pub enum SyncEvent {
    /// Identity resolved or changed; `None` means signed out.
    IdentityChanged(Option<Session>),
    /// The session provider failed to sign in or resolve an identity.
    SessionFailed(SessionError),
    /// Current remote document (`None` if it does not exist yet).
    RemoteSnapshot {
        subscription: SubscriptionId,
        document: Option<PartialDocument>,
    },
    /// The remote subscription failed and will deliver nothing more.
    RemoteFailed {
        subscription: SubscriptionId,
        error: RemoteError,
    },
}

/// Sending half of the controller's event channel.
#[derive(Debug, Clone)]
pub struct EventSender(mpsc::UnboundedSender<SyncEvent>);

impl EventSender {
    pub fn send(&self, event: SyncEvent) {
        if self.0.send(event).is_err() {
            tracing::debug!("sync event dropped, controller is gone");
        }
    }
}

/// Receiving half of the controller's event channel.
#[derive(Debug)]
pub struct EventReceiver(mpsc::UnboundedReceiver<SyncEvent>);

impl EventReceiver {
    pub fn try_recv(&mut self) -> Option<SyncEvent> {
        self.0.try_recv().ok()
    }

    pub async fn recv(&mut self) -> Option<SyncEvent> {
        self.0.recv().await
    }
}

pub fn event_channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender(tx), EventReceiver(rx))
}

/// Where a data store delivers snapshots for one subscription.
#[derive(Debug, Clone)]
pub struct SnapshotSink {
    subscription: SubscriptionId,
    events: EventSender,
}

impl SnapshotSink {
    pub fn new(subscription: SubscriptionId, events: EventSender) -> Self {
        Self {
            subscription,
            events,
        }
    }

    pub fn subscription(&self) -> SubscriptionId {
        self.subscription
    }

    pub fn snapshot(&self, document: Option<PartialDocument>) {
        self.events.send(SyncEvent::RemoteSnapshot {
            subscription: self.subscription,
            document,
        });
    }

    pub fn fail(&self, error: RemoteError) {
        self.events.send(SyncEvent::RemoteFailed {
            subscription: self.subscription,
            error,
        });
    }
}

/// Where a session provider reports identity changes.
#[derive(Debug, Clone)]
pub struct IdentitySink(EventSender);

impl IdentitySink {
    pub fn new(events: EventSender) -> Self {
        Self(events)
    }

    pub fn changed(&self, session: Option<Session>) {
        self.0.send(SyncEvent::IdentityChanged(session));
    }

    pub fn failed(&self, error: SessionError) {
        self.0.send(SyncEvent::SessionFailed(error));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_sink_tags_subscription() {
        let (tx, mut rx) = event_channel();
        let sink = SnapshotSink::new(SubscriptionId(7), tx);
        sink.snapshot(None);

        match rx.try_recv() {
            Some(SyncEvent::RemoteSnapshot {
                subscription,
                document,
            }) => {
                assert_eq!(subscription, SubscriptionId(7));
                assert!(document.is_none());
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_send_after_receiver_dropped_is_silent() {
        let (tx, rx) = event_channel();
        drop(rx);
        IdentitySink::new(tx).changed(None);
    }
}
