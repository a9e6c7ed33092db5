//! Fan-out of document changes to watch connections.
//!
//! Every successful write is broadcast as a full snapshot to all sockets
//! watching the same user's document.

use prepmap_core::remote::WatchMessage;
use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};

/// Per-user broadcast channels.
pub struct WatchHub {
    channels: RwLock<HashMap<String, broadcast::Sender<WatchMessage>>>,
}

impl WatchHub {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribes to changes of `user_id`'s document.
    pub async fn subscribe(&self, user_id: &str) -> broadcast::Receiver<WatchMessage> {
        let mut channels = self.channels.write().await;

        if let Some(sender) = channels.get(user_id) {
            sender.subscribe()
        } else {
            let (sender, receiver) = broadcast::channel(16);
            channels.insert(user_id.to_string(), sender);
            receiver
        }
    }

    /// Sends `message` to every watcher of `user_id`.
    pub async fn broadcast(&self, user_id: &str, message: WatchMessage) {
        let mut channels = self.channels.write().await;

        if let Some(sender) = channels.get(user_id) {
            if sender.send(message).is_err() {
                // Every watcher has gone away
                channels.remove(user_id);
            }
        }
    }

    /// Number of open watch connections for `user_id`.
    #[cfg(test)]
    pub async fn watcher_count(&self, user_id: &str) -> usize {
        self.channels
            .read()
            .await
            .get(user_id)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}

impl Default for WatchHub {
    fn default() -> Self {
        Self::new()
    }
}
