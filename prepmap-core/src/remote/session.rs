//! [`SessionProvider`] that resolves identity from an API key.

use std::sync::{Arc, Mutex};

use tokio::runtime::Handle;
use tracing::debug;

use super::client::RemoteClient;
use crate::backend::{lock, SessionError, SessionProvider};
use crate::event::{IdentitySink, Session};

#[derive(Default)]
struct State {
    sinks: Vec<IdentitySink>,
    current: Option<Session>,
    signed_out: bool,
    resolving: bool,
}

/// Signed in whenever a server and API key are configured and `/me`
/// accepts the key.
///
/// Resolution failures are reported through the sink and followed by a
/// signed-out identity, so the controller still reaches Ready.
#[derive(Clone)]
pub struct RemoteSessionProvider {
    client: Option<RemoteClient>,
    runtime: Handle,
    state: Arc<Mutex<State>>,
}

impl RemoteSessionProvider {
    pub fn new(client: Option<RemoteClient>, runtime: Handle) -> Self {
        Self {
            client,
            runtime,
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// A provider that reports signed-out until [`SessionProvider::sign_in`]
    /// is called, even though a key is configured.
    pub fn signed_out(client: Option<RemoteClient>, runtime: Handle) -> Self {
        let provider = Self::new(client, runtime);
        lock(&provider.state).signed_out = true;
        provider
    }

    pub fn current(&self) -> Option<Session> {
        lock(&self.state).current.clone()
    }

    /// True while a `/me` lookup is in flight. Its outcome is delivered to the
    /// sinks before this turns false.
    pub fn is_resolving(&self) -> bool {
        lock(&self.state).resolving
    }

    fn broadcast(&self, session: Option<Session>) {
        let mut state = lock(&self.state);
        state.current = session.clone();
        for sink in &state.sinks {
            sink.changed(session.clone());
        }
    }

    fn resolve(&self, sinks: Vec<IdentitySink>) {
        let Some(client) = self.client.clone() else {
            for sink in sinks {
                sink.changed(None);
            }
            return;
        };

        let state = self.state.clone();
        lock(&state).resolving = true;
        self.runtime.spawn(async move {
            let result = client.fetch_identity().await;
            let mut state = lock(&state);
            state.resolving = false;
            if state.signed_out {
                debug!("identity resolved after sign-out, ignoring");
                for sink in &sinks {
                    sink.changed(None);
                }
                return;
            }
            match result {
                Ok(session) => {
                    debug!("resolved identity {}", session.user_id);
                    state.current = Some(session.clone());
                    for sink in &sinks {
                        sink.changed(Some(session.clone()));
                    }
                }
                Err(e) => {
                    debug!("could not resolve identity: {}", e);
                    state.current = None;
                    for sink in &sinks {
                        sink.failed(e.clone());
                        sink.changed(None);
                    }
                }
            }
        });
    }
}

impl SessionProvider for RemoteSessionProvider {
    fn attach(&self, sink: IdentitySink) {
        let signed_out = {
            let mut state = lock(&self.state);
            state.sinks.push(sink.clone());
            state.signed_out
        };
        if signed_out {
            sink.changed(None);
        } else {
            self.resolve(vec![sink]);
        }
    }

    fn sign_in(&self) -> Result<(), SessionError> {
        if self.client.is_none() {
            return Err(SessionError::Configuration(
                "No sync server configured. Run `prepmap auth login`.".to_string(),
            ));
        }
        let sinks = {
            let mut state = lock(&self.state);
            state.signed_out = false;
            state.sinks.clone()
        };
        self.resolve(sinks);
        Ok(())
    }

    fn sign_out(&self) -> Result<(), SessionError> {
        lock(&self.state).signed_out = true;
        self.broadcast(None);
        Ok(())
    }
}
