//! HTTP client for the document server.

use std::time::Duration;

use reqwest::StatusCode;

use super::protocol::MeResponse;
use crate::backend::{RemoteError, SessionError, WriteMode};
use crate::event::Session;
use crate::models::{Document, PartialDocument};

/// Timeout for the reachability check.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection details for one server and API key.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    server_url: String,
    api_key: String,
    http: reqwest::Client,
}

impl RemoteClient {
    pub fn new(server_url: String, api_key: String) -> Self {
        Self {
            server_url,
            api_key,
            http: reqwest::Client::new(),
        }
    }

    /// Resolves the identity behind the API key via `/me`.
    pub async fn fetch_identity(&self) -> Result<Session, SessionError> {
        let response = self
            .http
            .get(self.build_http_url("/me"))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| SessionError::Transient(e.to_string()))?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(SessionError::Configuration(
                    "Sync server rejected the API key. Run `prepmap auth login`.".to_string(),
                ))
            }
            status => {
                return Err(SessionError::Transient(format!(
                    "Server returned status {}",
                    status
                )))
            }
        }

        let me: MeResponse = response
            .json()
            .await
            .map_err(|e| SessionError::Transient(e.to_string()))?;
        Ok(Session::new(me.user_id))
    }

    /// Reads the document stored under `key`, `None` if there is none.
    pub async fn get_document(&self, key: &str) -> Result<Option<PartialDocument>, RemoteError> {
        let response = self
            .http
            .get(self.document_url(key))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        check_status(response.status(), key)?;

        response
            .json()
            .await
            .map(Some)
            .map_err(|e| RemoteError::Decode(e.to_string()))
    }

    /// Writes `document` under `key`.
    pub async fn put_document(
        &self,
        key: &str,
        document: &Document,
        mode: WriteMode,
    ) -> Result<(), RemoteError> {
        let merge = matches!(mode, WriteMode::Merge);
        let response = self
            .http
            .put(format!("{}?merge={}", self.document_url(key), merge))
            .bearer_auth(&self.api_key)
            .json(document)
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        check_status(response.status(), key)
    }

    /// WebSocket URL watching `key`.
    pub(crate) fn build_ws_url(&self, key: &str) -> String {
        let base_url = if self.server_url.starts_with("http://") {
            self.server_url.replacen("http://", "ws://", 1)
        } else if self.server_url.starts_with("https://") {
            self.server_url.replacen("https://", "wss://", 1)
        } else if !self.server_url.starts_with("ws://") && !self.server_url.starts_with("wss://") {
            format!("ws://{}", self.server_url)
        } else {
            self.server_url.clone()
        };

        format!(
            "{}/documents/{}/watch?key={}",
            base_url.trim_end_matches('/'),
            urlencoding::encode(key),
            urlencoding::encode(&self.api_key)
        )
    }

    pub(crate) fn build_http_url(&self, path: &str) -> String {
        http_base(&self.server_url) + path
    }

    fn document_url(&self, key: &str) -> String {
        self.build_http_url(&format!("/documents/{}", urlencoding::encode(key)))
    }
}

fn http_base(server_url: &str) -> String {
    let base_url = if server_url.starts_with("ws://") {
        server_url.replacen("ws://", "http://", 1)
    } else if server_url.starts_with("wss://") {
        server_url.replacen("wss://", "https://", 1)
    } else if !server_url.starts_with("http://") && !server_url.starts_with("https://") {
        format!("http://{}", server_url)
    } else {
        server_url.to_string()
    };
    base_url.trim_end_matches('/').to_string()
}

fn check_status(status: StatusCode, key: &str) -> Result<(), RemoteError> {
    match status {
        s if s.is_success() => Ok(()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(RemoteError::AccessDenied(
            format!("server refused access to {} ({})", key, status),
        )),
        s => Err(RemoteError::Transport(format!("Server returned status {}", s))),
    }
}

/// Returns true if the server answers `/health`.
pub async fn check_server(server_url: &str) -> bool {
    let client = match reqwest::Client::builder().timeout(HEALTH_TIMEOUT).build() {
        Ok(client) => client,
        Err(_) => return false,
    };
    match client
        .get(format!("{}/health", http_base(server_url)))
        .send()
        .await
    {
        Ok(response) => response.status().is_success(),
        Err(_) => false,
    }
}
