//! API key authentication.
//!
//! Keys come from the server config file. HTTP requests carry the key as a
//! Bearer token; WebSocket clients may pass it as a `key` query parameter
//! instead, since browsers cannot set headers on the upgrade request.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

use super::AppState;
use crate::config::{ApiKeyEntry, ConfigFile};

/// Authenticated user info, added to request extensions after auth
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: String,
}

/// API key store - maps key -> AuthUser
#[derive(Debug, Clone, Default)]
pub struct ApiKeyStore {
    keys: HashMap<String, AuthUser>,
}

impl ApiKeyStore {
    pub fn from_entries(entries: impl IntoIterator<Item = ApiKeyEntry>) -> Self {
        let keys = entries
            .into_iter()
            .map(|entry| {
                (
                    entry.key,
                    AuthUser {
                        user_id: entry.user_id,
                    },
                )
            })
            .collect();
        Self { keys }
    }

    /// Load API keys from config file
    pub fn load(config_path: &Path) -> Self {
        match std::fs::read_to_string(config_path) {
            Ok(contents) => match serde_yaml::from_str::<ConfigFile>(&contents) {
                Ok(config) => {
                    let store = Self::from_entries(config.api_keys);
                    tracing::info!("Loaded {} API key(s)", store.len());
                    store
                }
                Err(e) => {
                    tracing::warn!("Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!(
                    "Failed to read config file {}: {}",
                    config_path.display(),
                    e
                );
                tracing::warn!("No API keys loaded - all authenticated requests will fail");
                Self::default()
            }
        }
    }

    /// Validate an API key and return the associated user
    pub fn validate(&self, key: &str) -> Option<AuthUser> {
        self.keys.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// JSON error body returned by the server.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn response(status: StatusCode, error: &'static str, message: impl Into<String>) -> Response {
        (
            status,
            Json(ApiError {
                error,
                message: message.into(),
            }),
        )
            .into_response()
    }
}

/// Key from the `key` query parameter, if present.
fn query_key(request: &Request) -> Option<String> {
    request.uri().query()?.split('&').find_map(|pair| {
        let value = pair.strip_prefix("key=")?;
        urlencoding::decode(value).ok().map(|v| v.into_owned())
    })
}

/// Authentication middleware
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let api_key = match auth_header {
        Some(h) => match h.strip_prefix("Bearer ") {
            Some(key) => key.to_string(),
            None => {
                return ApiError::response(
                    StatusCode::UNAUTHORIZED,
                    "invalid_auth",
                    "Authorization header must use Bearer scheme",
                );
            }
        },
        None => match query_key(&request) {
            Some(key) => key,
            None => {
                return ApiError::response(
                    StatusCode::UNAUTHORIZED,
                    "missing_auth",
                    "Authorization header required",
                );
            }
        },
    };

    match state.api_keys.validate(&api_key) {
        Some(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        None => ApiError::response(StatusCode::UNAUTHORIZED, "invalid_key", "Invalid API key"),
    }
}
