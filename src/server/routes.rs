//! Request handlers and the router.
//!
//! A key may only touch the document named after its own user id.

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Extension, Json, Router,
};
use futures::{SinkExt, StreamExt};
use prepmap_core::remote::{HealthResponse, MeResponse, WatchMessage};
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::broadcast::error::RecvError;
use tower_http::trace::TraceLayer;

use super::auth::{auth_middleware, ApiError, AuthUser};
use super::storage::{ServerStorage, ServerStorageError};
use super::AppState;

/// Builds the full router: `/health` is public, everything else needs a key.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new().route("/health", get(health));

    let protected_routes = Router::new()
        .route("/me", get(me))
        .route("/documents/{key}", get(get_document).put(put_document))
        .route("/documents/{key}/watch", get(watch_document))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Health check endpoint (no auth required)
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Get current user info (auth required)
async fn me(Extension(user): Extension<AuthUser>) -> Json<MeResponse> {
    Json(MeResponse {
        user_id: user.user_id,
    })
}

/// Checks that `key` is a well-formed document key owned by `user`.
fn authorize(user: &AuthUser, key: &str) -> Result<(), Response> {
    if ServerStorage::validate_user_id(key).is_err() {
        return Err(ApiError::response(
            StatusCode::BAD_REQUEST,
            "invalid_document_key",
            format!("Invalid document key: {}", key),
        ));
    }
    if user.user_id != key {
        tracing::warn!("User {} denied access to document {}", user.user_id, key);
        return Err(ApiError::response(
            StatusCode::FORBIDDEN,
            "forbidden",
            "API key does not grant access to this document",
        ));
    }
    Ok(())
}

fn storage_error(e: ServerStorageError) -> Response {
    match e {
        ServerStorageError::InvalidUserId(id) => ApiError::response(
            StatusCode::BAD_REQUEST,
            "invalid_document_key",
            format!("Invalid document key: {}", id),
        ),
        e => {
            tracing::error!("Storage error: {}", e);
            ApiError::response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "storage_error",
                "Failed to access document storage",
            )
        }
    }
}

async fn get_document(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(key): Path<String>,
) -> Response {
    if let Err(response) = authorize(&user, &key) {
        return response;
    }

    let loaded = state.storage.read().await.load(&key);
    match loaded {
        Ok(Some(document)) => Json(Value::Object(document)).into_response(),
        Ok(None) => ApiError::response(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("No document stored for {}", key),
        ),
        Err(e) => storage_error(e),
    }
}

#[derive(Debug, Deserialize)]
struct WriteParams {
    #[serde(default)]
    merge: bool,
}

async fn put_document(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(key): Path<String>,
    Query(params): Query<WriteParams>,
    Json(body): Json<Value>,
) -> Response {
    if let Err(response) = authorize(&user, &key) {
        return response;
    }

    let Value::Object(patch) = body else {
        return ApiError::response(
            StatusCode::BAD_REQUEST,
            "invalid_body",
            "Document must be a JSON object",
        );
    };

    // Broadcast under the write lock so watchers see writes in commit order
    let storage = state.storage.write().await;
    let stored = match storage.put(&key, patch, params.merge) {
        Ok(stored) => stored,
        Err(e) => return storage_error(e),
    };
    tracing::debug!(
        "Stored document for {} (merge: {}, {} field(s))",
        key,
        params.merge,
        stored.len()
    );
    state
        .hub
        .broadcast(&key, WatchMessage::snapshot(Some(Value::Object(stored))))
        .await;
    drop(storage);

    StatusCode::NO_CONTENT.into_response()
}

async fn watch_document(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(key): Path<String>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if let Err(response) = authorize(&user, &key) {
        return response;
    }

    match ws {
        Ok(ws) => ws.on_upgrade(move |socket| handle_watch(socket, state, key)),
        Err(rejection) => rejection.into_response(),
    }
}

/// Current stored document as a snapshot message.
async fn current_snapshot(state: &AppState, key: &str) -> Option<WatchMessage> {
    let loaded = state.storage.read().await.load(key);
    snapshot_of(loaded, key)
}

fn snapshot_of(
    loaded: Result<Option<Map<String, Value>>, ServerStorageError>,
    key: &str,
) -> Option<WatchMessage> {
    match loaded {
        Ok(document) => Some(WatchMessage::snapshot(document.map(Value::Object))),
        Err(e) => {
            tracing::error!("Failed to load document {} for watcher: {}", key, e);
            None
        }
    }
}

async fn send(
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    message: &WatchMessage,
) -> bool {
    let text = match message.encode() {
        Ok(text) => text,
        Err(e) => {
            tracing::error!("Failed to encode watch message: {}", e);
            return false;
        }
    };
    sender.send(Message::Text(text.into())).await.is_ok()
}

async fn handle_watch(socket: WebSocket, state: AppState, key: String) {
    tracing::info!("Watch connected for {}", key);

    // Subscribe while holding the read lock so no write slips in between
    // the initial snapshot and the first broadcast.
    let (mut updates, initial) = {
        let storage = state.storage.read().await;
        let updates = state.hub.subscribe(&key).await;
        (updates, snapshot_of(storage.load(&key), &key))
    };

    let (mut sender, mut receiver) = socket.split();

    let Some(initial) = initial else {
        let _ = sender.send(Message::Close(None)).await;
        return;
    };
    if !send(&mut sender, &initial).await {
        return;
    }

    loop {
        tokio::select! {
            update = updates.recv() => {
                let message = match update {
                    Ok(message) => Some(message),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!("Watcher for {} lagged by {} message(s)", key, skipped);
                        current_snapshot(&state, &key).await
                    }
                    Err(RecvError::Closed) => break,
                };
                match message {
                    Some(message) => {
                        if !send(&mut sender, &message).await {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            }
        }
    }

    tracing::info!("Watch disconnected for {}", key);
}
