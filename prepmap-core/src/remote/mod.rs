//! Client side of the PrepMap document server.
//!
//! ## Protocol
//!
//! 1. `GET /me` with `Authorization: Bearer <key>` resolves the user id
//! 2. `GET`/`PUT /documents/{user_id}` read and write the document
//! 3. `/documents/{user_id}/watch?key=<key>` is a WebSocket that pushes a
//!    JSON `snapshot` message on connect and after every change

mod client;
mod protocol;
mod session;
mod store;

pub use client::{check_server, RemoteClient};
pub use protocol::{HealthResponse, MeResponse, WatchMessage};
pub use session::RemoteSessionProvider;
pub use store::HttpDataStore;
