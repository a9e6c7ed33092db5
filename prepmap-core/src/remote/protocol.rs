//! JSON messages exchanged with the document server.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::PartialDocument;

/// Messages pushed over the watch WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WatchMessage {
    /// Current stored document, `null` if none exists yet.
    Snapshot { document: Option<Value> },
}

impl WatchMessage {
    pub fn snapshot(document: Option<Value>) -> Self {
        WatchMessage::Snapshot { document }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Decodes the carried document.
    pub fn into_document(self) -> Result<Option<PartialDocument>, serde_json::Error> {
        match self {
            WatchMessage::Snapshot { document: None } => Ok(None),
            WatchMessage::Snapshot {
                document: Some(value),
            } => serde_json::from_value(value).map(Some),
        }
    }
}

/// Response of `GET /me`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeResponse {
    pub user_id: String,
}

/// Response of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_snapshot_wire_format() {
        let msg = WatchMessage::snapshot(None);
        assert_eq!(msg.encode().unwrap(), r#"{"type":"snapshot","document":null}"#);
    }

    #[test]
    fn test_decode_snapshot_with_document() {
        let text = json!({
            "type": "snapshot",
            "document": {"subjects": [{"id": "s1", "name": "Math"}], "theme": "dark"}
        })
        .to_string();

        let doc = WatchMessage::decode(&text)
            .unwrap()
            .into_document()
            .unwrap()
            .unwrap();
        assert!(doc.columns.is_none());
        assert_eq!(doc.subjects.unwrap()[0].name, "Math");
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        assert!(WatchMessage::decode(r#"{"type":"hello"}"#).is_err());
    }

    #[test]
    fn test_bad_document_fails_to_decode() {
        let msg = WatchMessage::snapshot(Some(json!({"subjects": 3})));
        assert!(msg.into_document().is_err());
    }
}
