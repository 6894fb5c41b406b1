//! Wire types: one JSON object per text frame, no batching.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize)]
pub(crate) struct OutboundCall<'a> {
    pub id: u64,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<&'a Value>,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<&'a str>,
}

/// Any inbound frame. A present `id` marks a command response; a present
/// `method` without an `id` marks a notification.
#[derive(Debug, Deserialize)]
pub(crate) struct InboundFrame {
    pub id: Option<u64>,
    pub method: Option<String>,
    pub params: Option<Value>,
    pub result: Option<Value>,
    pub error: Option<RemoteError>,
    #[serde(rename = "sessionId")]
    #[allow(dead_code)]
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RemoteError {
    pub message: String,
    pub code: Option<i64>,
}

impl RemoteError {
    pub(crate) fn into_message(self) -> String {
        match self.code {
            Some(code) => format!("{} (code {})", self.message, code),
            None => self.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outbound_omits_absent_fields() {
        let frame = OutboundCall {
            id: 7,
            method: "Page.enable",
            params: None,
            session_id: None,
        };
        let text = serde_json::to_string(&frame).unwrap();
        assert_eq!(text, r#"{"id":7,"method":"Page.enable"}"#);
    }

    #[test]
    fn test_outbound_carries_session_tag_opaquely() {
        let params = json!({"url": "https://example.com"});
        let frame = OutboundCall {
            id: 2,
            method: "Page.navigate",
            params: Some(&params),
            session_id: Some("SESSION-XYZ"),
        };
        let value: Value = serde_json::from_str(&serde_json::to_string(&frame).unwrap()).unwrap();
        assert_eq!(value["sessionId"], "SESSION-XYZ");
        assert_eq!(value["params"]["url"], "https://example.com");
    }

    #[test]
    fn test_inbound_response_and_notification_discrimination() {
        let response: InboundFrame =
            serde_json::from_str(r#"{"id":3,"result":{"ok":true}}"#).unwrap();
        assert_eq!(response.id, Some(3));
        assert!(response.method.is_none());

        let event: InboundFrame =
            serde_json::from_str(r#"{"method":"Page.loadEventFired","params":{"timestamp":1.0}}"#)
                .unwrap();
        assert!(event.id.is_none());
        assert_eq!(event.method.as_deref(), Some("Page.loadEventFired"));
    }

    #[test]
    fn test_remote_error_message_includes_code() {
        let err: RemoteError =
            serde_json::from_str(r#"{"message":"No such method","code":-32601}"#).unwrap();
        assert_eq!(err.into_message(), "No such method (code -32601)");
    }
}
