//! Newline-delimited JSON request/response shapes for the control channel.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "verb", rename_all = "lowercase")]
pub enum ControlRequest {
    Status,
    Info,
    Attach { session_id: Option<String> },
    Reattach { session_id: Option<String> },
    Detach,
    Stop,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ControlResponse {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            ok: true,
            error: None,
            data: Some(data),
        }
    }

    pub fn ok_empty() -> Self {
        Self {
            ok: true,
            error: None,
            data: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(message.into()),
            data: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attach_request_parses_optional_session_id() {
        let req: ControlRequest = serde_json::from_str(r#"{"verb":"attach","session_id":"a"}"#).unwrap();
        assert!(matches!(req, ControlRequest::Attach { session_id: Some(id) } if id == "a"));
    }

    #[test]
    fn stop_request_has_no_fields() {
        let req: ControlRequest = serde_json::from_str(r#"{"verb":"stop"}"#).unwrap();
        assert!(matches!(req, ControlRequest::Stop));
    }

    #[test]
    fn error_response_omits_data() {
        let resp = ControlResponse::err("bad");
        let json = serde_json::to_string(&resp).unwrap();
        assert_eq!(json, r#"{"ok":false,"error":"bad"}"#);
    }
}
