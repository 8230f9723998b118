use serde::{Deserialize, Serialize};

// ── Remote connection service request/response types ───────────────────────

/// POST /session request body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub connection_name: String,
    /// Profile the connection answers messages with (named "system prompt" on the wire)
    #[serde(rename = "systemPromptName")]
    pub profile_id: String,
}

/// GET /session/{name}/status response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

/// GET /session/{name}/qr response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PairingCodeResponse {
    #[serde(default)]
    pub qr: Option<String>,
}

/// GET /connections response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionsResponse {
    #[serde(default)]
    pub connections: Vec<ConnectionSummary>,
}

/// One of the user's stored connections, as listed by the remote service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSummary {
    pub connection_name: String,
    #[serde(default, rename = "systemPromptName")]
    pub profile_id: Option<String>,
    #[serde(default)]
    pub last_known_status: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub last_connected_at: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// GET {profiles_url}/prompts entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSummary {
    #[serde(default, rename = "_id", alias = "id")]
    pub id: Option<String>,
    pub name: String,
}

impl ProfileSummary {
    /// Identifier to pass to `connect`; falls back to the name when the
    /// service does not expose an id.
    pub fn connect_id(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.name)
    }
}

/// Extract the human-readable error text from a non-2xx response body.
///
/// Accepts `{"error": "text"}`, `{"error": {"message": "text"}}` and
/// `{"message": "text"}`.
pub fn error_message_from_body(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let text = match value.get("error") {
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        Some(obj @ serde_json::Value::Object(_)) => obj
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string),
        _ => value
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string),
    }?;
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_request_uses_wire_field_names() {
        let req = CreateSessionRequest {
            connection_name: "MainOffice".into(),
            profile_id: "support-bot".into(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["connectionName"], "MainOffice");
        assert_eq!(json["systemPromptName"], "support-bot");
    }

    #[test]
    fn pairing_code_response_tolerates_missing_qr() {
        let resp: PairingCodeResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.qr.is_none());
        let resp: PairingCodeResponse = serde_json::from_str(r#"{"qr":null}"#).unwrap();
        assert!(resp.qr.is_none());
    }

    #[test]
    fn connections_response_parses_partial_records() {
        let json = r#"{"connections":[
            {"connectionName":"MainOffice","systemPromptName":"support","lastKnownStatus":"connected","phoneNumber":"+420111"},
            {"connectionName":"Backup"}
        ]}"#;
        let resp: ConnectionsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.connections.len(), 2);
        assert_eq!(resp.connections[0].profile_id.as_deref(), Some("support"));
        assert_eq!(resp.connections[0].last_known_status.as_deref(), Some("connected"));
        assert!(resp.connections[1].phone_number.is_none());
    }

    #[test]
    fn profile_connect_id_prefers_id() {
        let with_id: ProfileSummary =
            serde_json::from_str(r#"{"_id":"abc123","name":"Support"}"#).unwrap();
        assert_eq!(with_id.connect_id(), "abc123");
        let plain_id: ProfileSummary =
            serde_json::from_str(r#"{"id":"p9","name":"Sales"}"#).unwrap();
        assert_eq!(plain_id.connect_id(), "p9");
        let name_only: ProfileSummary = serde_json::from_str(r#"{"name":"Sales"}"#).unwrap();
        assert_eq!(name_only.connect_id(), "Sales");
    }

    #[test]
    fn error_message_shapes() {
        assert_eq!(
            error_message_from_body(r#"{"error":"profile not found"}"#).as_deref(),
            Some("profile not found")
        );
        assert_eq!(
            error_message_from_body(r#"{"error":{"message":"quota exceeded"}}"#).as_deref(),
            Some("quota exceeded")
        );
        assert_eq!(
            error_message_from_body(r#"{"message":"bad request"}"#).as_deref(),
            Some("bad request")
        );
        assert_eq!(error_message_from_body(r#"{"error":"  "}"#), None);
        assert_eq!(error_message_from_body("<html>oops</html>"), None);
    }
}
