use serde::Deserialize;
use serde_json::Value;

/// A response to a request, correlated by `request_seq == request.seq`
/// (`spec.md` §3).
#[derive(Clone, Debug)]
pub struct Response {
    pub seq: i64,
    pub request_seq: i64,
    pub command: String,
    pub success: bool,
    pub message: Option<String>,
    pub body: Option<Value>,
    pub raw: Value,
}

impl Response {
    pub fn from_envelope(raw: Value) -> Result<Self, serde_json::Error> {
        #[derive(Deserialize)]
        struct Envelope {
            seq: i64,
            request_seq: i64,
            command: String,
            success: bool,
            #[serde(default)]
            message: Option<String>,
            #[serde(default)]
            body: Option<Value>,
        }

        let envelope: Envelope = serde_json::from_value(raw.clone())?;
        Ok(Response {
            seq: envelope.seq,
            request_seq: envelope.request_seq,
            command: envelope.command,
            success: envelope.success,
            message: envelope.message,
            body: envelope.body,
            raw,
        })
    }

    pub fn success(seq: i64, request_seq: i64, command: impl Into<String>) -> Self {
        let command = command.into();
        let raw = serde_json::json!({
            "seq": seq,
            "type": "response",
            "request_seq": request_seq,
            "command": command,
            "success": true,
        });
        Response {
            seq,
            request_seq,
            command,
            success: true,
            message: None,
            body: None,
            raw,
        }
    }

    pub fn failure(
        seq: i64,
        request_seq: i64,
        command: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let command = command.into();
        let message = message.into();
        let raw = serde_json::json!({
            "seq": seq,
            "type": "response",
            "request_seq": request_seq,
            "command": command,
            "success": false,
            "message": message,
        });
        Response {
            seq,
            request_seq,
            command,
            success: false,
            message: Some(message),
            body: None,
            raw,
        }
    }

    pub fn to_json(&self) -> Value {
        let mut obj = serde_json::Map::new();
        obj.insert("seq".to_string(), Value::from(self.seq));
        obj.insert("type".to_string(), Value::from("response"));
        obj.insert("request_seq".to_string(), Value::from(self.request_seq));
        obj.insert("command".to_string(), Value::from(self.command.clone()));
        obj.insert("success".to_string(), Value::from(self.success));
        if let Some(message) = &self.message {
            obj.insert("message".to_string(), Value::from(message.clone()));
        }
        if let Some(body) = &self.body {
            obj.insert("body".to_string(), body.clone());
        }
        Value::Object(obj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_is_identity_round_trip() {
        let raw = json!({
            "seq": 2, "type": "response", "request_seq": 1,
            "command": "initialize", "success": true,
            "body": {"capabilities": {"supportsConfigurationDoneRequest": true}}
        });
        let response = Response::from_envelope(raw.clone()).unwrap();
        assert_eq!(response.raw, raw);
        assert_eq!(response.request_seq, 1);
    }

    #[test]
    fn failure_constructor_sets_message_and_no_body() {
        let response = Response::failure(10, 4, "launch", "boom");
        assert!(!response.success);
        assert_eq!(response.message.as_deref(), Some("boom"));
        assert!(response.body.is_none());
    }
}
