use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::common::{CommonArguments, RawTerminalField, TerminalKind};

/// A client- or adapter-originated request. `raw` is the exact JSON this
/// request was parsed from (or last re-serialized to, if an interceptor
/// replaced it); forwarding always prefers `raw` over re-deriving JSON from
/// `body`, per the identity-passthrough invariant in `spec.md` §3.
#[derive(Clone, Debug)]
pub struct Request {
    pub seq: i64,
    pub command: String,
    pub body: RequestBody,
    pub raw: Value,
}

impl Request {
    /// Parses a `{"type":"request", ...}` envelope already known to be a
    /// request (the caller has checked `type`).
    pub fn from_envelope(raw: Value) -> Result<Self, serde_json::Error> {
        #[derive(Deserialize)]
        struct Envelope {
            seq: i64,
            command: String,
            #[serde(default)]
            arguments: Option<Value>,
        }

        let envelope: Envelope = serde_json::from_value(raw.clone())?;
        let body = RequestBody::parse(&envelope.command, envelope.arguments.as_ref());

        Ok(Request {
            seq: envelope.seq,
            command: envelope.command,
            body,
            raw,
        })
    }

    /// Re-derives the wire JSON from the typed body. Used only when an
    /// interceptor produced a modified request (`ForwardModified`); plain
    /// forwarding uses `raw` directly.
    pub fn to_json(&self) -> Value {
        let arguments = self.body.to_arguments_value();
        let mut obj = serde_json::Map::new();
        obj.insert("seq".to_string(), Value::from(self.seq));
        obj.insert("type".to_string(), Value::from("request"));
        obj.insert("command".to_string(), Value::from(self.command.clone()));
        if let Some(arguments) = arguments {
            obj.insert("arguments".to_string(), arguments);
        }
        Value::Object(obj)
    }
}

/// Refined request argument shapes the core inspects. Commands the core
/// only forwards stay [`RequestBody::Unknown`], carrying the original
/// arguments untouched for round-trip fidelity.
#[derive(Clone, Debug)]
pub enum RequestBody {
    Initialize(InitializeArguments),
    Launch(LaunchArguments),
    Attach(AttachArguments),
    Evaluate(EvaluateArguments),
    Disconnect(DisconnectArguments),
    Terminate(TerminateArguments),
    ConfigurationDone,
    Unknown(Option<Value>),
}

impl RequestBody {
    fn parse(command: &str, arguments: Option<&Value>) -> Self {
        let try_parse = |value: &Value| -> Option<Self> {
            match command {
                "initialize" => serde_json::from_value(value.clone())
                    .ok()
                    .map(RequestBody::Initialize),
                "launch" => serde_json::from_value(value.clone())
                    .ok()
                    .map(RequestBody::Launch),
                "attach" => serde_json::from_value(value.clone())
                    .ok()
                    .map(RequestBody::Attach),
                "evaluate" => serde_json::from_value(value.clone())
                    .ok()
                    .map(RequestBody::Evaluate),
                "disconnect" => serde_json::from_value(value.clone())
                    .ok()
                    .map(RequestBody::Disconnect),
                "terminate" => serde_json::from_value(value.clone())
                    .ok()
                    .map(RequestBody::Terminate),
                _ => None,
            }
        };

        if command == "configurationDone" {
            return RequestBody::ConfigurationDone;
        }

        match arguments {
            Some(value) => try_parse(value).unwrap_or_else(|| RequestBody::Unknown(Some(value.clone()))),
            None => {
                // Some refined commands (notably `disconnect`) are legal with
                // no arguments at all; fall back to defaults rather than Unknown.
                match command {
                    "disconnect" => RequestBody::Disconnect(DisconnectArguments::default()),
                    "terminate" => RequestBody::Terminate(TerminateArguments::default()),
                    _ => RequestBody::Unknown(None),
                }
            }
        }
    }

    fn to_arguments_value(&self) -> Option<Value> {
        match self {
            RequestBody::Initialize(args) => serde_json::to_value(args).ok(),
            RequestBody::Launch(args) => serde_json::to_value(args).ok(),
            RequestBody::Attach(args) => serde_json::to_value(args).ok(),
            RequestBody::Evaluate(args) => serde_json::to_value(args).ok(),
            RequestBody::Disconnect(args) => serde_json::to_value(args).ok(),
            RequestBody::Terminate(args) => serde_json::to_value(args).ok(),
            RequestBody::ConfigurationDone => None,
            RequestBody::Unknown(value) => value.clone(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeArguments {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub adapter_id: Option<String>,
    #[serde(default)]
    pub supports_run_in_terminal_request: bool,
    #[serde(flatten)]
    pub rest: serde_json::Map<String, Value>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchArguments {
    #[serde(flatten)]
    pub common: CommonArguments,
    #[serde(default)]
    pub terminal: Option<RawTerminalField>,
    #[serde(default)]
    pub stdio: Vec<Value>,
}

impl LaunchArguments {
    pub fn terminal_kind(&self) -> Option<TerminalKind> {
        self.terminal.clone().map(TerminalKind::from_raw)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachArguments {
    #[serde(flatten)]
    pub common: CommonArguments,
    #[serde(default)]
    pub pid: Option<i64>,
    #[serde(default)]
    pub wait_for: bool,
    #[serde(default)]
    pub ignore_existing: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateArguments {
    pub expression: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default, rename = "frameId")]
    pub frame_id: Option<i64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectArguments {
    #[serde(default)]
    pub terminate_debuggee: Option<bool>,
    #[serde(default)]
    pub restart: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminateArguments {
    #[serde(default)]
    pub restart: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_command_round_trips_raw_arguments() {
        let raw = json!({
            "seq": 7,
            "type": "request",
            "command": "setBreakpoints",
            "arguments": {"source": {"path": "/a.rs"}, "breakpoints": [{"line": 3}]}
        });
        let request = Request::from_envelope(raw.clone()).unwrap();
        assert!(matches!(request.body, RequestBody::Unknown(_)));
        assert_eq!(request.raw, raw);
    }

    #[test]
    fn evaluate_context_is_captured_for_rewriting() {
        let raw = json!({
            "seq": 5,
            "type": "request",
            "command": "evaluate",
            "arguments": {"expression": "version", "context": "_command"}
        });
        let request = Request::from_envelope(raw).unwrap();
        match request.body {
            RequestBody::Evaluate(args) => assert_eq!(args.context.as_deref(), Some("_command")),
            other => panic!("expected Evaluate, got {other:?}"),
        }
    }

    #[test]
    fn configuration_done_has_no_arguments() {
        let raw = json!({"seq": 9, "type": "request", "command": "configurationDone"});
        let request = Request::from_envelope(raw).unwrap();
        assert!(matches!(request.body, RequestBody::ConfigurationDone));
    }
}
