//! The DAP message model (`spec.md` §3, §4.1): a tagged sum type over
//! requests, responses, and events, with typed refinement for the commands
//! the core inspects and tolerant passthrough for everything else.

mod common;
mod event;
mod request;
mod response;

pub use common::{CommonArguments, OutputCategory, RawTerminalField, TerminalKind};
pub use event::{
    ContinuedEventBody, Event, EventBody, ExitedEventBody, OutputEventBody, ProcessEventBody,
    StoppedEventBody,
};
pub use request::{
    AttachArguments, DisconnectArguments, EvaluateArguments, InitializeArguments, LaunchArguments,
    Request, RequestBody, TerminateArguments,
};
pub use response::Response;

use serde_json::Value;

use crate::error::KdapError;

/// One parsed DAP message. `spec.md` §3 requires every message to carry a
/// `seq` and forwarded messages to preserve their original raw JSON
/// byte-for-byte unless an interceptor replaced them; both invariants are
/// upheld by the `raw` field each variant's inner struct carries.
#[derive(Clone, Debug)]
pub enum Message {
    Request(Request),
    Response(Response),
    Event(Event),
}

impl Message {
    /// Parses one JSON body (already extracted from its framing header) into
    /// a typed [`Message`]. Malformed JSON or a missing `type` field is a
    /// [`KdapError::Protocol`] — fatal per `spec.md` §4.1 and §7. A known
    /// command/event whose arguments fail to parse does *not* error here:
    /// [`RequestBody::Unknown`] / [`EventBody::Unknown`] absorb it so the
    /// message still forwards (tolerant parsing).
    pub fn parse(bytes: &[u8]) -> Result<Self, KdapError> {
        let raw: Value = serde_json::from_slice(bytes)
            .map_err(|source| KdapError::protocol("message body", source))?;
        Self::from_value(raw)
    }

    pub fn from_value(raw: Value) -> Result<Self, KdapError> {
        let type_field = raw
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                KdapError::protocol(
                    "message envelope",
                    <serde_json::Error as serde::de::Error>::custom("missing `type` field"),
                )
            })?
            .to_string();

        match type_field.as_str() {
            "request" => Request::from_envelope(raw)
                .map(Message::Request)
                .map_err(|source| KdapError::protocol("request envelope", source)),
            "response" => Response::from_envelope(raw)
                .map(Message::Response)
                .map_err(|source| KdapError::protocol("response envelope", source)),
            "event" => Event::from_envelope(raw)
                .map(Message::Event)
                .map_err(|source| KdapError::protocol("event envelope", source)),
            other => Err(KdapError::protocol(
                "message envelope",
                <serde_json::Error as serde::de::Error>::custom(format!(
                    "unknown message type `{other}`"
                )),
            )),
        }
    }

    pub fn seq(&self) -> i64 {
        match self {
            Message::Request(r) => r.seq,
            Message::Response(r) => r.seq,
            Message::Event(e) => e.seq,
        }
    }

    /// The raw JSON this message was parsed from, or last re-serialized to.
    /// Forwarding prefers this over [`Message::to_json`] for wire fidelity.
    pub fn raw(&self) -> &Value {
        match self {
            Message::Request(r) => &r.raw,
            Message::Response(r) => &r.raw,
            Message::Event(e) => &e.raw,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Message::Request(r) => r.to_json(),
            Message::Response(r) => r.to_json(),
            Message::Event(e) => e.to_json(),
        }
    }
}

/// Monotonic seq allocators partitioning the seq space (`spec.md` §3):
/// reverse-request seqs start at 1,000,000, backend-originated (adapter
/// self-issued) seqs start at 2,000,000, both well above any realistic
/// client-issued seq.
#[derive(Debug)]
pub struct SeqAllocator {
    next: std::sync::atomic::AtomicI64,
}

impl SeqAllocator {
    pub const REVERSE_REQUEST_FLOOR: i64 = 1_000_000;
    pub const BACKEND_REQUEST_FLOOR: i64 = 2_000_000;

    pub fn starting_at(floor: i64) -> Self {
        SeqAllocator {
            next: std::sync::atomic::AtomicI64::new(floor),
        }
    }

    pub fn reverse_requests() -> Self {
        Self::starting_at(Self::REVERSE_REQUEST_FLOOR)
    }

    pub fn backend_requests() -> Self {
        Self::starting_at(Self::BACKEND_REQUEST_FLOOR)
    }

    pub fn next(&self) -> i64 {
        self.next.fetch_add(1, std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_rejects_missing_type() {
        let err = Message::parse(br#"{"seq": 1}"#).unwrap_err();
        assert!(matches!(err, KdapError::Protocol { .. }));
    }

    #[test]
    fn parse_rejects_malformed_json() {
        let err = Message::parse(b"not json").unwrap_err();
        assert!(matches!(err, KdapError::Protocol { .. }));
    }

    #[test]
    fn forwarded_message_preserves_raw_bytes() {
        let raw = json!({"seq": 1, "type": "request", "command": "initialize", "arguments": {"clientID": "x"}});
        let message = Message::from_value(raw.clone()).unwrap();
        assert_eq!(message.raw(), &raw);
    }

    #[test]
    fn seq_allocators_partition_the_seq_space() {
        let reverse = SeqAllocator::reverse_requests();
        let backend = SeqAllocator::backend_requests();
        assert_eq!(reverse.next(), SeqAllocator::REVERSE_REQUEST_FLOOR);
        assert_eq!(reverse.next(), SeqAllocator::REVERSE_REQUEST_FLOOR + 1);
        assert_eq!(backend.next(), SeqAllocator::BACKEND_REQUEST_FLOOR);
    }
}
