use serde::Deserialize;
use serde_json::Value;

use super::common::OutputCategory;

/// An adapter-originated event (`spec.md` §3).
#[derive(Clone, Debug)]
pub struct Event {
    pub seq: i64,
    pub event: String,
    pub body: EventBody,
    pub raw: Value,
}

impl Event {
    pub fn from_envelope(raw: Value) -> Result<Self, serde_json::Error> {
        #[derive(Deserialize)]
        struct Envelope {
            seq: i64,
            event: String,
            #[serde(default)]
            body: Option<Value>,
        }

        let envelope: Envelope = serde_json::from_value(raw.clone())?;
        let body = EventBody::parse(&envelope.event, envelope.body.as_ref());

        Ok(Event {
            seq: envelope.seq,
            event: envelope.event,
            body,
            raw,
        })
    }

    pub fn new(seq: i64, body: EventBody) -> Self {
        let event = body.event_name().to_string();
        let mut event_value = Event {
            seq,
            event: event.clone(),
            body,
            raw: Value::Null,
        };
        event_value.raw = event_value.to_json();
        event_value
    }

    pub fn to_json(&self) -> Value {
        let mut obj = serde_json::Map::new();
        obj.insert("seq".to_string(), Value::from(self.seq));
        obj.insert("type".to_string(), Value::from("event"));
        obj.insert("event".to_string(), Value::from(self.event.clone()));
        if let Some(body) = self.body.to_body_value() {
            obj.insert("body".to_string(), body);
        }
        Value::Object(obj)
    }
}

#[derive(Clone, Debug)]
pub enum EventBody {
    Initialized,
    Process(ProcessEventBody),
    Output(OutputEventBody),
    Continued(ContinuedEventBody),
    Exited(ExitedEventBody),
    Terminated,
    Stopped(StoppedEventBody),
    Capabilities(Value),
    Unknown(Option<Value>),
}

impl EventBody {
    fn parse(event: &str, body: Option<&Value>) -> Self {
        match event {
            "initialized" => return EventBody::Initialized,
            "terminated" => return EventBody::Terminated,
            _ => {}
        }

        let Some(value) = body else {
            return EventBody::Unknown(None);
        };

        match event {
            "process" => serde_json::from_value(value.clone())
                .ok()
                .map(EventBody::Process),
            "output" => serde_json::from_value(value.clone())
                .ok()
                .map(EventBody::Output),
            "continued" => serde_json::from_value(value.clone())
                .ok()
                .map(EventBody::Continued),
            "exited" => serde_json::from_value(value.clone())
                .ok()
                .map(EventBody::Exited),
            "stopped" => serde_json::from_value(value.clone())
                .ok()
                .map(EventBody::Stopped),
            "capabilities" => Some(EventBody::Capabilities(value.clone())),
            _ => None,
        }
        .unwrap_or_else(|| EventBody::Unknown(Some(value.clone())))
    }

    fn event_name(&self) -> &'static str {
        match self {
            EventBody::Initialized => "initialized",
            EventBody::Process(_) => "process",
            EventBody::Output(_) => "output",
            EventBody::Continued(_) => "continued",
            EventBody::Exited(_) => "exited",
            EventBody::Terminated => "terminated",
            EventBody::Stopped(_) => "stopped",
            EventBody::Capabilities(_) => "capabilities",
            EventBody::Unknown(_) => "unknown",
        }
    }

    fn to_body_value(&self) -> Option<Value> {
        match self {
            EventBody::Initialized | EventBody::Terminated => None,
            EventBody::Process(body) => serde_json::to_value(body).ok(),
            EventBody::Output(body) => serde_json::to_value(body).ok(),
            EventBody::Continued(body) => serde_json::to_value(body).ok(),
            EventBody::Exited(body) => serde_json::to_value(body).ok(),
            EventBody::Stopped(body) => serde_json::to_value(body).ok(),
            EventBody::Capabilities(value) => Some(value.clone()),
            EventBody::Unknown(value) => value.clone(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessEventBody {
    pub name: String,
    #[serde(default)]
    pub system_process_id: Option<i64>,
    #[serde(default)]
    pub is_local_process: Option<bool>,
    #[serde(default)]
    pub start_method: Option<String>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, Deserialize)]
pub struct OutputEventBody {
    #[serde(default = "default_console_category")]
    pub category: OutputCategory,
    pub output: String,
}

fn default_console_category() -> OutputCategory {
    OutputCategory::Console
}

impl OutputEventBody {
    pub fn new(category: OutputCategory, output: impl Into<String>) -> Self {
        OutputEventBody {
            category,
            output: output.into(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinuedEventBody {
    pub thread_id: i64,
    #[serde(default)]
    pub all_threads_continued: Option<bool>,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitedEventBody {
    pub exit_code: i64,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoppedEventBody {
    pub reason: String,
    #[serde(default)]
    pub thread_id: Option<i64>,
    #[serde(default)]
    pub all_threads_stopped: Option<bool>,
    #[serde(default)]
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn output_event_parses_console_category() {
        let raw = json!({
            "seq": 3, "type": "event", "event": "output",
            "body": {"category": "console", "output": "hello\n"}
        });
        let event = Event::from_envelope(raw).unwrap();
        match event.body {
            EventBody::Output(body) => {
                assert_eq!(body.category, OutputCategory::Console);
                assert_eq!(body.output, "hello\n");
            }
            other => panic!("expected Output, got {other:?}"),
        }
    }

    #[test]
    fn constructed_event_round_trips_through_json() {
        let event = Event::new(
            1_000_005,
            EventBody::Output(OutputEventBody::new(OutputCategory::Console, "hi\n")),
        );
        let reparsed = Event::from_envelope(event.to_json()).unwrap();
        match reparsed.body {
            EventBody::Output(body) => assert_eq!(body.output, "hi\n"),
            other => panic!("expected Output, got {other:?}"),
        }
    }

    #[test]
    fn unknown_event_round_trips_raw_body() {
        let raw = json!({"seq": 8, "type": "event", "event": "module", "body": {"reason": "new"}});
        let event = Event::from_envelope(raw.clone()).unwrap();
        assert!(matches!(event.body, EventBody::Unknown(_)));
        assert_eq!(event.raw, raw);
    }
}
