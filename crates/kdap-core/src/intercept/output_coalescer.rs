use std::sync::Mutex;

use crate::message::{Event, EventBody, Message, OutputCategory, OutputEventBody, Request};

use super::{Action, Interceptor};

type PendingBuffer = (OutputCategory, String, i64);

/// `spec.md` §4.4 item 6: consecutive non-console `output` events of the
/// same category are concatenated into one event. A different category, a
/// `console`-category output, or any non-output message flushes the buffer
/// first (emitted ahead of the triggering message, per the spec's ordering
/// note). `console` output is never itself coalesced.
pub struct OutputCoalescer {
    pending: Mutex<Option<PendingBuffer>>,
}

impl OutputCoalescer {
    pub fn new() -> Self {
        OutputCoalescer {
            pending: Mutex::new(None),
        }
    }

    fn flush(pending: &mut Option<PendingBuffer>) -> Option<Message> {
        pending.take().map(|(category, text, seq)| {
            Message::Event(Event::new(seq, EventBody::Output(OutputEventBody::new(category, text))))
        })
    }
}

impl Default for OutputCoalescer {
    fn default() -> Self {
        Self::new()
    }
}

impl Interceptor for OutputCoalescer {
    fn on_request(&self, _request: &Request) -> Action {
        Action::Forward
    }

    fn on_backend_message(&self, message: Message) -> Vec<Message> {
        let Message::Event(event) = &message else {
            let mut guard = self.pending.lock().unwrap();
            let mut out: Vec<Message> = Self::flush(&mut guard).into_iter().collect();
            out.push(message);
            return out;
        };
        let EventBody::Output(body) = &event.body else {
            let mut guard = self.pending.lock().unwrap();
            let mut out: Vec<Message> = Self::flush(&mut guard).into_iter().collect();
            out.push(message);
            return out;
        };
        if body.category == OutputCategory::Console {
            let mut guard = self.pending.lock().unwrap();
            let mut out: Vec<Message> = Self::flush(&mut guard).into_iter().collect();
            out.push(message);
            return out;
        }

        let seq = event.seq;
        let category = body.category.clone();
        let text = body.output.clone();
        let mut guard = self.pending.lock().unwrap();
        match guard.take() {
            Some((previous_category, mut previous_text, previous_seq)) if previous_category == category => {
                previous_text.push_str(&text);
                *guard = Some((previous_category, previous_text, previous_seq));
                vec![]
            }
            Some((previous_category, previous_text, previous_seq)) => {
                *guard = Some((category, text, seq));
                vec![Message::Event(Event::new(
                    previous_seq,
                    EventBody::Output(OutputEventBody::new(previous_category, previous_text)),
                ))]
            }
            None => {
                *guard = Some((category, text, seq));
                vec![]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn output_event(seq: i64, category: &str, text: &str) -> Message {
        Message::from_value(json!({
            "seq": seq, "type": "event", "event": "output",
            "body": {"category": category, "output": text}
        }))
        .unwrap()
    }

    #[test]
    fn coalesces_consecutive_same_category_output() {
        let coalescer = OutputCoalescer::new();
        assert!(coalescer.on_backend_message(output_event(1, "stdout", "a")).is_empty());
        assert!(coalescer.on_backend_message(output_event(2, "stdout", "b")).is_empty());
        let flushed = coalescer.on_backend_message(output_event(3, "stderr", "c"));
        match &flushed[0] {
            Message::Event(event) => match &event.body {
                EventBody::Output(body) => assert_eq!(body.output, "ab"),
                other => panic!("expected Output, got {other:?}"),
            },
            other => panic!("expected Event, got {other:?}"),
        }
    }

    #[test]
    fn console_output_flushes_and_passes_through_unbuffered() {
        let coalescer = OutputCoalescer::new();
        assert!(coalescer.on_backend_message(output_event(1, "stdout", "a")).is_empty());
        let out = coalescer.on_backend_message(output_event(2, "console", "note\n"));
        assert_eq!(out.len(), 2);
        match &out[0] {
            Message::Event(event) => match &event.body {
                EventBody::Output(body) => assert_eq!(body.output, "a"),
                other => panic!("expected Output, got {other:?}"),
            },
            other => panic!("expected Event, got {other:?}"),
        }
        match &out[1] {
            Message::Event(event) => match &event.body {
                EventBody::Output(body) => assert_eq!(body.category, OutputCategory::Console),
                other => panic!("expected Output, got {other:?}"),
            },
            other => panic!("expected Event, got {other:?}"),
        }
    }
}
