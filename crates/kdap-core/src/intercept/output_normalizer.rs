use std::sync::atomic::{AtomicBool, Ordering};

use crate::message::{Event, EventBody, Message, OutputCategory, Request};

use super::{Action, Interceptor};

/// `spec.md` §4.4 item 4: once the debuggee has been resumed (a `continued`
/// event observed), lldb-dap's debuggee output arrives tagged `console` the
/// same way its own command-echo output does. CodeLLDB reclassifies it as
/// `stdout` so the client can tell debuggee output from adapter chatter —
/// except the exit-status line, which stays `console` in both adapters.
pub struct OutputCategoryNormalizer {
    continued_observed: AtomicBool,
}

impl OutputCategoryNormalizer {
    pub fn new() -> Self {
        OutputCategoryNormalizer {
            continued_observed: AtomicBool::new(false),
        }
    }
}

impl Default for OutputCategoryNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Interceptor for OutputCategoryNormalizer {
    fn on_request(&self, _request: &Request) -> Action {
        Action::Forward
    }

    fn on_backend_message(&self, message: Message) -> Vec<Message> {
        if let Message::Event(event) = &message {
            if matches!(event.body, EventBody::Continued(_)) {
                self.continued_observed.store(true, Ordering::SeqCst);
            }
        }

        if !self.continued_observed.load(Ordering::SeqCst) {
            return vec![message];
        }

        let Message::Event(event) = message else {
            return vec![message];
        };

        let EventBody::Output(body) = &event.body else {
            return vec![Message::Event(event)];
        };

        if body.category != OutputCategory::Console || is_exit_status_line(&body.output) {
            return vec![Message::Event(event)];
        }

        let mut reclassified = body.clone();
        reclassified.category = OutputCategory::Stdout;
        vec![Message::Event(Event::new(
            event.seq,
            EventBody::Output(reclassified),
        ))]
    }
}

/// Matches `"Process <pid> exited with status = ..."`, lldb-dap's process
/// auto-exit notice, without pulling in a regex dependency for one pattern.
fn is_exit_status_line(text: &str) -> bool {
    let Some(rest) = text.strip_prefix("Process ") else {
        return false;
    };
    let Some(space) = rest.find(' ') else {
        return false;
    };
    let (pid, rest) = rest.split_at(space);
    if pid.parse::<u64>().is_err() {
        return false;
    }
    rest.trim_start().starts_with("exited with status = ")
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

    fn continued_event() -> Message {
        Message::from_value(json!({
            "seq": 1, "type": "event", "event": "continued",
            "body": {"threadId": 0, "allThreadsContinued": true}
        }))
        .unwrap()
    }

    #[test]
    fn leaves_console_output_alone_before_continued() {
        let normalizer = OutputCategoryNormalizer::new();
        let out = normalizer.on_backend_message(output_event(2, "console", "hi\n"));
        match &out[0] {
            Message::Event(event) => match &event.body {
                EventBody::Output(body) => assert_eq!(body.category, OutputCategory::Console),
                other => panic!("expected Output, got {other:?}"),
            },
            other => panic!("expected Event, got {other:?}"),
        }
    }

    #[test]
    fn reclassifies_console_output_after_continued() {
        let normalizer = OutputCategoryNormalizer::new();
        normalizer.on_backend_message(continued_event());
        let out = normalizer.on_backend_message(output_event(3, "console", "stdout text\n"));
        match &out[0] {
            Message::Event(event) => match &event.body {
                EventBody::Output(body) => assert_eq!(body.category, OutputCategory::Stdout),
                other => panic!("expected Output, got {other:?}"),
            },
            other => panic!("expected Event, got {other:?}"),
        }
    }

    #[test]
    fn keeps_exit_status_line_as_console() {
        let normalizer = OutputCategoryNormalizer::new();
        normalizer.on_backend_message(continued_event());
        let out = normalizer.on_backend_message(output_event(
            4,
            "console",
            "Process 4242 exited with status = 0 (0x00000000) \n",
        ));
        match &out[0] {
            Message::Event(event) => match &event.body {
                EventBody::Output(body) => assert_eq!(body.category, OutputCategory::Console),
                other => panic!("expected Output, got {other:?}"),
            },
            other => panic!("expected Event, got {other:?}"),
        }
    }
}
