use crate::message::{Event, EventBody, Message, OutputCategory, Request};

use super::{Action, Interceptor};

/// `spec.md` §4.4 item 5 and §6 ("exit-code visibility... the core does not
/// translate the number, only the surrounding text"). lldb-dap's own exit
/// notice trails a parenthetical hex restatement of the status
/// (`"...status = 0 (0x00000000) "`); the reference adapter's text drops
/// that and ends with a single newline. This only touches the wording —
/// the numeric code itself passes through unchanged.
pub struct ExitStatusReformatter;

impl Interceptor for ExitStatusReformatter {
    fn on_request(&self, _request: &Request) -> Action {
        Action::Forward
    }

    fn on_backend_message(&self, message: Message) -> Vec<Message> {
        let Message::Event(event) = message else {
            return vec![message];
        };
        let EventBody::Output(body) = &event.body else {
            return vec![Message::Event(event)];
        };
        if body.category != OutputCategory::Console {
            return vec![Message::Event(event)];
        }

        match reformat(&body.output) {
            Some(reformatted) => {
                let mut new_body = body.clone();
                new_body.output = reformatted;
                vec![Message::Event(Event::new(
                    event.seq,
                    EventBody::Output(new_body),
                ))]
            }
            None => vec![Message::Event(event)],
        }
    }
}

fn reformat(text: &str) -> Option<String> {
    let rest = text.strip_prefix("Process ")?;
    let space = rest.find(' ')?;
    let (pid, rest) = rest.split_at(space);
    pid.parse::<u64>().ok()?;
    let rest = rest.trim_start().strip_prefix("exited with status = ")?;
    let code_end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '-'))
        .unwrap_or(rest.len());
    let code = &rest[..code_end];
    if code.is_empty() {
        return None;
    }
    Some(format!("Process {pid} exited with status = {code}\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn output_event(text: &str) -> Message {
        Message::from_value(json!({
            "seq": 1, "type": "event", "event": "output",
            "body": {"category": "console", "output": text}
        }))
        .unwrap()
    }

    #[test]
    fn strips_hex_restatement() {
        let out = ExitStatusReformatter
            .on_backend_message(output_event("Process 4242 exited with status = 0 (0x00000000) \n"));
        match &out[0] {
            Message::Event(event) => match &event.body {
                EventBody::Output(body) => {
                    assert_eq!(body.output, "Process 4242 exited with status = 0\n")
                }
                other => panic!("expected Output, got {other:?}"),
            },
            other => panic!("expected Event, got {other:?}"),
        }
    }

    #[test]
    fn leaves_unrelated_console_output_untouched() {
        let out = ExitStatusReformatter.on_backend_message(output_event("hello\n"));
        match &out[0] {
            Message::Event(event) => match &event.body {
                EventBody::Output(body) => assert_eq!(body.output, "hello\n"),
                other => panic!("expected Output, got {other:?}"),
            },
            other => panic!("expected Event, got {other:?}"),
        }
    }
}
