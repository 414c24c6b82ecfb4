use crate::message::{Message, Request, RequestBody};

use super::{Action, Interceptor};

/// `spec.md` §4.4 item 3: IDEs issue "command" evaluations (the user typed
/// into a debug-console prompt styled as a command, not an expression) with
/// `context: "_command"`. lldb-dap only understands the standard DAP
/// `"repl"` context, so this rewrites it in flight. Every other context
/// forwards unchanged.
pub struct EvaluateContextRewriter;

impl Interceptor for EvaluateContextRewriter {
    fn on_request(&self, request: &Request) -> Action {
        let RequestBody::Evaluate(args) = &request.body else {
            return Action::Forward;
        };
        if args.context.as_deref() != Some("_command") {
            return Action::Forward;
        }

        let mut rewritten = request.clone();
        let RequestBody::Evaluate(rewritten_args) = &mut rewritten.body else {
            unreachable!("matched Evaluate above");
        };
        rewritten_args.context = Some("repl".to_string());
        rewritten.raw = rewritten.to_json();
        Action::forward_modified(rewritten)
    }

    fn on_backend_message(&self, message: Message) -> Vec<Message> {
        vec![message]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(raw: serde_json::Value) -> Request {
        Request::from_envelope(raw).unwrap()
    }

    #[test]
    fn rewrites_command_context_to_repl() {
        let request = parse(json!({
            "seq": 5, "type": "request", "command": "evaluate",
            "arguments": {"expression": "version", "context": "_command"}
        }));
        match EvaluateContextRewriter.on_request(&request) {
            Action::ForwardModified(rewritten) => {
                assert_eq!(rewritten.raw["arguments"]["context"], "repl");
                assert_eq!(rewritten.raw["arguments"]["expression"], "version");
            }
            _ => panic!("expected ForwardModified"),
        }
    }

    #[test]
    fn leaves_other_contexts_untouched() {
        let request = parse(json!({
            "seq": 6, "type": "request", "command": "evaluate",
            "arguments": {"expression": "x + 1", "context": "watch"}
        }));
        assert!(EvaluateContextRewriter.on_request(&request).is_forward());
    }
}
