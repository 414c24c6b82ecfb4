use std::sync::Arc;

use crate::message::{Message, Request, RequestBody};
use crate::session::DebugSession;

use super::{Action, Interceptor};

/// Captures client capabilities off the `initialize` request — notably
/// `supportsRunInTerminalRequest`, which `handle_launch` consults before
/// attempting the TTY handshake (`spec.md` §4.4 item 1).
pub struct InitializeObserver {
    session: Arc<DebugSession>,
}

impl InitializeObserver {
    pub fn new(session: Arc<DebugSession>) -> Self {
        InitializeObserver { session }
    }
}

impl Interceptor for InitializeObserver {
    fn on_request(&self, request: &Request) -> Action {
        if let RequestBody::Initialize(args) = &request.body {
            self.session
                .set_client_supports_run_in_terminal(args.supports_run_in_terminal_request);
        }
        Action::Forward
    }

    fn on_backend_message(&self, message: Message) -> Vec<Message> {
        vec![message]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn captures_run_in_terminal_support() {
        let session = Arc::new(DebugSession::new());
        let observer = InitializeObserver::new(session.clone());
        let raw = json!({
            "seq": 1, "type": "request", "command": "initialize",
            "arguments": {"clientID": "vscode", "supportsRunInTerminalRequest": true}
        });
        let request = Request::from_envelope(raw).unwrap();
        assert!(observer.on_request(&request).is_forward());
        assert!(session.client_supports_run_in_terminal());
    }
}
