use std::sync::Arc;

use crate::message::{Message, Request};
use crate::session::DebugSession;

use super::{Action, Interceptor};

/// Routes `launch`/`attach`/`disconnect`/`terminate` to the debug-session
/// orchestrator (`spec.md` §4.4 item 2). Every other command forwards
/// unchanged — lldb-dap implements the rest of DAP natively.
pub struct LifecycleDispatcher {
    session: Arc<DebugSession>,
}

impl LifecycleDispatcher {
    pub fn new(session: Arc<DebugSession>) -> Self {
        LifecycleDispatcher { session }
    }
}

impl Interceptor for LifecycleDispatcher {
    fn on_request(&self, request: &Request) -> Action {
        let session = self.session.clone();
        match request.command.as_str() {
            "launch" => Action::handle_async(move |request, ctx| async move {
                session.handle_launch(request, ctx).await;
            }),
            "attach" => Action::handle_async(move |request, ctx| async move {
                session.handle_attach(request, ctx).await;
            }),
            "disconnect" => Action::handle_async(move |request, ctx| async move {
                session.handle_disconnect(request, ctx).await;
            }),
            "terminate" => Action::handle_async(move |request, ctx| async move {
                session.handle_terminate(request, ctx).await;
            }),
            _ => Action::Forward,
        }
    }

    fn on_backend_message(&self, message: Message) -> Vec<Message> {
        vec![message]
    }
}
