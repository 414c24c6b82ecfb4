//! The interception chain (`spec.md` §4.4): an ordered list of handlers
//! that rewrite, filter, or inject messages on both directions. Request
//! composition is first-non-Forward-wins; backend composition is flat-map.

mod evaluate_rewriter;
mod exit_status_reformatter;
mod initialize_observer;
mod lifecycle_dispatcher;
mod output_coalescer;
mod output_normalizer;

pub use evaluate_rewriter::EvaluateContextRewriter;
pub use exit_status_reformatter::ExitStatusReformatter;
pub use initialize_observer::InitializeObserver;
pub use lifecycle_dispatcher::LifecycleDispatcher;
pub use output_coalescer::OutputCoalescer;
pub use output_normalizer::OutputCategoryNormalizer;

use std::pin::Pin;

use crate::message::{Message, Request};
use crate::router::AsyncContext;

pub type BoxFuture<'a> = Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>>;

/// What an interceptor wants done with a client request. Exactly the four
/// alternatives `spec.md` §4.3/§4.4 name.
pub enum Action {
    /// Let later handlers see the request; if no handler changes the
    /// outcome, the client reader forwards the original raw JSON.
    Forward,
    /// Answer the client directly without involving the backend.
    Respond(Box<Message>),
    /// Forward a modified request instead of the original.
    ForwardModified(Box<Request>),
    /// Hand the request to a spawned task with a view over the session's
    /// async capability surface. The reader does not wait for this to run.
    HandleAsync(Box<dyn FnOnce(Request, AsyncContext) -> BoxFuture<'static> + Send>),
}

impl Action {
    pub fn respond(message: Message) -> Self {
        Action::Respond(Box::new(message))
    }

    pub fn forward_modified(request: Request) -> Self {
        Action::ForwardModified(Box::new(request))
    }

    pub fn handle_async<F, Fut>(f: F) -> Self
    where
        F: FnOnce(Request, AsyncContext) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        Action::HandleAsync(Box::new(move |request, ctx| Box::pin(f(request, ctx))))
    }

    pub(crate) fn is_forward(&self) -> bool {
        matches!(self, Action::Forward)
    }
}

/// One handler in the chain. Implementors may hold interior-mutable state
/// (a `Mutex`/`AtomicBool`) to observe traffic across calls — e.g. the
/// output-category normalizer's "has a `continued` event been seen yet".
pub trait Interceptor: Send + Sync {
    fn on_request(&self, request: &Request) -> Action;

    fn on_backend_message(&self, message: Message) -> Vec<Message>;
}

/// The ordered chain. `spec.md` §4.4: every handler observes every request
/// in order; the first non-`Forward` action wins. Backend messages flow
/// through every handler in order, each consuming the previous handler's
/// output list item by item (flat-map).
pub struct Chain {
    handlers: Vec<Box<dyn Interceptor>>,
}

impl Chain {
    pub fn new(handlers: Vec<Box<dyn Interceptor>>) -> Self {
        Chain { handlers }
    }

    pub fn on_request(&self, request: &Request) -> Action {
        let mut winner = None;
        for handler in &self.handlers {
            let action = handler.on_request(request);
            if winner.is_none() {
                if action.is_forward() {
                    continue;
                }
                winner = Some(action);
            }
        }
        winner.unwrap_or(Action::Forward)
    }

    pub fn on_backend_message(&self, message: Message) -> Vec<Message> {
        let mut pending = vec![message];
        for handler in &self.handlers {
            let mut next = Vec::with_capacity(pending.len());
            for item in pending {
                next.extend(handler.on_backend_message(item));
            }
            pending = next;
        }
        pending
    }
}

/// The reference chain `spec.md` §4.4 mandates, in the order given there.
pub fn reference_chain(
    session: std::sync::Arc<crate::session::DebugSession>,
) -> Chain {
    Chain::new(vec![
        Box::new(InitializeObserver::new(session.clone())),
        Box::new(LifecycleDispatcher::new(session.clone())),
        Box::new(EvaluateContextRewriter),
        Box::new(OutputCategoryNormalizer::new()),
        Box::new(ExitStatusReformatter),
        Box::new(OutputCoalescer::new()),
    ])
}
