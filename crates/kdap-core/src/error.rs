use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the session router, interception chain, and
/// debug-session orchestrator.
///
/// Severity follows `spec.md` §7: only [`KdapError::Protocol`] and
/// [`KdapError::Io`] on the primary client/backend streams terminate the
/// session. The other variants are caught at a handler boundary and turned
/// into a failed response or a console output event.
#[derive(Debug, Error)]
pub enum KdapError {
    /// Malformed framing or JSON on a primary stream, or a message missing
    /// its mandatory `type` field. Fatal: the session ends.
    #[error("protocol error while parsing {context}: {source}")]
    Protocol {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// An async handler (launch/attach/disconnect/terminate) raised while
    /// processing a request. Non-fatal: a failed response is sent for the
    /// triggering request and the session continues.
    #[error("handler failed while processing `{command}`: {message}")]
    Handler { command: String, message: String },

    /// A forwarded command's response carried `success: false`. Surfaced to
    /// the awaiting async handler via its backend-response promise.
    #[error("backend rejected `{command}`: {message}")]
    Backend { command: String, message: String },

    /// The `runInTerminal` TCP handshake with the terminal helper failed.
    /// Non-fatal: launch proceeds without stdio redirection.
    #[error("terminal handshake failed: {0}")]
    TerminalHandshake(String),

    /// Read/write/close on a stream failed. Fatal: the session ends.
    #[error("I/O error on {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// A oneshot promise resolver disappeared (the other side of a pending
    /// table entry was dropped, typically during shutdown).
    #[error("awaited response channel closed before resolving")]
    ChannelClosed,

    /// `await_response` (or similar) exceeded a caller-supplied deadline.
    /// The core itself imposes no timeouts (`spec.md` §5); this variant
    /// exists for callers that layer one on via `tokio::time::timeout`.
    #[error("timed out after {0:?} awaiting a response")]
    Timeout(Duration),
}

impl KdapError {
    pub(crate) fn protocol(context: &'static str, source: serde_json::Error) -> Self {
        KdapError::Protocol { context, source }
    }

    pub(crate) fn io(context: &'static str, source: std::io::Error) -> Self {
        KdapError::Io { context, source }
    }

    pub fn handler(command: impl Into<String>, message: impl Into<String>) -> Self {
        KdapError::Handler {
            command: command.into(),
            message: message.into(),
        }
    }

    pub fn backend(command: impl Into<String>, message: impl Into<String>) -> Self {
        KdapError::Backend {
            command: command.into(),
            message: message.into(),
        }
    }
}
