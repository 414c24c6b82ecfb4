//! Core of a concurrent, bidirectional Debug Adapter Protocol proxy sitting
//! between an IDE client and a native debugger backend. The router (four
//! tasks over bounded channels), the interception chain, and the
//! debug-session orchestrator together reproduce the observable behavior of
//! a reference adapter while staying agnostic to which backend they drive.
//!
//! Framing, transport, and config are ambient plumbing around that core; see
//! [`framing`], [`transport`], and [`config`].

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod framing;
pub mod intercept;
pub mod message;
pub mod router;
pub mod session;
pub mod transport;

pub use config::{SessionConfig, SessionConfigBuilder};
pub use error::KdapError;
pub use framing::{FrameReader, FrameWriter};
pub use intercept::{reference_chain, Action, BoxFuture, Chain, Interceptor};
pub use message::{Event, EventBody, Message, Request, RequestBody, Response, SeqAllocator};
pub use router::{AsyncContext, SessionRouter};
pub use session::{DebugSession, GracefulShutdown};
pub use transport::{BackendConfig, BackendHandle};
