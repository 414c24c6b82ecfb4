//! The session router (`spec.md` §4.3): four concurrent tasks coordinated
//! over bounded channels, the request/response correlation tables, the
//! event gate, and silent-request suppression. This is the one place in
//! the crate where the correlation state actually lives; the interception
//! chain and debug-session orchestrator only ever see it through
//! [`AsyncContext`], a cloneable capability handle — the "borrowed
//! capability bounded by the session's lifetime" `spec.md` §9 calls for.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};

use crate::config::SessionConfig;
use crate::error::KdapError;
use crate::framing::{FrameReader, FrameWriter};
use crate::intercept::{Action, Chain};
use crate::message::{EventBody, Message, OutputCategory, Response, SeqAllocator};

/// Correlation state owned by the router and shared, via `Arc`, with every
/// [`AsyncContext`] handed out for this session.
struct Shared {
    to_client: Mutex<Option<mpsc::Sender<Value>>>,
    to_backend: Mutex<Option<mpsc::Sender<Value>>>,
    reverse_seq: SeqAllocator,
    backend_seq: SeqAllocator,
    pending_reverse_responses: Mutex<HashMap<i64, oneshot::Sender<Response>>>,
    reverse_awaits: Mutex<HashMap<i64, oneshot::Receiver<Response>>>,
    pending_backend_responses: Mutex<HashMap<i64, oneshot::Sender<Response>>>,
    pending_client_interceptions: Mutex<HashMap<String, oneshot::Sender<Value>>>,
    silent_request_seqs: Mutex<HashSet<i64>>,
    pending_silent_requests: AtomicI64,
    deferred_decrements: AtomicI64,
    event_gate: Mutex<Option<Arc<Mutex<Vec<Message>>>>>,
}

impl Shared {
    fn to_client_sender(&self) -> Option<mpsc::Sender<Value>> {
        self.to_client.lock().unwrap().clone()
    }

    fn to_backend_sender(&self) -> Option<mpsc::Sender<Value>> {
        self.to_backend.lock().unwrap().clone()
    }

    fn close_outgoing_channels(&self) {
        self.to_client.lock().unwrap().take();
        self.to_backend.lock().unwrap().take();
    }

    fn apply_deferred_decrements(&self) {
        let pending = self.deferred_decrements.swap(0, Ordering::SeqCst);
        if pending > 0 {
            self.pending_silent_requests.fetch_sub(pending, Ordering::SeqCst);
        }
    }
}

async fn send_via(sender: Option<mpsc::Sender<Value>>, value: Value) -> Result<(), KdapError> {
    let sender = sender.ok_or(KdapError::ChannelClosed)?;
    sender.send(value).await.map_err(|_| KdapError::ChannelClosed)
}

async fn forward_to_backend(shared: &Shared, value: Value) -> Result<(), KdapError> {
    send_via(shared.to_backend_sender(), value).await
}

async fn send_to_client(shared: &Shared, value: Value) -> Result<(), KdapError> {
    send_via(shared.to_client_sender(), value).await
}

/// The capability surface exposed to async handlers: the debug-session
/// orchestrator and any `HandleAsync` interceptor closure. `spec.md` §4.3
/// table. Cheap to clone — it is an `Arc` handle over the router's state.
#[derive(Clone)]
pub struct AsyncContext {
    shared: Arc<Shared>,
}

impl AsyncContext {
    pub async fn send_reverse_request(&self, mut request: Value) -> Result<i64, KdapError> {
        let seq = self.shared.reverse_seq.next();
        request["seq"] = Value::from(seq);
        request["type"] = Value::from("request");

        let (tx, rx) = oneshot::channel();
        self.shared
            .pending_reverse_responses
            .lock()
            .unwrap()
            .insert(seq, tx);
        self.shared.reverse_awaits.lock().unwrap().insert(seq, rx);

        if let Err(error) = send_to_client(&self.shared, request).await {
            self.shared.pending_reverse_responses.lock().unwrap().remove(&seq);
            self.shared.reverse_awaits.lock().unwrap().remove(&seq);
            return Err(error);
        }
        Ok(seq)
    }

    pub async fn await_response(&self, seq: i64) -> Result<Response, KdapError> {
        let rx = self.shared.reverse_awaits.lock().unwrap().remove(&seq);
        let rx = rx.ok_or(KdapError::ChannelClosed)?;
        rx.await.map_err(|_| KdapError::ChannelClosed)
    }

    pub async fn forward_to_backend(&self, raw: Value) -> Result<(), KdapError> {
        forward_to_backend(&self.shared, raw).await
    }

    /// Allocates a seq for an event the orchestrator synthesizes itself
    /// (`initialized`, a synthetic `stopped`/`terminated`, ...), drawn from
    /// the same backend-originated partition as `send_request_to_backend_and_await`
    /// (`spec.md` §3: "backend-originated seqs start at 2,000,000").
    pub fn next_adapter_seq(&self) -> i64 {
        self.shared.backend_seq.next()
    }

    pub async fn send_event_to_client(&self, raw: Value) -> Result<(), KdapError> {
        send_to_client(&self.shared, raw).await
    }

    pub async fn send_request_to_backend_and_await(
        &self,
        mut request: Value,
    ) -> Result<Response, KdapError> {
        let seq = self.shared.backend_seq.next();
        request["seq"] = Value::from(seq);
        request["type"] = Value::from("request");

        let (tx, rx) = oneshot::channel();
        self.shared
            .pending_backend_responses
            .lock()
            .unwrap()
            .insert(seq, tx);

        if let Err(error) = forward_to_backend(&self.shared, request).await {
            self.shared.pending_backend_responses.lock().unwrap().remove(&seq);
            return Err(error);
        }

        rx.await.map_err(|_| KdapError::ChannelClosed)
    }

    /// As [`Self::send_request_to_backend_and_await`], and additionally
    /// suppresses concurrent `console`-category output for the duration of
    /// the wait plus one trailing message (`spec.md` §4.3, §9 "silent
    /// suppression race").
    pub async fn send_silent_request_to_backend_and_await(
        &self,
        mut request: Value,
    ) -> Result<Response, KdapError> {
        let seq = self.shared.backend_seq.next();
        request["seq"] = Value::from(seq);
        request["type"] = Value::from("request");

        self.shared
            .pending_silent_requests
            .fetch_add(1, Ordering::SeqCst);
        self.shared.silent_request_seqs.lock().unwrap().insert(seq);

        let (tx, rx) = oneshot::channel();
        self.shared
            .pending_backend_responses
            .lock()
            .unwrap()
            .insert(seq, tx);

        if let Err(error) = forward_to_backend(&self.shared, request).await {
            self.shared.pending_backend_responses.lock().unwrap().remove(&seq);
            self.release_silent_seq_if_unclaimed(seq);
            return Err(error);
        }

        let result = rx.await.map_err(|_| KdapError::ChannelClosed);
        if result.is_err() {
            self.release_silent_seq_if_unclaimed(seq);
        }
        result
    }

    /// Only the caller of `send_silent_request_to_backend_and_await` ever
    /// calls this, and only when its own await failed — the router removes
    /// `seq` from the set itself (scheduling a deferred decrement instead)
    /// the moment it resolves the response normally, so this is a no-op on
    /// the happy path.
    fn release_silent_seq_if_unclaimed(&self, seq: i64) {
        if self.shared.silent_request_seqs.lock().unwrap().remove(&seq) {
            self.shared
                .pending_silent_requests
                .fetch_sub(1, Ordering::SeqCst);
        }
    }

    pub async fn intercept_client_request(
        &self,
        command: impl Into<String>,
    ) -> Result<Value, KdapError> {
        let (tx, rx) = oneshot::channel();
        self.shared
            .pending_client_interceptions
            .lock()
            .unwrap()
            .insert(command.into(), tx);
        rx.await.map_err(|_| KdapError::ChannelClosed)
    }

    pub fn activate_event_gate(&self) {
        let mut gate = self.shared.event_gate.lock().unwrap();
        if gate.is_none() {
            *gate = Some(Arc::new(Mutex::new(Vec::new())));
        }
    }

    /// Drains the gate, yields once, then drains again — the "drain, yield,
    /// drain" protocol from `spec.md` §9 that closes the race window
    /// against a backend-reader iteration that read a non-null gate just
    /// before this call swapped it out.
    pub async fn release_event_gate(&self) -> Result<(), KdapError> {
        let queue = self.shared.event_gate.lock().unwrap().take();
        let Some(queue) = queue else {
            return Ok(());
        };

        let first: Vec<Message> = queue.lock().unwrap().drain(..).collect();
        self.flush_gate_batch(first).await?;

        tokio::task::yield_now().await;

        let second: Vec<Message> = queue.lock().unwrap().drain(..).collect();
        self.flush_gate_batch(second).await
    }

    async fn flush_gate_batch(&self, batch: Vec<Message>) -> Result<(), KdapError> {
        for message in batch {
            send_to_client(&self.shared, message.raw().clone()).await?;
        }
        Ok(())
    }
}

/// Owns the four concurrent tasks for one debug session's lifetime.
pub struct SessionRouter;

impl SessionRouter {
    /// Runs the session to completion: spawns the four tasks, waits for
    /// both readers to reach end-of-stream (or error), then closes the
    /// outgoing channels so the writers drain their queues and exit.
    pub async fn run<CR, CW, BR, BW>(
        config: SessionConfig,
        client_in: CR,
        client_out: CW,
        backend_in: BR,
        backend_out: BW,
        chain: Arc<Chain>,
    ) -> Result<(), KdapError>
    where
        CR: AsyncBufRead + Unpin + Send + 'static,
        CW: AsyncWrite + Unpin + Send + 'static,
        BR: AsyncBufRead + Unpin + Send + 'static,
        BW: AsyncWrite + Unpin + Send + 'static,
    {
        let (to_client_tx, to_client_rx) = mpsc::channel::<Value>(config.channel_capacity);
        let (to_backend_tx, to_backend_rx) = mpsc::channel::<Value>(config.channel_capacity);

        let shared = Arc::new(Shared {
            to_client: Mutex::new(Some(to_client_tx)),
            to_backend: Mutex::new(Some(to_backend_tx)),
            reverse_seq: SeqAllocator::starting_at(config.reverse_request_floor),
            backend_seq: SeqAllocator::starting_at(config.backend_request_floor),
            pending_reverse_responses: Mutex::new(HashMap::new()),
            reverse_awaits: Mutex::new(HashMap::new()),
            pending_backend_responses: Mutex::new(HashMap::new()),
            pending_client_interceptions: Mutex::new(HashMap::new()),
            silent_request_seqs: Mutex::new(HashSet::new()),
            pending_silent_requests: AtomicI64::new(0),
            deferred_decrements: AtomicI64::new(0),
            event_gate: Mutex::new(None),
        });

        let ctx = AsyncContext {
            shared: shared.clone(),
        };

        let client_writer = tokio::spawn(writer_loop("client", client_out, to_client_rx));
        let backend_writer = tokio::spawn(writer_loop("backend", backend_out, to_backend_rx));

        let client_reader = tokio::spawn(run_client_reader(
            client_in,
            shared.clone(),
            chain.clone(),
            ctx,
        ));
        let backend_reader = tokio::spawn(run_backend_reader(backend_in, shared.clone(), chain));

        let (client_result, backend_result) = tokio::join!(client_reader, backend_reader);

        // Either reader finishing (EOF or error) ends the session: close the
        // outgoing channels so both writers drain what's queued and exit,
        // dropping their owned output streams (which, for a real backend
        // process, closes its stdin and prompts it to exit in turn).
        shared.close_outgoing_channels();
        let _ = tokio::join!(client_writer, backend_writer);

        client_result.map_err(|_| KdapError::ChannelClosed)??;
        backend_result.map_err(|_| KdapError::ChannelClosed)??;
        Ok(())
    }
}

async fn writer_loop<W: AsyncWrite + Unpin>(
    label: &'static str,
    sink: W,
    mut rx: mpsc::Receiver<Value>,
) {
    let mut writer = FrameWriter::new(sink);
    while let Some(value) = rx.recv().await {
        let bytes = match serde_json::to_vec(&value) {
            Ok(bytes) => bytes,
            Err(error) => {
                tracing::warn!(stream = label, %error, "dropping outbound message: serialize failed");
                continue;
            }
        };
        if let Err(error) = writer.write_message(&bytes).await {
            tracing::error!(stream = label, %error, "writer task exiting after I/O error");
            break;
        }
    }
    tracing::debug!(stream = label, "writer task exiting: outgoing channel closed");
}

async fn run_client_reader<R: AsyncBufRead + Unpin>(
    stream: R,
    shared: Arc<Shared>,
    chain: Arc<Chain>,
    ctx: AsyncContext,
) -> Result<(), KdapError> {
    let mut reader = FrameReader::new(stream);
    loop {
        let body = match reader.read_message().await {
            Ok(Some(body)) => body,
            Ok(None) => {
                tracing::debug!("client reader reached end-of-stream");
                return Ok(());
            }
            Err(error) => {
                tracing::error!(%error, "client reader I/O error; ending session");
                return Err(error);
            }
        };

        let message = match Message::parse(&body) {
            Ok(message) => message,
            Err(error) => {
                tracing::error!(%error, "client sent a malformed message; ending session");
                return Err(error);
            }
        };

        match dispatch_client_message(message, &shared, &chain, &ctx).await {
            Ok(()) => {}
            Err(KdapError::ChannelClosed) => {
                tracing::debug!("client reader exiting: an outgoing channel closed");
                return Ok(());
            }
            Err(error) => return Err(error),
        }
    }
}

async fn dispatch_client_message(
    message: Message,
    shared: &Arc<Shared>,
    chain: &Arc<Chain>,
    ctx: &AsyncContext,
) -> Result<(), KdapError> {
    match message {
        Message::Response(response) => {
            let resolver = shared
                .pending_reverse_responses
                .lock()
                .unwrap()
                .remove(&response.request_seq);
            match resolver {
                Some(tx) => {
                    let _ = tx.send(response);
                }
                None => {
                    tracing::warn!(
                        request_seq = response.request_seq,
                        "client response matched no pending reverse request; forwarding to backend"
                    );
                    forward_to_backend(shared, response.raw.clone()).await?;
                }
            }
        }
        Message::Request(request) => {
            let interception = shared
                .pending_client_interceptions
                .lock()
                .unwrap()
                .remove(&request.command);
            if let Some(tx) = interception {
                let _ = tx.send(request.raw.clone());
                return Ok(());
            }

            match chain.on_request(&request) {
                Action::Forward => forward_to_backend(shared, request.raw.clone()).await?,
                Action::Respond(message) => send_to_client(shared, message.raw().clone()).await?,
                Action::ForwardModified(modified) => {
                    forward_to_backend(shared, modified.raw.clone()).await?
                }
                Action::HandleAsync(task) => {
                    let ctx = ctx.clone();
                    tokio::spawn(task(request, ctx));
                }
            }
        }
        Message::Event(event) => {
            tracing::warn!(
                event = %event.event,
                "unexpected client-originated event; forwarding to backend"
            );
            forward_to_backend(shared, event.raw.clone()).await?;
        }
    }
    Ok(())
}

async fn run_backend_reader<R: AsyncBufRead + Unpin>(
    stream: R,
    shared: Arc<Shared>,
    chain: Arc<Chain>,
) -> Result<(), KdapError> {
    let mut reader = FrameReader::new(stream);
    loop {
        let body = match reader.read_message().await {
            Ok(Some(body)) => body,
            Ok(None) => {
                tracing::debug!("backend reader reached end-of-stream");
                return Ok(());
            }
            Err(error) => {
                tracing::error!(%error, "backend reader I/O error; ending session");
                return Err(error);
            }
        };

        let message = match Message::parse(&body) {
            Ok(message) => message,
            Err(error) => {
                tracing::error!(%error, "backend sent a malformed message; ending session");
                return Err(error);
            }
        };

        match dispatch_backend_message(message, &shared, &chain).await {
            Ok(()) => {}
            Err(KdapError::ChannelClosed) => {
                tracing::debug!("backend reader exiting: an outgoing channel closed");
                return Ok(());
            }
            Err(error) => return Err(error),
        }
        shared.apply_deferred_decrements();
    }
}

async fn dispatch_backend_message(
    message: Message,
    shared: &Arc<Shared>,
    chain: &Arc<Chain>,
) -> Result<(), KdapError> {
    let message = match message {
        Message::Response(response) => {
            let resolver = shared
                .pending_backend_responses
                .lock()
                .unwrap()
                .remove(&response.request_seq);
            if let Some(tx) = resolver {
                let was_silent = shared
                    .silent_request_seqs
                    .lock()
                    .unwrap()
                    .remove(&response.request_seq);
                if was_silent {
                    shared.deferred_decrements.fetch_add(1, Ordering::SeqCst);
                }
                let _ = tx.send(response);
                return Ok(());
            }
            Message::Response(response)
        }
        other => other,
    };

    if shared.pending_silent_requests.load(Ordering::SeqCst) > 0 {
        if let Message::Event(event) = &message {
            if let EventBody::Output(body) = &event.body {
                if body.category == OutputCategory::Console {
                    tracing::debug!("suppressing console output during a silent backend request");
                    return Ok(());
                }
            }
        }
    }

    for produced in chain.on_backend_message(message) {
        route_to_client_or_gate(shared, produced).await?;
    }
    Ok(())
}

async fn route_to_client_or_gate(shared: &Arc<Shared>, message: Message) -> Result<(), KdapError> {
    let gate = shared.event_gate.lock().unwrap().clone();
    match gate {
        Some(queue) => {
            queue.lock().unwrap().push(message);
            Ok(())
        }
        None => send_to_client(shared, message.raw().clone()).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::BufReader;

    /// Drives a scripted backend-side fixture: writes framed messages into
    /// the router's backend-input side and reads whatever the router writes
    /// to the backend-output side, standing in for a real lldb-dap process.
    struct FakeBackend {
        to_router: FrameWriter<tokio::io::DuplexStream>,
        from_router: FrameReader<BufReader<tokio::io::DuplexStream>>,
    }

    fn empty_chain() -> Arc<Chain> {
        Arc::new(Chain::new(Vec::new()))
    }

    async fn forward_only_fixture() -> (
        tokio::io::DuplexStream,
        BufReader<tokio::io::DuplexStream>,
        FakeBackend,
    ) {
        let (client_in_near, client_in_far) = tokio::io::duplex(8192);
        let (client_out_near, client_out_far) = tokio::io::duplex(8192);
        let (backend_in_near, backend_in_far) = tokio::io::duplex(8192);
        let (backend_out_near, backend_out_far) = tokio::io::duplex(8192);

        let fake_backend = FakeBackend {
            to_router: FrameWriter::new(backend_out_near),
            from_router: FrameReader::new(BufReader::new(backend_in_near)),
        };

        tokio::spawn(SessionRouter::run(
            SessionConfig::default(),
            BufReader::new(client_in_far),
            client_out_near,
            BufReader::new(backend_in_far),
            backend_out_far,
            empty_chain(),
        ));

        (client_in_near, BufReader::new(client_out_far), fake_backend)
    }

    #[tokio::test]
    async fn forwards_an_unrecognized_request_to_the_backend() {
        let (mut client_in, _client_out, mut backend) = forward_only_fixture().await;

        let mut client_writer = FrameWriter::new(&mut client_in);
        client_writer
            .write_message(
                json!({"seq": 1, "type": "request", "command": "initialize", "arguments": {}})
                    .to_string()
                    .as_bytes(),
            )
            .await
            .unwrap();

        let body = backend.from_router.read_message().await.unwrap().unwrap();
        let forwarded: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(forwarded["command"], "initialize");
        assert_eq!(forwarded["seq"], 1);
    }

    #[tokio::test]
    async fn forwards_a_matching_backend_response_to_the_client() {
        let (mut client_in, client_out, mut backend) = forward_only_fixture().await;

        let mut client_writer = FrameWriter::new(&mut client_in);
        client_writer
            .write_message(
                json!({"seq": 1, "type": "request", "command": "initialize", "arguments": {}})
                    .to_string()
                    .as_bytes(),
            )
            .await
            .unwrap();
        backend.from_router.read_message().await.unwrap();

        backend
            .to_router
            .write_message(
                json!({
                    "seq": 1, "type": "response", "request_seq": 1,
                    "command": "initialize", "success": true, "body": {"capabilities": {}}
                })
                .to_string()
                .as_bytes(),
            )
            .await
            .unwrap();

        let mut reader = FrameReader::new(client_out);
        let body = reader.read_message().await.unwrap().unwrap();
        let response: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(response["command"], "initialize");
        assert_eq!(response["success"], true);
    }
}
