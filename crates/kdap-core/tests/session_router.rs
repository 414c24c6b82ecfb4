//! End-to-end coverage of [`kdap_core::router::SessionRouter`] over real
//! `Content-Length` framing, driving the router the way a production binary
//! would: two duplex pipes standing in for the client connection, two more
//! for the backend connection.

use std::sync::Arc;

use kdap_core::intercept::{Action, Chain, EvaluateContextRewriter, Interceptor};
use kdap_core::message::{Event, EventBody, Message, Request};
use kdap_core::router::{AsyncContext, SessionRouter};
use kdap_core::{FrameReader, FrameWriter, SessionConfig};
use serde_json::{json, Value};
use tokio::io::BufReader;

async fn write_frame<W: tokio::io::AsyncWrite + Unpin>(sink: &mut W, value: &Value) {
    let mut writer = FrameWriter::new(sink);
    writer
        .write_message(serde_json::to_vec(value).unwrap().as_slice())
        .await
        .unwrap();
}

async fn read_frame<R: tokio::io::AsyncBufRead + Unpin>(source: &mut FrameReader<R>) -> Value {
    let body = source.read_message().await.unwrap().unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn passthrough_unknown_request_round_trips_through_framing() {
    let (mut client_write_near, client_read_far) = tokio::io::duplex(8192);
    let (client_read_near, client_write_far) = tokio::io::duplex(8192);
    let (mut backend_write_near, backend_read_far) = tokio::io::duplex(8192);
    let (backend_read_near, backend_write_far) = tokio::io::duplex(8192);

    let chain = Arc::new(Chain::new(vec![]));
    let router = tokio::spawn(SessionRouter::run(
        SessionConfig::default(),
        BufReader::new(client_read_far),
        client_write_far,
        BufReader::new(backend_read_far),
        backend_write_far,
        chain,
    ));

    write_frame(
        &mut client_write_near,
        &json!({
            "seq": 1, "type": "request", "command": "setBreakpoints",
            "arguments": {"source": {"path": "/a.rs"}, "breakpoints": []}
        }),
    )
    .await;

    let mut backend_reader = FrameReader::new(BufReader::new(backend_read_near));
    let forwarded = read_frame(&mut backend_reader).await;
    assert_eq!(forwarded["command"], "setBreakpoints");
    assert_eq!(forwarded["seq"], 1);

    write_frame(
        &mut backend_write_near,
        &json!({
            "seq": 2, "type": "response", "request_seq": 1,
            "command": "setBreakpoints", "success": true,
            "body": {"breakpoints": []}
        }),
    )
    .await;

    let mut client_reader = FrameReader::new(BufReader::new(client_read_near));
    let response = read_frame(&mut client_reader).await;
    assert_eq!(response["command"], "setBreakpoints");
    assert!(response["success"].as_bool().unwrap());

    drop(client_write_near);
    drop(backend_write_near);
    tokio::time::timeout(std::time::Duration::from_secs(2), router)
        .await
        .expect("router task did not shut down")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn evaluate_context_rewriter_forwards_repl_context_to_backend() {
    let (mut client_write_near, client_read_far) = tokio::io::duplex(8192);
    let (_client_read_near, client_write_far) = tokio::io::duplex(8192);
    let (mut backend_write_near, backend_read_far) = tokio::io::duplex(8192);
    let (backend_read_near, backend_write_far) = tokio::io::duplex(8192);

    let chain = Arc::new(Chain::new(vec![Box::new(EvaluateContextRewriter)]));
    let router = tokio::spawn(SessionRouter::run(
        SessionConfig::default(),
        BufReader::new(client_read_far),
        client_write_far,
        BufReader::new(backend_read_far),
        backend_write_far,
        chain,
    ));

    write_frame(
        &mut client_write_near,
        &json!({
            "seq": 5, "type": "request", "command": "evaluate",
            "arguments": {"expression": "1 + 1", "context": "_command"}
        }),
    )
    .await;

    let mut backend_reader = FrameReader::new(BufReader::new(backend_read_near));
    let forwarded = read_frame(&mut backend_reader).await;
    assert_eq!(forwarded["command"], "evaluate");
    assert_eq!(forwarded["arguments"]["context"], "repl");
    assert_eq!(forwarded["arguments"]["expression"], "1 + 1");

    drop(client_write_near);
    drop(backend_write_near);
    tokio::time::timeout(std::time::Duration::from_secs(2), router)
        .await
        .expect("router task did not shut down")
        .unwrap()
        .unwrap();
}

/// An interceptor standing in for the orchestrator's own use of reverse
/// requests (`spec.md` §6 `runInTerminal`): on a `probeReverse` request it
/// issues a reverse request to the client, awaits the client's answer, and
/// reports what it got back as an event.
struct ReverseProbe;

impl Interceptor for ReverseProbe {
    fn on_request(&self, request: &Request) -> Action {
        if request.command != "probeReverse" {
            return Action::Forward;
        }
        Action::handle_async(|_request, ctx: AsyncContext| async move {
            let seq = ctx
                .send_reverse_request(json!({
                    "type": "request",
                    "command": "probeReverseRequest",
                    "arguments": {},
                }))
                .await
                .unwrap();
            let response = ctx.await_response(seq).await.unwrap();
            let _ = ctx
                .send_event_to_client(
                    Event::new(
                        ctx.next_adapter_seq(),
                        EventBody::Unknown(Some(json!({ "echoed": response.success }))),
                    )
                    .to_json(),
                )
                .await;
        })
    }

    fn on_backend_message(&self, message: Message) -> Vec<Message> {
        vec![message]
    }
}

#[tokio::test]
async fn reverse_request_round_trips_through_the_client_connection() {
    let (mut client_write_near, client_read_far) = tokio::io::duplex(8192);
    let (client_read_near, client_write_far) = tokio::io::duplex(8192);
    let (backend_write_near, backend_read_far) = tokio::io::duplex(8192);
    let (_backend_read_near, backend_write_far) = tokio::io::duplex(8192);

    let chain = Arc::new(Chain::new(vec![Box::new(ReverseProbe)]));
    let router = tokio::spawn(SessionRouter::run(
        SessionConfig::default(),
        BufReader::new(client_read_far),
        client_write_far,
        BufReader::new(backend_read_far),
        backend_write_far,
        chain,
    ));

    write_frame(
        &mut client_write_near,
        &json!({"seq": 1, "type": "request", "command": "probeReverse", "arguments": {}}),
    )
    .await;

    let mut client_reader = FrameReader::new(BufReader::new(client_read_near));
    let reverse_request = read_frame(&mut client_reader).await;
    assert_eq!(reverse_request["command"], "probeReverseRequest");
    assert!(reverse_request["seq"].as_i64().unwrap() >= 1_000_000);

    write_frame(
        &mut client_write_near,
        &json!({
            "seq": 2, "type": "response",
            "request_seq": reverse_request["seq"], "command": "probeReverseRequest",
            "success": true
        }),
    )
    .await;

    let event = read_frame(&mut client_reader).await;
    assert_eq!(event["event"], "unknown");
    assert_eq!(event["body"]["echoed"], true);

    drop(client_write_near);
    drop(backend_write_near);
    tokio::time::timeout(std::time::Duration::from_secs(2), router)
        .await
        .expect("router task did not shut down")
        .unwrap()
        .unwrap();
}
