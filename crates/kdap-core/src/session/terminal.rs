//! The `runInTerminal` reverse-request handshake (`spec.md` §6). Binds an
//! ephemeral loopback listener, asks the client to launch a terminal
//! helper pointed at it, and reads back the TTY path the helper observed.
//! Any failure here is recoverable: the caller falls back to no stdio
//! redirection rather than failing the launch.

use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

use crate::error::KdapError;
use crate::router::AsyncContext;

const ACCEPT_TIMEOUT: Duration = Duration::from_secs(10);

/// Performs the handshake for a launch whose `terminal` is `integrated` or
/// `external`. `terminal_helper_args` is the helper program's argv minus
/// the `--connect` flag, which this function appends once the listener's
/// port is known.
pub async fn perform_handshake(
    ctx: &AsyncContext,
    terminal_helper_args: Vec<String>,
    cwd: Option<String>,
    env: std::collections::BTreeMap<String, String>,
) -> Result<Option<String>, KdapError> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|source| KdapError::io("terminal listener bind", source))?;
    let port = listener
        .local_addr()
        .map_err(|source| KdapError::io("terminal listener local_addr", source))?
        .port();

    let mut args = terminal_helper_args;
    args.push(format!("--connect=127.0.0.1:{port}"));

    let request = json!({
        "type": "request",
        "command": "runInTerminal",
        "arguments": {
            "kind": "integrated",
            "title": "KDAP",
            "args": args,
            "cwd": cwd.unwrap_or_default(),
            "env": env,
        },
    });

    let seq = ctx.send_reverse_request(request).await?;
    let response = ctx.await_response(seq).await?;
    if !response.success {
        return Err(KdapError::TerminalHandshake(
            response
                .message
                .unwrap_or_else(|| "client rejected runInTerminal".to_string()),
        ));
    }

    let (stream, _) = tokio::time::timeout(ACCEPT_TIMEOUT, listener.accept())
        .await
        .map_err(|_| KdapError::TerminalHandshake("timed out waiting for terminal helper".into()))?
        .map_err(|source| KdapError::TerminalHandshake(source.to_string()))?;

    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();
    reader
        .read_line(&mut line)
        .await
        .map_err(|source| KdapError::io("terminal handshake read", source))?;

    let payload: Value = serde_json::from_str(line.trim())
        .map_err(|source| KdapError::protocol("terminal handshake body", source))?;
    let tty_path = payload
        .get("tty")
        .and_then(Value::as_str)
        .map(str::to_string);

    write_half
        .write_all(b"{\"success\":true}\n")
        .await
        .map_err(|source| KdapError::io("terminal handshake write", source))?;

    Ok(tty_path)
}
