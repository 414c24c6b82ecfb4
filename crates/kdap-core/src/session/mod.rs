//! The debug-session orchestrator (`spec.md` §4.5): the async handlers
//! that drive `launch`/`attach`/`disconnect`/`terminate` against the
//! backend's scripting interpreter while multiplexing synthesized events
//! with the backend's own traffic.

mod sb;
pub mod terminal;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::error::KdapError;
use crate::message::{
    Event, EventBody, OutputCategory, OutputEventBody, Request, RequestBody, Response,
};
use crate::router::AsyncContext;

use sb::SbFacade;

const CONSOLE_MODE_ANNOUNCEMENT: &str =
    "Console is in 'commands' mode, prefix expressions with '?'.\n";

/// How `handle_terminate` should end the debuggee: a signal to deliver, or
/// a scripted command list to run instead (`spec.md` §3 `DebugSession`
/// state, `graceful_shutdown`).
#[derive(Clone, Debug)]
pub enum GracefulShutdown {
    Signal(String),
    Commands(Vec<String>),
}

/// Session-lifetime state mutated only by the async handlers below
/// (`spec.md` §3). Held behind an `Arc` and shared by the interceptors
/// that need to read it (the initialize observer, the lifecycle
/// dispatcher) and the handlers that mutate it.
pub struct DebugSession {
    client_supports_run_in_terminal: AtomicBool,
    graceful_shutdown: Mutex<Option<GracefulShutdown>>,
    pre_terminate_commands: Mutex<Vec<String>>,
    exit_commands: Mutex<Vec<String>>,
    terminate_on_disconnect: AtomicBool,
    process_running: AtomicBool,
}

impl DebugSession {
    pub fn new() -> Self {
        DebugSession {
            client_supports_run_in_terminal: AtomicBool::new(false),
            graceful_shutdown: Mutex::new(None),
            pre_terminate_commands: Mutex::new(Vec::new()),
            exit_commands: Mutex::new(Vec::new()),
            terminate_on_disconnect: AtomicBool::new(false),
            process_running: AtomicBool::new(false),
        }
    }

    pub fn set_client_supports_run_in_terminal(&self, supported: bool) {
        self.client_supports_run_in_terminal
            .store(supported, Ordering::SeqCst);
    }

    pub fn client_supports_run_in_terminal(&self) -> bool {
        self.client_supports_run_in_terminal.load(Ordering::SeqCst)
    }

    pub async fn handle_launch(&self, request: Request, ctx: AsyncContext) {
        let request_seq = request.seq;
        if let Err(error) = self.handle_launch_inner(request, &ctx).await {
            tracing::warn!(%error, "launch failed");
            let failure = Response::failure(
                ctx.next_adapter_seq(),
                request_seq,
                "launch",
                error.to_string(),
            );
            let _ = ctx.send_event_to_client(failure.to_json()).await;
            let _ = ctx.release_event_gate().await;
        }
    }

    async fn handle_launch_inner(
        &self,
        request: Request,
        ctx: &AsyncContext,
    ) -> Result<(), KdapError> {
        let RequestBody::Launch(args) = request.body else {
            return Err(KdapError::handler("launch", "missing or invalid launch arguments"));
        };

        let sb = SbFacade::new(ctx);
        sb.install_error_check_helper().await?;

        sb.set_source_map(args.common.source_map.as_ref()).await?;

        ctx.send_event_to_client(console_output(ctx.next_adapter_seq(), CONSOLE_MODE_ANNOUNCEMENT))
            .await?;
        for command in &args.common.init_commands {
            sb.cli(command).await?;
        }
        for (name, value) in &args.common.settings {
            sb.apply_setting(name, value).await?;
        }

        if !args.common.target_create_commands.is_empty() {
            for command in &args.common.target_create_commands {
                sb.cli(command).await?;
            }
        } else {
            let program = args
                .common
                .program
                .as_deref()
                .ok_or_else(|| KdapError::handler("launch", "missing `program`"))?;
            sb.target_create(program).await?;
        }

        ctx.send_event_to_client(Event::new(ctx.next_adapter_seq(), EventBody::Initialized).to_json())
            .await?;

        let config_done_raw = ctx.intercept_client_request("configurationDone").await?;
        let config_done_seq = config_done_raw
            .get("seq")
            .and_then(serde_json::Value::as_i64)
            .ok_or_else(|| {
                KdapError::handler("configurationDone", "client's configurationDone had no seq")
            })?;

        let terminal_kind = args.terminal_kind();
        let wants_tty = self.client_supports_run_in_terminal()
            && terminal_kind
                .as_ref()
                .map(|kind| kind.requests_tty_handshake())
                .unwrap_or(false);
        let tty_path = if wants_tty {
            terminal::perform_handshake(
                ctx,
                vec!["kdap-terminal-helper".to_string()],
                args.common.cwd.clone(),
                args.common.env.clone(),
            )
            .await
            .unwrap_or_else(|error| {
                tracing::warn!(%error, "terminal handshake failed; launching without redirection");
                None
            })
        } else {
            None
        };

        ctx.activate_event_gate();
        let launch_result = self
            .run_gated_launch(&sb, &args, tty_path, request.seq, config_done_seq, ctx)
            .await;
        ctx.release_event_gate().await?;
        launch_result
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_gated_launch(
        &self,
        sb: &SbFacade<'_>,
        args: &crate::message::LaunchArguments,
        tty_path: Option<String>,
        request_seq: i64,
        config_done_seq: i64,
        ctx: &AsyncContext,
    ) -> Result<(), KdapError> {
        sb.new_launch_info().await?;
        sb.launch_info_set_arguments(&args.common.args).await?;
        sb.launch_info_set_environment(&args.common.env).await?;
        if let Some(cwd) = &args.common.cwd {
            sb.launch_info_set_cwd(cwd).await?;
        }
        sb.launch_info_set_stop_at_entry(args.common.stop_on_entry)
            .await?;

        if let Some(tty) = &tty_path {
            for fd in 0..=2 {
                sb.add_open_file_action(fd, tty).await?;
            }
        } else {
            for entry in &args.stdio {
                tracing::debug!(?entry, "honoring explicit stdio entry");
            }
        }

        for command in &args.common.pre_run_commands {
            sb.cli(command).await?;
        }

        let program = args.common.program.as_deref().unwrap_or("<unknown>");
        ctx.send_event_to_client(console_output(
            ctx.next_adapter_seq(),
            format!("Launching: {program} {}\n", args.common.args.join(" ")),
        ))
        .await?;

        self.process_running.store(true, Ordering::SeqCst);

        for command in &args.common.process_create_commands {
            sb.cli(command).await?;
        }
        let pid = sb.target_launch().await?;

        ctx.send_event_to_client(console_output(
            ctx.next_adapter_seq(),
            format!("Launched process {pid} from '{program}'\n"),
        ))
        .await?;

        self.terminate_on_disconnect.store(true, Ordering::SeqCst);
        *self.pre_terminate_commands.lock().unwrap() = args.common.pre_terminate_commands.clone();
        *self.exit_commands.lock().unwrap() = args.common.exit_commands.clone();
        *self.graceful_shutdown.lock().unwrap() =
            Some(GracefulShutdown::Commands(args.common.exit_commands.clone()));

        ctx.send_event_to_client(Response::success(ctx.next_adapter_seq(), request_seq, "launch").to_json())
            .await?;
        ctx.send_event_to_client(
            Response::success(ctx.next_adapter_seq(), config_done_seq, "configurationDone").to_json(),
        )
        .await?;
        ctx.send_event_to_client(
            Event::new(
                ctx.next_adapter_seq(),
                EventBody::Continued(crate::message::ContinuedEventBody {
                    thread_id: 0,
                    all_threads_continued: Some(true),
                }),
            )
            .to_json(),
        )
        .await?;

        Ok(())
    }

    pub async fn handle_attach(&self, request: Request, ctx: AsyncContext) {
        let request_seq = request.seq;
        if let Err(error) = self.handle_attach_inner(request, &ctx).await {
            tracing::warn!(%error, "attach failed");
            let failure = Response::failure(
                ctx.next_adapter_seq(),
                request_seq,
                "attach",
                error.to_string(),
            );
            let _ = ctx.send_event_to_client(failure.to_json()).await;
        }
    }

    async fn handle_attach_inner(&self, request: Request, ctx: &AsyncContext) -> Result<(), KdapError> {
        let RequestBody::Attach(args) = request.body else {
            return Err(KdapError::handler("attach", "missing or invalid attach arguments"));
        };

        let sb = SbFacade::new(ctx);
        sb.install_error_check_helper().await?;

        let pid = if let Some(pid) = args.pid {
            sb.target_attach_by_pid(pid).await?
        } else {
            let program = args
                .common
                .program
                .as_deref()
                .ok_or_else(|| KdapError::handler("attach", "need either `pid` or `program`"))?;
            sb.target_attach_by_name(program, args.wait_for).await?
        };

        self.process_running.store(true, Ordering::SeqCst);
        self.terminate_on_disconnect.store(false, Ordering::SeqCst);

        if args.common.stop_on_entry {
            ctx.send_event_to_client(
                Event::new(
                    ctx.next_adapter_seq(),
                    EventBody::Stopped(crate::message::StoppedEventBody {
                        reason: "attach".to_string(),
                        thread_id: Some(0),
                        all_threads_stopped: Some(true),
                        description: None,
                    }),
                )
                .to_json(),
            )
            .await?;
        } else {
            sb.process_resume().await?;
        }

        ctx.send_event_to_client(Response::success(ctx.next_adapter_seq(), request.seq, "attach").to_json())
            .await?;
        tracing::debug!(pid, "attach complete");
        Ok(())
    }

    pub async fn handle_disconnect(&self, request: Request, ctx: AsyncContext) {
        let request_seq = request.seq;
        if let Err(error) = self.handle_disconnect_inner(request, &ctx).await {
            tracing::warn!(%error, "disconnect failed");
            let failure = Response::failure(
                ctx.next_adapter_seq(),
                request_seq,
                "disconnect",
                error.to_string(),
            );
            let _ = ctx.send_event_to_client(failure.to_json()).await;
        }
    }

    async fn handle_disconnect_inner(
        &self,
        request: Request,
        ctx: &AsyncContext,
    ) -> Result<(), KdapError> {
        let args = match request.body {
            RequestBody::Disconnect(args) => args,
            _ => Default::default(),
        };

        let sb = SbFacade::new(ctx);

        for command in self.pre_terminate_commands.lock().unwrap().clone() {
            sb.cli(&command).await?;
        }

        let terminate_debuggee = args
            .terminate_debuggee
            .unwrap_or_else(|| self.terminate_on_disconnect.load(Ordering::SeqCst));
        if terminate_debuggee {
            sb.process_kill().await?;
        } else {
            sb.process_detach().await?;
        }

        for command in self.exit_commands.lock().unwrap().clone() {
            sb.cli(&command).await?;
        }

        ctx.send_event_to_client(Response::success(ctx.next_adapter_seq(), request.seq, "disconnect").to_json())
            .await?;
        ctx.send_event_to_client(Event::new(ctx.next_adapter_seq(), EventBody::Terminated).to_json())
            .await?;
        self.process_running.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub async fn handle_terminate(&self, request: Request, ctx: AsyncContext) {
        let request_seq = request.seq;
        if let Err(error) = self.handle_terminate_inner(request, &ctx).await {
            tracing::warn!(%error, "terminate failed");
            let failure = Response::failure(
                ctx.next_adapter_seq(),
                request_seq,
                "terminate",
                error.to_string(),
            );
            let _ = ctx.send_event_to_client(failure.to_json()).await;
        }
    }

    async fn handle_terminate_inner(
        &self,
        request: Request,
        ctx: &AsyncContext,
    ) -> Result<(), KdapError> {
        let sb = SbFacade::new(ctx);
        let shutdown = self.graceful_shutdown.lock().unwrap().clone();

        match shutdown {
            Some(GracefulShutdown::Signal(name)) => {
                let signal = sb
                    .platform_signal_number(&name)
                    .await?
                    .ok_or_else(|| KdapError::handler("terminate", format!("backend does not support signal `{name}`")))?;
                if !self.process_running.load(Ordering::SeqCst) {
                    sb.process_resume().await?;
                    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                }
                sb.suppress_signal_stop_and_notify(signal).await?;
                sb.process_signal(signal).await?;
            }
            Some(GracefulShutdown::Commands(commands)) => {
                for command in &commands {
                    sb.cli(command).await?;
                }
            }
            None => {}
        }

        ctx.send_event_to_client(Response::success(ctx.next_adapter_seq(), request.seq, "terminate").to_json())
            .await?;
        Ok(())
    }
}

impl Default for DebugSession {
    fn default() -> Self {
        Self::new()
    }
}

fn console_output(seq: i64, text: impl Into<String>) -> serde_json::Value {
    Event::new(
        seq,
        EventBody::Output(OutputEventBody::new(OutputCategory::Console, text.into())),
    )
    .to_json()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_has_no_terminal_support_by_default() {
        let session = DebugSession::new();
        assert!(!session.client_supports_run_in_terminal());
    }
}
