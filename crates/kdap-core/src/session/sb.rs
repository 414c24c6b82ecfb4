//! The SB facade (`spec.md` §4.5, §9 "scripted-SB value transport"): a
//! suspending API over the backend's scripting interpreter. Every
//! operation is one `evaluate` request with `context: "repl"` carrying a
//! `script <python-expr>` line, sent through the silent path so the
//! interpreter's own auto-display doesn't leak into the client's console.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use crate::error::KdapError;
use crate::message::Response;
use crate::router::AsyncContext;

/// Bound to one [`AsyncContext`] for the lifetime of a single orchestrated
/// operation (`handle_launch`, `handle_attach`, ...).
pub struct SbFacade<'a> {
    ctx: &'a AsyncContext,
}

impl<'a> SbFacade<'a> {
    pub fn new(ctx: &'a AsyncContext) -> Self {
        SbFacade { ctx }
    }

    /// Installs the reusable error-check helper referenced by every other
    /// operation's script (`spec.md` §4.5 step 1).
    pub async fn install_error_check_helper(&self) -> Result<(), KdapError> {
        self.script(
            "def __kdap_check(err):\n    if not err.Success(): raise Exception(err.GetCString())",
        )
        .await?;
        Ok(())
    }

    /// Applies a launch's `sourceMap` entries (`spec.md` §4.5 step 2
    /// "source-map setup") as one `settings set target.source-map`
    /// invocation, the same way a user would type it at the `lldb` prompt.
    /// Silently does nothing for a missing map or one with no string-valued
    /// entries.
    pub async fn set_source_map(&self, source_map: Option<&Value>) -> Result<(), KdapError> {
        let Some(object) = source_map.and_then(Value::as_object) else {
            return Ok(());
        };
        let mut command = String::from("settings set target.source-map");
        let mut had_pair = false;
        for (from, to) in object {
            let Some(to) = to.as_str() else { continue };
            command.push(' ');
            command.push_str(&quote_cli_arg(from));
            command.push(' ');
            command.push_str(&quote_cli_arg(to));
            had_pair = true;
        }
        if !had_pair {
            return Ok(());
        }
        self.cli(&command).await?;
        Ok(())
    }

    /// Applies one arbitrary `lldb` setting override (`spec.md` §4.5 step 2
    /// "per-settings overrides").
    pub async fn apply_setting(&self, name: &str, value: &str) -> Result<(), KdapError> {
        self.cli(&format!("settings set {name} {}", quote_cli_arg(value)))
            .await?;
        Ok(())
    }

    /// Configures how the backend's unix-signals object handles `signal`:
    /// let it reach the process (don't suppress), but don't stop or notify
    /// on receipt — used right before forcing delivery via
    /// [`Self::process_signal`] so the adapter's own termination doesn't
    /// re-enter the stop/notify path (`spec.md` §4.5 step 8 `terminate`).
    pub async fn suppress_signal_stop_and_notify(&self, signal_number: i64) -> Result<(), KdapError> {
        self.script(&format!(
            "process.GetUnixSignals().SetShouldSuppress({signal_number}, False); \
process.GetUnixSignals().SetShouldStop({signal_number}, False); \
process.GetUnixSignals().SetShouldNotify({signal_number}, False)"
        ))
        .await?;
        Ok(())
    }

    pub async fn target_create(&self, program: &str) -> Result<(), KdapError> {
        let result = self
            .script(&format!(
                "script debugger.CreateTarget({})",
                python_str(program)
            ))
            .await;
        if result.is_ok() {
            return Ok(());
        }
        // Windows: a bare program name without its extension fails to
        // resolve; retry with `.exe` appended before giving up.
        if !program.ends_with(".exe") {
            self.script(&format!(
                "script debugger.CreateTarget({})",
                python_str(&format!("{program}.exe"))
            ))
            .await?;
            return Ok(());
        }
        result.map(|_| ())
    }

    pub async fn new_launch_info(&self) -> Result<(), KdapError> {
        self.script("launch_info = lldb.SBLaunchInfo([])").await?;
        Ok(())
    }

    pub async fn launch_info_set_arguments(&self, args: &[String]) -> Result<(), KdapError> {
        let list = python_list(args);
        self.script(&format!("launch_info.SetArguments({list}, False)"))
            .await?;
        Ok(())
    }

    pub async fn launch_info_set_environment(
        &self,
        env: &BTreeMap<String, String>,
    ) -> Result<(), KdapError> {
        let entries: Vec<String> = env
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        let list = python_list(&entries);
        self.script(&format!("launch_info.SetEnvironmentEntries({list}, True)"))
            .await?;
        Ok(())
    }

    pub async fn launch_info_set_cwd(&self, cwd: &str) -> Result<(), KdapError> {
        self.script(&format!(
            "launch_info.SetWorkingDirectory({})",
            python_str(cwd)
        ))
        .await?;
        Ok(())
    }

    pub async fn launch_info_set_stop_at_entry(&self, stop: bool) -> Result<(), KdapError> {
        let flag = if stop { "lldb.eLaunchFlagStopAtEntry" } else { "0" };
        self.script(&format!(
            "launch_info.SetLaunchFlags(launch_info.GetLaunchFlags() | {flag})"
        ))
        .await?;
        Ok(())
    }

    pub async fn add_open_file_action(&self, fd: i32, path: &str) -> Result<(), KdapError> {
        self.script(&format!(
            "launch_info.AddOpenFileAction({fd}, {}, {}, {})",
            python_str(path),
            if fd == 0 { "True" } else { "False" },
            if fd == 0 { "False" } else { "True" },
        ))
        .await?;
        Ok(())
    }

    pub async fn target_launch(&self) -> Result<i64, KdapError> {
        let response = self
            .script("script target.Launch(launch_info, error); __kdap_check(error); process.GetProcessID()")
            .await?;
        parse_i64(&response)
    }

    pub async fn target_attach_by_pid(&self, pid: i64) -> Result<i64, KdapError> {
        self.script(&format!(
            "script attach_info = lldb.SBAttachInfo({pid})"
        ))
        .await?;
        let response = self
            .script("script target.Attach(attach_info, error); __kdap_check(error); process.GetProcessID()")
            .await?;
        parse_i64(&response)
    }

    pub async fn target_attach_by_name(
        &self,
        name: &str,
        wait_for: bool,
    ) -> Result<i64, KdapError> {
        self.script(&format!(
            "script attach_info = lldb.SBAttachInfo({}, {})",
            python_str(name),
            if wait_for { "True" } else { "False" }
        ))
        .await?;
        let response = self
            .script("script target.Attach(attach_info, error); __kdap_check(error); process.GetProcessID()")
            .await?;
        parse_i64(&response)
    }

    pub async fn process_resume(&self) -> Result<(), KdapError> {
        self.script("script process.Continue()").await?;
        Ok(())
    }

    pub async fn process_kill(&self) -> Result<(), KdapError> {
        self.script("script process.Kill()").await?;
        Ok(())
    }

    pub async fn process_detach(&self) -> Result<(), KdapError> {
        self.script("script process.Detach()").await?;
        Ok(())
    }

    pub async fn process_signal(&self, signal_number: i64) -> Result<(), KdapError> {
        self.script(&format!("script process.Signal({signal_number})"))
            .await?;
        Ok(())
    }

    pub async fn platform_signal_number(&self, name: &str) -> Result<Option<i64>, KdapError> {
        let response = self
            .script(&format!(
                "script target.GetPlatform().GetUnixSignals().GetSignalNumberFromName({})",
                python_str(name)
            ))
            .await?;
        Ok(parse_i64(&response).ok())
    }

    /// Runs a raw CLI command (not a `script` line) through the facade's
    /// silent path — used for `initCommands`/`preRunCommands`/etc, which
    /// `spec.md` §4.5 describes as "raw CLI via `context: repl`".
    pub async fn cli(&self, command: &str) -> Result<Response, KdapError> {
        self.evaluate_silent(command).await
    }

    async fn script(&self, expression: &str) -> Result<String, KdapError> {
        let response = self
            .evaluate_silent(&format!("script {expression}"))
            .await?;
        Ok(extract_result(&response))
    }

    async fn evaluate_silent(&self, expression: &str) -> Result<Response, KdapError> {
        let request = json!({
            "type": "request",
            "command": "evaluate",
            "arguments": {"expression": expression, "context": "repl"},
        });
        let response = self
            .ctx
            .send_silent_request_to_backend_and_await(request)
            .await?;
        if !response.success {
            return Err(KdapError::backend(
                "evaluate",
                response
                    .message
                    .clone()
                    .unwrap_or_else(|| "scripted command failed".to_string()),
            ));
        }
        Ok(response)
    }
}

fn extract_result(response: &Response) -> String {
    response
        .body
        .as_ref()
        .and_then(|body| body.get("result"))
        .and_then(Value::as_str)
        .map(unescape_python_repr)
        .unwrap_or_default()
}

fn parse_i64(text: &str) -> Result<i64, KdapError> {
    text.trim()
        .parse()
        .map_err(|_| KdapError::handler("evaluate", format!("expected an integer result, got `{text}`")))
}

/// lldb-dap's auto-display channel places `repr()` of the result into the
/// response body's `result` field — quoted and escaped the way Python's
/// `repr()` renders a string (`spec.md` §9). Strips the surrounding quotes
/// and unescapes the handful of sequences `repr()` actually produces.
fn unescape_python_repr(raw: &str) -> String {
    let trimmed = raw.trim();
    let body = match (trimmed.strip_prefix('\''), trimmed.strip_prefix('"')) {
        (Some(rest), _) => rest.strip_suffix('\'').unwrap_or(rest),
        (_, Some(rest)) => rest.strip_suffix('"').unwrap_or(rest),
        _ => trimmed,
    };

    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn python_str(value: &str) -> String {
    format!("{:?}", value)
}

fn python_list(values: &[String]) -> String {
    let quoted: Vec<String> = values.iter().map(|v| python_str(v)).collect();
    format!("[{}]", quoted.join(", "))
}

/// Quotes one token for the raw `lldb` command line (not a Python
/// expression): wraps in double quotes and escapes embedded quotes/
/// backslashes only when the value needs it, matching how a user would
/// quote an argument containing spaces at the `lldb` prompt.
fn quote_cli_arg(value: &str) -> String {
    if value.is_empty() || value.chars().any(char::is_whitespace) {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unescapes_simple_repr_strings() {
        assert_eq!(unescape_python_repr("'hello'"), "hello");
        assert_eq!(unescape_python_repr("'line one\\nline two'"), "line one\nline two");
        assert_eq!(unescape_python_repr("\"quoted\\\"inner\\\"\""), "quoted\"inner\"");
    }

    #[test]
    fn leaves_unquoted_numeric_text_untouched() {
        assert_eq!(unescape_python_repr("4242"), "4242");
    }

    #[test]
    fn quote_cli_arg_only_quotes_when_needed() {
        assert_eq!(quote_cli_arg("/build/src"), "/build/src");
        assert_eq!(quote_cli_arg("/path with spaces"), "\"/path with spaces\"");
        assert_eq!(quote_cli_arg("has\"quote"), "\"has\\\"quote\"");
    }
}
