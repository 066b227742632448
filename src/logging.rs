use std::fs::OpenOptions;
use std::io::{IsTerminal, Write};

const DEFAULT_SESSION_LOG_PATH: &str = "/tmp/vex-session-debug.log";
const DEBUG_SESSION_ENV: &str = "VEX_DEBUG_SESSION";
const SESSION_LOG_PATH_ENV: &str = "VEX_SESSION_LOG_PATH";

pub fn debug_session_enabled() -> bool {
    std::env::var(DEBUG_SESSION_ENV)
        .ok()
        .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

/// Records one session-level event when `VEX_DEBUG_SESSION` is set.
pub fn emit_session_event(scope: &str, event: &str, detail: &str) {
    if !debug_session_enabled() {
        return;
    }
    let message = format!("VEX_SESSION DEBUG {event} scope={scope} {detail}\n");
    emit_log_message(&message);
}

/// Records an operation rejected with `InvalidState`.
pub fn emit_rejected_operation(scope: &str, operation: &str, reason: &str) {
    if !debug_session_enabled() {
        return;
    }
    let message =
        format!("VEX_SESSION WARN rejected_operation scope={scope} op={operation} reason={reason}\n");
    emit_log_message(&message);
}

pub fn emit_sse_parse_error(
    event_type: Option<&str>,
    json_data: &str,
    parse_error: &serde_json::Error,
) {
    let message = format!(
        "VEX_SESSION ERROR sse_parse_failed error={parse_error}\nevent_type={}\ndata:\n{json_data}\n",
        event_type.unwrap_or("<none>")
    );
    emit_log_message(&message);
}

fn emit_log_message(message: &str) {
    if let Some(path) = resolve_log_path() {
        if append_log_file(&path, message).is_ok() {
            return;
        }
    }

    eprint!("{message}");
}

fn resolve_log_path() -> Option<String> {
    std::env::var(SESSION_LOG_PATH_ENV)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| {
            if std::io::stderr().is_terminal() {
                Some(DEFAULT_SESSION_LOG_PATH.to_string())
            } else {
                None
            }
        })
}

fn append_log_file(path: &str, message: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(message.as_bytes())
}
