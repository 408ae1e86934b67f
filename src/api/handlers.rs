use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use super::AppState;
use crate::launch;

/// Longest command output returned by the buffered runner.
const MAX_COMMAND_OUTPUT: usize = 20_000;

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub cmd: String,
    #[serde(default)]
    pub cwd: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CommandResponse {
    pub output: String,
    #[serde(rename = "exitCode")]
    pub exit_code: i32,
}

pub(super) async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "app": "omnihost",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Synchronous one-shot command execution: runs to completion and returns
/// the buffered combined output. Distinct code path from the streaming
/// terminal; only the launcher is shared. Launch failures come back as a
/// normal response with `exitCode: -1`, never a 5xx.
pub(super) async fn command(
    State(state): State<AppState>,
    Json(req): Json<CommandRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    if req.cmd.trim().is_empty() {
        return Err(ApiError::InvalidRequest("cmd is required".into()));
    }

    tracing::info!(cmd = %req.cmd, "executing command");
    let root = state.project_root.project_root();
    match launch::run_buffered(&req.cmd, req.cwd.as_deref(), root.as_deref()).await {
        Ok((output, exit_code)) => Ok(Json(CommandResponse {
            output: truncate_output(output),
            exit_code,
        })),
        Err(e) => {
            tracing::warn!(cmd = %req.cmd, error = %e, "command failed to run");
            Ok(Json(CommandResponse {
                output: e.to_string(),
                exit_code: -1,
            }))
        }
    }
}

fn truncate_output(mut output: String) -> String {
    if output.len() > MAX_COMMAND_OUTPUT {
        let mut cut = MAX_COMMAND_OUTPUT;
        while !output.is_char_boundary(cut) {
            cut -= 1;
        }
        output.truncate(cut);
        output.push_str("\n...truncated...");
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_output_untouched() {
        assert_eq!(truncate_output("hello".to_string()), "hello");
    }

    #[test]
    fn long_output_is_capped_with_marker() {
        let long = "x".repeat(MAX_COMMAND_OUTPUT + 500);
        let truncated = truncate_output(long);
        assert!(truncated.ends_with("\n...truncated..."));
        assert!(truncated.len() < MAX_COMMAND_OUTPUT + 100);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        // Multi-byte characters straddling the cap must not cause a panic.
        let long = "é".repeat(MAX_COMMAND_OUTPUT);
        let truncated = truncate_output(long);
        assert!(truncated.ends_with("\n...truncated..."));
    }

    #[test]
    fn command_response_uses_camel_case_exit_code() {
        let json = serde_json::to_value(CommandResponse {
            output: "hi\n".to_string(),
            exit_code: 0,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"output": "hi\n", "exitCode": 0}));
    }
}
