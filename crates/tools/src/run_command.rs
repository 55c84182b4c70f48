//! Shell tool: execute a command with a timeout.
//!
//! The output the model sees has three parts: stdout, stderr under an
//! `ERROR OUTPUT:` heading, and the exit code. A non-zero exit marks the
//! result as failed.

use async_trait::async_trait;
use citycode_core::error::ToolError;
use citycode_core::tool::{FAILED_MARKER, Tool, ToolResult};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

pub struct RunCommandTool {
    root: PathBuf,
    default_timeout: Duration,
}

impl RunCommandTool {
    pub fn new(root: PathBuf, default_timeout: Duration) -> Self {
        Self { root, default_timeout }
    }

    fn format_output(stdout: &str, stderr: &str, code: i32) -> String {
        let mut out = String::new();
        if !stdout.trim().is_empty() {
            out.push_str(stdout.trim_end());
            out.push('\n');
        }
        if !stderr.trim().is_empty() {
            out.push_str("ERROR OUTPUT:\n");
            out.push_str(stderr.trim_end());
            out.push('\n');
        }
        out.push_str(&format!("Exit Code: {code}"));
        out
    }
}

#[async_trait]
impl Tool for RunCommandTool {
    fn name(&self) -> &str {
        "run_command"
    }

    fn description(&self) -> &str {
        "Run a shell command and return its stdout, stderr and exit code. Use for building, testing, searching and inspecting the system."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                },
                "run_in_directory": {
                    "type": "string",
                    "description": "Directory to run in; defaults to the workspace root"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Seconds before the command is killed"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let command = arguments["command"]
            .as_str()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'command' argument".into()))?;

        let dir = arguments["run_in_directory"]
            .as_str()
            .map(|d| crate::resolve_path(&self.root, d))
            .unwrap_or_else(|| self.root.clone());

        let timeout = arguments["timeout"]
            .as_u64()
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout);

        debug!(command = %command, dir = %dir.display(), "Executing shell command");

        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", command]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", command]);
            c
        };
        cmd.current_dir(&dir)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ToolError::ExecutionFailed {
                    tool_name: "run_command".into(),
                    reason: format!("could not start '{command}' in {}: {e}", dir.display()),
                });
            }
            Err(_) => {
                warn!(command = %command, timeout_secs = timeout.as_secs(), "Command timed out");
                return Err(ToolError::Timeout {
                    tool_name: "run_command".into(),
                    timeout_secs: timeout.as_secs(),
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let code = output.status.code().unwrap_or(-1);
        let text = Self::format_output(&stdout, &stderr, code);

        if output.status.success() {
            Ok(ToolResult::ok(text))
        } else {
            warn!(command = %command, exit_code = code, "Command failed");
            Ok(ToolResult::failed(format!("{FAILED_MARKER} (exit code {code})\n{text}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use citycode_core::tool::render_tool_outcome;

    fn tool_in(dir: &std::path::Path) -> RunCommandTool {
        RunCommandTool::new(dir.to_path_buf(), Duration::from_secs(10))
    }

    #[tokio::test]
    async fn pwd_reports_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let canonical = dir.path().canonicalize().unwrap();
        let result = tool_in(&canonical)
            .execute(serde_json::json!({"command": "pwd"}))
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.output.contains(canonical.to_str().unwrap()));
        assert!(result.output.ends_with("Exit Code: 0"));
    }

    #[tokio::test]
    async fn stderr_and_exit_code_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let result = tool_in(dir.path())
            .execute(serde_json::json!({"command": "echo out; echo oops 1>&2; exit 3"}))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.output.starts_with("FAILED (exit code 3)"));
        assert!(result.output.contains("out\nERROR OUTPUT:\noops"));
        assert!(result.output.ends_with("Exit Code: 3"));
    }

    #[tokio::test]
    async fn invalid_command_yields_descriptive_text() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = tool_in(dir.path())
            .execute(serde_json::json!({"command": "definitely_not_a_real_command_42"}))
            .await;
        let text = render_tool_outcome(outcome);
        assert!(text.starts_with("FAILED"));
        assert!(text.contains("Exit Code: 127"));
    }

    #[tokio::test]
    async fn run_in_subdirectory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/marker.txt"), "x").unwrap();
        let result = tool_in(dir.path())
            .execute(serde_json::json!({"command": "ls", "run_in_directory": "sub"}))
            .await
            .unwrap();
        assert!(result.output.contains("marker.txt"));
    }

    #[tokio::test]
    async fn timeout_is_an_error_that_renders_as_text() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = tool_in(dir.path())
            .execute(serde_json::json!({"command": "sleep 5", "timeout": 1}))
            .await;
        assert!(matches!(outcome, Err(ToolError::Timeout { timeout_secs: 1, .. })));
        assert!(render_tool_outcome(outcome).contains("timed out"));
    }

    #[tokio::test]
    async fn missing_command_argument() {
        let dir = tempfile::tempdir().unwrap();
        let result = tool_in(dir.path()).execute(serde_json::json!({})).await;
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }
}
