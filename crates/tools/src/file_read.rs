//! File read tool: read a window of lines from a text file.

use async_trait::async_trait;
use citycode_core::error::ToolError;
use citycode_core::tool::{Tool, ToolResult};
use std::path::PathBuf;

pub struct ReadFileTool {
    root: PathBuf,
    max_lines: usize,
}

impl ReadFileTool {
    pub fn new(root: PathBuf, max_lines: usize) -> Self {
        Self { root, max_lines }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read lines from a text file. Returns at most max_lines lines starting at start_line (1-based)."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path of the file to read"
                },
                "start_line": {
                    "type": "integer",
                    "description": "First line to return, 1-based (default 1)"
                },
                "max_lines": {
                    "type": "integer",
                    "description": "Maximum number of lines to return"
                }
            },
            "required": ["file_path"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let file_path = arguments["file_path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'file_path' argument".into()))?;
        let start_line = arguments["start_line"]
            .as_u64()
            .map_or(1, |n| usize::try_from(n).unwrap_or(usize::MAX))
            .max(1);
        let max_lines = arguments["max_lines"]
            .as_u64()
            .map(|n| usize::try_from(n).unwrap_or(usize::MAX))
            .unwrap_or(self.max_lines)
            .max(1);

        let path = crate::resolve_path(&self.root, file_path);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) => return Ok(ToolResult::failed(format!("Failed to read file {file_path}: {e}"))),
        };

        let lines: Vec<&str> = content.lines().collect();
        let total = lines.len();
        if total == 0 {
            return Ok(ToolResult::ok(format!("=== {file_path} (empty file) ===")));
        }
        if start_line > total {
            return Ok(ToolResult::failed(format!(
                "start_line {start_line} is past the end of {file_path} ({total} lines)"
            )));
        }

        let end = start_line.saturating_add(max_lines - 1).min(total);
        let mut out = format!("=== {file_path} (lines {start_line}-{end}) ===\n");
        out.push_str(&lines[start_line - 1..end].join("\n"));
        if end < total {
            out.push_str(&format!("\n... ({} more lines available)", total - end));
        }
        Ok(ToolResult::ok(out))
    }
}
