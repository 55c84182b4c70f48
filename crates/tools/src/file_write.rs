//! File write tool: create or overwrite a file.

use async_trait::async_trait;
use citycode_core::error::ToolError;
use citycode_core::tool::{Tool, ToolResult};
use std::path::PathBuf;
use tracing::debug;

pub struct WriteFileTool {
    root: PathBuf,
}

impl WriteFileTool {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_to_file"
    }

    fn description(&self) -> &str {
        "Write content to a file, creating parent directories as needed. Overwrites existing files."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path of the file to write"
                },
                "content": {
                    "type": "string",
                    "description": "Full content of the file"
                }
            },
            "required": ["file_path", "content"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let file_path = arguments["file_path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'file_path' argument".into()))?;
        let content = arguments["content"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'content' argument".into()))?;

        let path = crate::resolve_path(&self.root, file_path);
        if let Some(parent) = path.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            return Ok(ToolResult::failed(format!("Failed to create directory for {file_path}: {e}")));
        }

        match tokio::fs::write(&path, content).await {
            Ok(()) => {
                debug!(path = %path.display(), bytes = content.len(), "Wrote file");
                Ok(ToolResult::ok(format!(
                    "Successfully wrote {} characters to {file_path}",
                    content.chars().count()
                )))
            }
            Err(e) => Ok(ToolResult::failed(format!("Failed to write file {file_path}: {e}"))),
        }
    }
}
