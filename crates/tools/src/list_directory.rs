//! Directory listing tool.

use async_trait::async_trait;
use citycode_core::error::ToolError;
use citycode_core::tool::{Tool, ToolResult};
use std::path::PathBuf;

const MAX_ENTRIES: usize = 500;

pub struct ListDirectoryTool {
    root: PathBuf,
}

impl ListDirectoryTool {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn description(&self) -> &str {
        "List the entries of a directory. Directories are shown with a trailing slash."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory to list; defaults to the workspace root"
                }
            }
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let shown = arguments["path"].as_str().unwrap_or(".");
        let path = crate::resolve_path(&self.root, shown);

        let mut reader = match tokio::fs::read_dir(&path).await {
            Ok(r) => r,
            Err(e) => return Ok(ToolResult::failed(format!("Failed to list {shown}: {e}"))),
        };

        let mut entries = Vec::new();
        loop {
            match reader.next_entry().await {
                Ok(Some(entry)) => {
                    let name = entry.file_name().to_string_lossy().to_string();
                    let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
                    entries.push(if is_dir { format!("{name}/") } else { name });
                }
                Ok(None) => break,
                Err(e) => return Ok(ToolResult::failed(format!("Failed to list {shown}: {e}"))),
            }
        }
        entries.sort();

        let total = entries.len();
        entries.truncate(MAX_ENTRIES);
        let mut out = format!("=== {shown} ({total} entries) ===\n{}", entries.join("\n"));
        if total > MAX_ENTRIES {
            out.push_str(&format!("\n... ({} more entries)", total - MAX_ENTRIES));
        }
        Ok(ToolResult::ok(out))
    }
}
