//! Built-in tool implementations for citycode.
//!
//! Tools give the agent the ability to act on the machine it runs on:
//! run shell commands, read and write files, list directories. Relative
//! paths resolve against a workspace root.

pub mod file_read;
pub mod file_write;
pub mod list_directory;
pub mod run_command;

use citycode_config::ToolsConfig;
use citycode_core::tool::ToolRegistry;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use file_read::ReadFileTool;
pub use file_write::WriteFileTool;
pub use list_directory::ListDirectoryTool;
pub use run_command::RunCommandTool;

/// Create the registry of built-in tools from configuration.
pub fn default_registry(config: &ToolsConfig) -> ToolRegistry {
    let root = config
        .workspace
        .clone()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    let mut registry = ToolRegistry::new();
    registry.register(Box::new(RunCommandTool::new(
        root.clone(),
        Duration::from_secs(config.command_timeout_secs),
    )));
    registry.register(Box::new(ReadFileTool::new(root.clone(), config.max_read_lines)));
    registry.register(Box::new(WriteFileTool::new(root.clone())));
    registry.register(Box::new(ListDirectoryTool::new(root)));
    registry
}

/// Resolve `path` against `root` unless it is already absolute.
pub(crate) fn resolve_path(root: &Path, path: &str) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() { p.to_path_buf() } else { root.join(p) }
}
