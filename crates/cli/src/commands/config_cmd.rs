//! `citycode config`: print configuration as TOML.

use super::CliResult;
use citycode_config::AppConfig;
use std::path::Path;

/// Print the built-in defaults, or the effective config with API keys
/// redacted.
pub fn show(path: Option<&Path>, default: bool) -> CliResult {
    if default {
        println!("{}", AppConfig::default_toml());
        return Ok(());
    }

    let config = AppConfig::load_with(path).map_err(|e| format!("Failed to load config: {e}"))?;
    let source = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"));
    println!("# {}", source.display());
    println!("{}", config.redacted_toml());
    Ok(())
}
