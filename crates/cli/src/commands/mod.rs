pub mod brain;
pub mod config_cmd;
pub mod run;

use citycode_config::AppConfig;
use citycode_core::provider::Provider;
use citycode_telemetry::{EventSink, JsonlSink, NullSink};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Load the config, failing early with setup instructions when no API key
/// is available.
pub fn load_config(path: Option<&Path>) -> CliResult<AppConfig> {
    let config = AppConfig::load_with(path).map_err(|e| format!("Failed to load config: {e}"))?;

    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    CITYCODE_API_KEY=...     (generic)");
        eprintln!("    OPENROUTER_API_KEY=...   (OpenRouter)");
        eprintln!("    OPENAI_API_KEY=...       (OpenAI direct)");
        eprintln!();
        eprintln!("  Or add `api_key` to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    Ok(config)
}

pub fn default_provider(config: &AppConfig) -> CliResult<Arc<dyn Provider>> {
    let router = citycode_providers::build_from_config(config)?;
    Ok(router.default_provider().ok_or("No default provider configured")?)
}

/// A JSONL trace file under `[trace].dir`, or a sink that drops everything
/// when tracing is disabled.
pub fn open_trace_sink(config: &AppConfig, prefix: &str) -> CliResult<(Arc<dyn EventSink>, Option<PathBuf>)> {
    if !config.trace.enabled {
        return Ok((Arc::new(NullSink), None));
    }
    let sink = JsonlSink::timestamped(&config.trace.dir, prefix)?;
    let path = sink.path().to_path_buf();
    Ok((Arc::new(sink), Some(path)))
}
