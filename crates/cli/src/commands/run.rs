//! `citycode run`: one task, or a line-per-task interactive loop.

use super::{CliResult, default_provider, load_config, open_trace_sink};
use citycode_agent::{ContextMode, PromptBuilder, StaticContext, TaskOrchestrator};
use citycode_config::{AgentRole, AppConfig};
use citycode_telemetry::EventSink;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

pub async fn run(
    config_path: Option<&Path>,
    prompt: Option<String>,
    context_mode: Option<String>,
    context_file: Option<PathBuf>,
) -> CliResult {
    let config = load_config(config_path)?;
    let mode: ContextMode = context_mode
        .as_deref()
        .unwrap_or(&config.agent.context_mode)
        .parse()?;

    let (sink, trace_path) = open_trace_sink(&config, "trace")?;
    if let Some(path) = &trace_path {
        eprintln!("  Trace: {}", path.display());
    }

    let orchestrator = build_orchestrator(&config, mode, context_file.as_deref(), sink).await?;

    if let Some(prompt) = prompt {
        eprint!("  Thinking...");
        let result = orchestrator.execute_task(&prompt).await;
        eprint!("\r              \r");
        println!("{}", result?);
        return Ok(());
    }

    println!();
    println!("  citycode: interactive mode");
    println!();
    println!("  Provider:  {}", config.default_provider);
    println!("  Model:     {}", config.default_model);
    println!("  Context:   {mode}");
    println!();
    println!("  Type a task and press Enter. Type 'exit' or 'quit' to leave.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if is_exit(line) {
            break;
        }

        eprint!("  ...");
        let result = orchestrator.execute_task(line).await;
        eprint!("\r     \r");
        match result {
            Ok(answer) => {
                println!();
                for l in answer.lines() {
                    println!("  Agent > {l}");
                }
                println!();
            }
            Err(e) => {
                eprintln!("  [Error] {e}");
                println!();
            }
        }
    }

    println!();
    println!("  Goodbye!");
    Ok(())
}

fn is_exit(line: &str) -> bool {
    line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit")
}

async fn build_orchestrator(
    config: &AppConfig,
    mode: ContextMode,
    context_file: Option<&Path>,
    sink: Arc<dyn EventSink>,
) -> CliResult<TaskOrchestrator> {
    let provider = default_provider(config)?;
    let tools = Arc::new(citycode_tools::default_registry(&config.tools));
    let memory = citycode_memory::open_store(&config.memory.backend, config.memory.path.clone()).await?;

    let mut builder = PromptBuilder::new(mode);
    if let Some(prompt) = &config.agent.system_prompt {
        builder = builder.with_system_prompt(prompt);
    }

    let mut orchestrator = TaskOrchestrator::new(provider, tools, memory, sink)
        .with_prompt_builder(builder)
        .with_llm(config.resolve_llm(AgentRole::Default))
        .with_agent_config(&config.agent)
        .with_concurrency(config.batch.concurrency);

    if let Some(path) = context_file {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read context file {}: {e}", path.display()))?;
        orchestrator = orchestrator.with_context(Arc::new(StaticContext::new("file", text)));
    }

    Ok(orchestrator)
}
