//! `citycode brain`: a Brain/Worker session against one target.

use super::{CliResult, default_provider, load_config, open_trace_sink};
use citycode_agent::{BrainOrchestrator, BrainProgress};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

pub async fn run(
    config_path: Option<&Path>,
    target: String,
    goal: String,
    prompt: Option<String>,
    prompt_file: Option<PathBuf>,
    max_iterations: Option<u32>,
) -> CliResult {
    let mut config = load_config(config_path)?;
    if let Some(n) = max_iterations {
        if n == 0 {
            return Err("--max-iterations must be > 0".into());
        }
        config.brain.max_iterations = n;
    }

    let brain_prompt = match (prompt, prompt_file) {
        (Some(prompt), _) => Some(prompt),
        (None, Some(path)) => Some(
            std::fs::read_to_string(&path)
                .map_err(|e| format!("Failed to read prompt file {}: {e}", path.display()))?,
        ),
        (None, None) => None,
    };

    let (sink, trace_path) = open_trace_sink(&config, "brain_trace")?;
    let provider = default_provider(&config)?;
    let tools = Arc::new(citycode_tools::default_registry(&config.tools));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut orchestrator = BrainOrchestrator::from_config(
        &config,
        &target,
        &goal,
        Arc::clone(&provider),
        provider,
        tools,
        sink,
    )
    .with_progress(tx);
    if let Some(prompt) = brain_prompt {
        orchestrator = orchestrator.with_brain_prompt(prompt);
    }

    println!();
    println!("  citycode: brain session {}", orchestrator.session_id());
    println!();
    println!("  Target:          {target}");
    println!("  Goal:            {goal}");
    println!("  Max iterations:  {}", config.brain.max_iterations);
    if let Some(path) = &trace_path {
        println!("  Trace:           {}", path.display());
    }
    println!();

    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            print_progress(&event);
        }
    });

    let outcome = orchestrator.run().await;
    // Dropping the orchestrator closes the channel so the printer drains and ends
    drop(orchestrator);
    if let Err(e) = printer.await {
        tracing::warn!(error = %e, "Progress printer stopped unexpectedly");
    }

    println!();
    println!("{}", outcome.text());
    if let Some(path) = &trace_path {
        println!();
        println!("  Trace saved to {}", path.display());
    }

    match outcome.error {
        Some(error) => Err(error.into()),
        None => Ok(()),
    }
}

fn print_progress(event: &BrainProgress) {
    match event {
        BrainProgress::IterationStarted {
            iteration,
            max_iterations,
            phase,
            open_ports,
            findings,
        } => {
            println!("  ── Iteration {iteration}/{max_iterations} ── phase {phase}, {open_ports} open ports, {findings} findings");
        }
        BrainProgress::Decision { text, .. } => {
            println!("  Brain  > {}", first_line(text));
        }
        BrainProgress::WorkerResult { text, .. } => {
            println!("  Worker > {}", first_line(text));
        }
        BrainProgress::StateUpdated { state, .. } => {
            for line in state.context_block().lines().skip(2) {
                println!("           {line}");
            }
            println!();
        }
        BrainProgress::Finished { reason } => {
            println!("  Session finished ({})", reason.as_str());
        }
        BrainProgress::Failed { error } => {
            eprintln!("  [Error] {error}");
        }
    }
}

/// First line of `text`, marked when more follows.
fn first_line(text: &str) -> String {
    let mut lines = text.trim().lines();
    let first = lines.next().unwrap_or_default();
    if lines.next().is_some() {
        format!("{first} …")
    } else {
        first.to_string()
    }
}
