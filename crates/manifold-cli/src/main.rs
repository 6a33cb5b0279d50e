//! Manifold CLI
//!
//! The `manifold` command runs one task through the role team and prints the
//! live event stream.
//!
//! ## Commands
//!
//! - `run`: Route a task through intake, planner, dispatcher and team
//! - `team`: List the configured team members
//! - `config`: Print the effective configuration with secrets redacted

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use manifold_core::metrics::METRICS;
use manifold_core::telemetry;
use manifold_core::{
    build_driver, ExternalEvent, ManifoldConfig, MemberKind, MessageDelta, RunReport, RunRequest,
    RunStatus,
};

#[derive(Parser)]
#[command(name = "manifold")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Multi-role task routing with a live event stream", long_about = None)]
struct Cli {
    /// Log at debug level, overriding the configured filter
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON log lines, overriding the configured format
    #[arg(long, global = true)]
    json: bool,

    /// Configuration file (TOML)
    #[arg(short, long, global = true, env = "MANIFOLD_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Route a task through the team and stream its progress
    Run {
        /// The task, as one or more words
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        /// Plan with the reasoning model
        #[arg(long)]
        deep_thinking: bool,

        /// Search the web before planning
        #[arg(long)]
        search: bool,

        /// Log every turn and the plan at info level
        #[arg(long)]
        debug: bool,

        /// Print raw events as JSON lines instead of text
        #[arg(long)]
        events: bool,
    },

    /// List the configured team members
    Team,

    /// Print the effective configuration with secrets redacted
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ManifoldConfig::resolve(cli.config.as_deref())
        .context("Failed to load manifold configuration")?;
    telemetry::init_tracing(&config.log.clone().with_flags(cli.json, cli.verbose));

    let result = match cli.command {
        Commands::Run {
            query,
            deep_thinking,
            search,
            debug,
            events,
        } => {
            let request = RunRequest::from_text(query.join(" "))
                .with_modes(deep_thinking, search)
                .with_debug(debug);
            cmd_run(&config, request, events).await
        }
        Commands::Team => cmd_team(&config),
        Commands::Config => cmd_config(&config),
    };

    METRICS.flush();
    result
}

/// Run one task, printing events until the run stops or Ctrl-C detaches.
async fn cmd_run(config: &ManifoldConfig, request: RunRequest, raw: bool) -> Result<()> {
    let driver = Arc::new(build_driver(config).context("Failed to assemble run driver")?);
    let mut handle = driver.spawn(request)?;
    info!(run_id = %handle.run_id, "run started");

    let mut stdout = std::io::stdout().lock();
    let mut at_line_start = true;
    loop {
        tokio::select! {
            event = handle.events.recv() => {
                let Some(event) = event else { break };
                if raw {
                    writeln!(stdout, "{}", serde_json::to_string(&event)?)?;
                } else if let Some(text) = render_event(&event, &mut at_line_start) {
                    write!(stdout, "{text}")?;
                }
                stdout.flush()?;
            }
            _ = tokio::signal::ctrl_c() => {
                warn!(run_id = %handle.run_id, "interrupted, cancelling run");
                break;
            }
        }
    }
    drop(handle.events);
    if !at_line_start {
        writeln!(stdout)?;
    }

    let report = handle.task.await.context("Run task panicked")?;
    summarize(&report)
}

/// Human-readable rendering of one event; `None` for events with no text.
fn render_event(event: &ExternalEvent, at_line_start: &mut bool) -> Option<String> {
    let line = match event {
        ExternalEvent::Message {
            delta: MessageDelta::Content(text),
            ..
        } => {
            *at_line_start = text.ends_with('\n');
            return Some(text.clone());
        }
        ExternalEvent::WorkflowStart { workflow_id, .. } => format!("== workflow {workflow_id}"),
        ExternalEvent::AgentStart { agent_name, .. } => format!("-- {agent_name}"),
        ExternalEvent::ToolCall {
            tool_name,
            tool_input,
            ..
        } => format!("   [{tool_name}] {tool_input}"),
        ExternalEvent::ToolCallResult {
            tool_name,
            tool_result,
            ..
        } => format!("   [{tool_name}] {} chars", tool_result.chars().count()),
        ExternalEvent::WorkflowEnd { messages, .. } => {
            format!("== done, {} messages in history", messages.len())
        }
        ExternalEvent::Error { kind, message, .. } => format!("!! {kind}: {message}"),
        ExternalEvent::Message {
            delta: MessageDelta::Reasoning(_),
            ..
        }
        | ExternalEvent::AgentEnd { .. }
        | ExternalEvent::LlmStart { .. }
        | ExternalEvent::LlmEnd { .. } => return None,
    };
    let prefix = if *at_line_start { "" } else { "\n" };
    *at_line_start = true;
    Some(format!("{prefix}{line}\n"))
}

fn summarize(report: &RunReport) -> Result<()> {
    match &report.status {
        RunStatus::Completed => {
            info!(
                run_id = %report.run_id,
                turns = report.turns,
                events = report.events_forwarded,
                "run completed"
            );
            Ok(())
        }
        RunStatus::Cancelled => {
            info!(run_id = %report.run_id, turns = report.turns, "run cancelled");
            Ok(())
        }
        RunStatus::Failed { kind, message } => {
            anyhow::bail!("run {} failed ({kind}): {message}", report.run_id)
        }
    }
}

fn cmd_team(config: &ManifoldConfig) -> Result<()> {
    let team = config.team()?;
    for member in team.members() {
        let kind = match member.kind {
            MemberKind::Executor => "executor",
            MemberKind::Reporter => "reporter",
        };
        println!("{:<12} {:<9} {}", member.name, kind, member.description);
    }
    Ok(())
}

fn cmd_config(config: &ManifoldConfig) -> Result<()> {
    print!("{}", config.redacted().to_toml()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_run_args_parse() {
        let cli = Cli::try_parse_from([
            "manifold",
            "--verbose",
            "run",
            "--deep-thinking",
            "What",
            "is",
            "2+2?",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Run {
                query,
                deep_thinking,
                search,
                ..
            } => {
                assert_eq!(query.join(" "), "What is 2+2?");
                assert!(deep_thinking);
                assert!(!search);
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_run_requires_query() {
        assert!(Cli::try_parse_from(["manifold", "run"]).is_err());
    }

    #[test]
    fn test_render_streams_content_and_breaks_lines() {
        let mut at_line_start = true;
        let start = ExternalEvent::AgentStart {
            agent_name: "planner".into(),
            agent_id: "r_planner_2".into(),
        };
        assert_eq!(
            render_event(&start, &mut at_line_start).as_deref(),
            Some("-- planner\n")
        );

        let chunk = ExternalEvent::Message {
            message_id: "m".into(),
            delta: MessageDelta::Content("{\"steps\"".into()),
        };
        assert_eq!(
            render_event(&chunk, &mut at_line_start).as_deref(),
            Some("{\"steps\"")
        );
        assert!(!at_line_start);

        let call = ExternalEvent::ToolCall {
            tool_call_id: "id".into(),
            tool_name: "web_search".into(),
            tool_input: json!({"query": "rust"}),
        };
        assert_eq!(
            render_event(&call, &mut at_line_start).as_deref(),
            Some("\n   [web_search] {\"query\":\"rust\"}\n")
        );
        assert!(at_line_start);
    }

    #[test]
    fn test_silent_events_render_nothing() {
        let mut at_line_start = true;
        let end = ExternalEvent::LlmEnd {
            agent_name: "planner".into(),
        };
        assert!(render_event(&end, &mut at_line_start).is_none());
    }

    #[test]
    fn test_failed_report_is_an_error() {
        let report = RunReport {
            run_id: "r".into(),
            status: RunStatus::Failed {
                kind: "capability".into(),
                message: "boom".into(),
            },
            turns: 0,
            events_forwarded: 3,
        };
        let err = summarize(&report).unwrap_err();
        assert!(format!("{err}").contains("capability"));
    }
}
