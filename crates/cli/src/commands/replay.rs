//! `agentloop replay`: run a session against a recorded model script.

use agentloop_agent::{IterativeExecutor, Script, ScriptedProvider, SessionOutcome};
use agentloop_config::AppConfig;
use agentloop_core::action::{ActionRecord, ActionStatus};
use agentloop_core::message::Transcript;
use agentloop_core::permission::PermissionLevel;
use agentloop_core::session::{Session, SessionStatus, Step};
use agentloop_security::{AuditLogger, PermissionGate};
use std::fmt::Write;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub async fn run(
    script_path: &Path,
    level: Option<PermissionLevel>,
    max_steps: Option<usize>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let script = Script::load(script_path)?;

    let level = level
        .or(script.level)
        .unwrap_or(config.permission.default_level);
    let mut budget = config.executor.budget();
    if let Some(max_steps) = max_steps {
        if max_steps == 0 {
            return Err("--max-steps must be greater than 0".into());
        }
        budget.max_steps = max_steps;
    }

    std::fs::create_dir_all(&config.tools.workspace_dir)?;
    let registry = Arc::new(super::build_registry(&config)?);
    let audit = Arc::new(AuditLogger::tracing());
    let gate = Arc::new(PermissionGate::new(registry)?.with_audit(audit.clone()));
    let provider = Arc::new(ScriptedProvider::from_script(&script));

    let executor = IterativeExecutor::new(provider, gate)
        .with_audit(audit)
        .with_model(config.model.clone())
        .with_temperature(config.temperature)
        .with_max_tokens(config.max_tokens)
        .with_model_timeout(config.executor.model_timeout())
        .with_tool_timeout(config.executor.tool_timeout())
        .with_retry_backoff(config.executor.retry_backoff());

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let mut session = Session::new(level, budget);
    let mut transcript = Transcript::with_user(script.prompt.clone());
    let outcome = executor.run(&mut session, &mut transcript, &cancel).await?;

    if json {
        let report = serde_json::json!({
            "outcome": outcome,
            "steps": session.steps(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for step in session.steps() {
            print!("{}", render_step(step));
        }
        println!("{}", render_outcome(&outcome));
    }
    Ok(())
}

fn render_step(step: &Step) -> String {
    let mut out = format!("Step {} [{}]\n", step.index, step.permission_level);
    if let Some(line) = step.narration.lines().find(|l| !l.trim().is_empty()) {
        let _ = writeln!(out, "  {}", line.trim());
    }
    for record in &step.actions {
        let _ = writeln!(out, "  {}", render_action(record));
    }
    for error in &step.parse_errors {
        let _ = writeln!(out, "  ! {error}");
    }
    out
}

fn render_action(record: &ActionRecord) -> String {
    let head = format!("{:<8} {}", record.status.label(), record.tool_name());
    match &record.status {
        ActionStatus::Executed { .. } if record.attempts > 1 => {
            format!("{head} ({} attempts)", record.attempts)
        }
        ActionStatus::Skipped { reason } => format!("{head}: {reason}"),
        ActionStatus::Failed { error } => format!("{head}: {}", error.message),
        _ => head,
    }
}

fn render_outcome(outcome: &SessionOutcome) -> String {
    let mut out = match (&outcome.status, &outcome.reason) {
        (SessionStatus::Aborted { .. }, Some(reason)) => {
            format!("\nAborted after {} steps: {reason}", outcome.steps)
        }
        _ => format!("\nCompleted in {} steps", outcome.steps),
    };
    if let Some(narration) = &outcome.last_narration {
        let _ = write!(out, "\n\n{narration}");
    }
    out
}
