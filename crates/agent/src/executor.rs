//! The iterative executor.
//!
//! Drives one session as an explicit state machine:
//!
//! ```text
//! AwaitingModel -> Parsing -> Filtering -> Executing -> Recording -> AwaitingModel
//!                                                               \-> Terminated
//! ```
//!
//! Every model turn becomes exactly one recorded [`Step`], whatever happened
//! to its actions. Cancellation is honored before each model call and
//! before each tool invocation; actions already finished are still recorded.

use agentloop_core::action::{
    ActionFailure, ActionRecord, ActionRequest, ActionStatus, FailureKind, SkipReason,
};
use agentloop_core::clock::{Clock, SystemClock};
use agentloop_core::error::{Error, ProviderError, ToolError};
use agentloop_core::event::{DomainEvent, EventBus};
use agentloop_core::message::{Message, Transcript};
use agentloop_core::permission::PermissionLevel;
use agentloop_core::provider::{Provider, ProviderRequest};
use agentloop_core::session::{AbortReason, Budget, Session, SessionStatus, Step};
use agentloop_core::tool::{Allowlist, Tool, ToolResult};
use agentloop_security::{
    AuditEvent, AuditLogger, AuditOutcome, PermissionGate, PermissionSource, RejectReason,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dedup::{ActionDeduplicator, Decision};
use crate::parser::{ParsedResponse, ResponseParser};
use crate::prompt;
use crate::recorder::StepRecorder;

/// What the caller gets back when a session stops.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionOutcome {
    pub session_id: String,
    pub status: SessionStatus,
    /// Present when the session was aborted.
    pub reason: Option<AbortReason>,
    /// The last non-empty narration the model produced.
    pub last_narration: Option<String>,
    pub steps: usize,
}

impl SessionOutcome {
    pub fn of(session: &Session) -> Self {
        let reason = match session.status() {
            SessionStatus::Aborted { reason } => Some(reason.clone()),
            _ => None,
        };
        Self {
            session_id: session.id().to_string(),
            status: session.status().clone(),
            reason,
            last_narration: session.last_narration().map(str::to_string),
            steps: session.steps().len(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == SessionStatus::Completed
    }
}

/// The step being assembled.
struct Turn {
    index: usize,
    level: PermissionLevel,
    response: String,
    parsed: ParsedResponse,
    records: Vec<ActionRecord>,
    /// (tool, reason) for each permission refusal.
    rejected: Vec<(String, String)>,
    /// Set when parsing already decided the session's fate.
    verdict: Option<SessionStatus>,
}

impl Turn {
    fn new(index: usize, level: PermissionLevel, response: String) -> Self {
        Self {
            index,
            level,
            response,
            parsed: ParsedResponse::default(),
            records: Vec::new(),
            rejected: Vec::new(),
            verdict: None,
        }
    }
}

enum State {
    AwaitingModel,
    Parsing(Turn),
    Filtering(Turn),
    Executing(Turn),
    Recording(Turn),
    Terminated(SessionStatus),
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            Self::AwaitingModel => "awaiting_model",
            Self::Parsing(_) => "parsing",
            Self::Filtering(_) => "filtering",
            Self::Executing(_) => "executing",
            Self::Recording(_) => "recording",
            Self::Terminated(_) => "terminated",
        }
    }
}

/// Counters that live for one `run` call.
#[derive(Default)]
struct Streaks {
    parse_failures: u32,
    unproductive_steps: u32,
}

/// Orchestrates model calls, parsing, permission filtering, deduplication,
/// tool execution and step recording for a session.
///
/// One executor can run any number of sessions, one `run` call per session
/// at a time; the registry and gate it holds are shared read-only.
pub struct IterativeExecutor {
    provider: Arc<dyn Provider>,
    gate: Arc<PermissionGate>,
    parser: ResponseParser,
    dedup: ActionDeduplicator,
    permission: Option<Arc<dyn PermissionSource>>,
    clock: Arc<dyn Clock>,
    event_bus: Arc<EventBus>,
    audit: Option<Arc<AuditLogger>>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    model_timeout: Duration,
    tool_timeout: Duration,
    retry_backoff: Duration,
}

impl IterativeExecutor {
    pub fn new(provider: Arc<dyn Provider>, gate: Arc<PermissionGate>) -> Self {
        let registry = gate.registry().clone();
        Self {
            provider,
            parser: ResponseParser::with_registry(registry.clone()),
            dedup: ActionDeduplicator::new(registry),
            gate,
            permission: None,
            clock: Arc::new(SystemClock),
            event_bus: Arc::new(EventBus::default()),
            audit: None,
            model: "default".into(),
            temperature: 0.7,
            max_tokens: None,
            model_timeout: Duration::from_secs(60),
            tool_timeout: Duration::from_secs(30),
            retry_backoff: Duration::from_millis(250),
        }
    }

    /// Read the permission level from `source` at the start of every step.
    /// Without one, the session's own level is used.
    pub fn with_permission_source(mut self, source: Arc<dyn PermissionSource>) -> Self {
        self.permission = Some(source);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = timeout;
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    /// Base delay between retries; doubles after each failed attempt.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn gate(&self) -> &Arc<PermissionGate> {
        &self.gate
    }

    pub fn dedup(&self) -> &ActionDeduplicator {
        &self.dedup
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Run `session` until it terminates.
    ///
    /// `transcript` must already hold the user's request; model turns, tool
    /// observations and corrective feedback are appended to it as the
    /// session progresses. Aborts are reported through the outcome. `Err`
    /// is returned only when the step history contract is broken.
    pub async fn run(
        &self,
        session: &mut Session,
        transcript: &mut Transcript,
        cancel: &CancellationToken,
    ) -> Result<SessionOutcome, Error> {
        if session.status().is_terminal() {
            return Ok(SessionOutcome::of(session));
        }

        let mut recorder = StepRecorder::for_session(session)?
            .with_event_bus(self.event_bus.clone());
        let mut streaks = Streaks::default();
        let mut state = State::AwaitingModel;

        info!(
            session_id = %session.id(),
            level = %session.permission_level(),
            max_steps = session.budget().max_steps,
            "Starting session"
        );

        loop {
            debug!(session_id = %session.id(), state = state.name(), "Executor state");
            state = match state {
                State::AwaitingModel => self.await_model(session, transcript, cancel).await,
                State::Parsing(turn) => self.parse(turn, session.budget(), &mut streaks, transcript),
                State::Filtering(turn) => self.filter(turn, session),
                State::Executing(turn) => self.execute(turn, session, cancel).await,
                State::Recording(turn) => {
                    self.record(turn, session, transcript, &mut recorder, &mut streaks, cancel)?
                }
                State::Terminated(status) => {
                    self.terminate(session, status);
                    return Ok(SessionOutcome::of(session));
                }
            };
        }
    }

    async fn await_model(
        &self,
        session: &mut Session,
        transcript: &mut Transcript,
        cancel: &CancellationToken,
    ) -> State {
        if cancel.is_cancelled() {
            return aborted(AbortReason::Cancelled);
        }
        let budget = *session.budget();
        if session.steps().len() >= budget.max_steps {
            return aborted(AbortReason::BudgetExhausted {
                max_steps: budget.max_steps,
            });
        }

        let level = self
            .permission
            .as_ref()
            .map_or(session.permission_level(), |p| p.current_level());
        if level != session.permission_level() {
            info!(
                session_id = %session.id(),
                from = %session.permission_level(),
                to = %level,
                "Permission level changed"
            );
            session.set_permission_level(level);
        }

        let empty = Allowlist::default();
        let allowlist = self.gate.allowlist(level).unwrap_or(&empty);
        transcript.set_system(prompt::system_prompt(level, allowlist));

        let request = ProviderRequest {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            ..ProviderRequest::from_transcript(self.model.clone(), transcript)
        };

        let attempts = 1 + budget.max_model_retries;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let call = tokio::time::timeout(self.model_timeout, self.provider.complete(request.clone()));
            let result = tokio::select! {
                _ = cancel.cancelled() => return aborted(AbortReason::Cancelled),
                result = call => result.unwrap_or_else(|_| {
                    Err(ProviderError::Timeout(format!(
                        "no response within {}ms",
                        self.model_timeout.as_millis()
                    )))
                }),
            };

            match result {
                Ok(response) => {
                    debug!(
                        session_id = %session.id(),
                        step = session.next_step_index(),
                        chars = response.content.len(),
                        "Model responded"
                    );
                    transcript.push(Message::assistant(response.content.clone()));
                    return State::Parsing(Turn::new(
                        session.next_step_index(),
                        level,
                        response.content,
                    ));
                }
                Err(e) if e.is_transient() && attempt < attempts => {
                    warn!(
                        session_id = %session.id(),
                        attempt,
                        error = %e,
                        "Model call failed, retrying"
                    );
                    let delay = self.backoff(attempt);
                    tokio::select! {
                        _ = cancel.cancelled() => return aborted(AbortReason::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => {
                    warn!(session_id = %session.id(), attempt, error = %e, "Model unavailable");
                    return aborted(AbortReason::Transport {
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    fn parse(
        &self,
        mut turn: Turn,
        budget: &Budget,
        streaks: &mut Streaks,
        transcript: &mut Transcript,
    ) -> State {
        turn.parsed = self.parser.parse(&turn.response);

        if turn.parsed.is_unparseable() {
            streaks.parse_failures += 1;
            if streaks.parse_failures > budget.max_parse_retries {
                let message = turn
                    .parsed
                    .errors
                    .last()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "empty response".into());
                turn.verdict = Some(SessionStatus::Aborted {
                    reason: AbortReason::ParseError { message },
                });
            } else {
                debug!(step = turn.index, "Unparseable response, asking for a restatement");
                transcript.push(Message::feedback(prompt::PARSE_RETRY_PROMPT));
            }
            return State::Recording(turn);
        }
        streaks.parse_failures = 0;

        if !turn.parsed.errors.is_empty() {
            transcript.push(Message::feedback(prompt::partial_parse_feedback(
                turn.parsed.errors.len(),
            )));
        }

        if turn.parsed.is_final_answer() {
            turn.verdict = Some(SessionStatus::Completed);
            return State::Recording(turn);
        }
        if turn.parsed.actions.is_empty() {
            // Narration plus broken blocks only; the feedback above covers it.
            return State::Recording(turn);
        }
        State::Filtering(turn)
    }

    /// Permission first: a refused action never reaches the deduplicator.
    fn filter(&self, mut turn: Turn, session: &Session) -> State {
        let actor = session.id().to_string();
        let now = self.clock.now();
        let actions = std::mem::take(&mut turn.parsed.actions);

        let outcome = self.gate.filter_audited(&actor, turn.level, actions);

        for (request, refusal) in outcome.into_ordered() {
            let record = match refusal {
                None => ActionRecord::pending(request, turn.index, now),
                Some(RejectReason::UnknownTool) => {
                    let message = format!("no tool named '{}'", request.tool_name);
                    ActionRecord::failed(
                        request,
                        ActionFailure::new(FailureKind::UnknownTool, message),
                        turn.index,
                        now,
                    )
                }
                Some(RejectReason::NotPermitted { active, required }) => {
                    let reason = RejectReason::NotPermitted { active, required };
                    warn!(
                        session_id = %actor,
                        step = turn.index,
                        tool = %request.tool_name,
                        %reason,
                        "Action rejected"
                    );
                    self.event_bus.publish(DomainEvent::ActionRejected {
                        session_id: actor.clone(),
                        tool_name: request.tool_name.clone(),
                        level: turn.level,
                        timestamp: now,
                    });
                    turn.rejected
                        .push((request.tool_name.clone(), reason.to_string()));
                    ActionRecord::skipped(
                        request,
                        SkipReason::PermissionDenied { active, required },
                        turn.index,
                        now,
                    )
                }
            };
            turn.records.push(record);
        }
        State::Executing(turn)
    }

    /// Run the approved actions one at a time, in parsed order.
    async fn execute(&self, mut turn: Turn, session: &Session, cancel: &CancellationToken) -> State {
        let actor = session.id().to_string();
        let budget = *session.budget();

        for i in 0..turn.records.len() {
            if !turn.records[i].is_pending() {
                continue;
            }
            if cancel.is_cancelled() {
                debug!(step = turn.index, tool = turn.records[i].tool_name(), "Cancelled before invoking");
                turn.records[i].status = ActionStatus::Skipped {
                    reason: SkipReason::Cancelled,
                };
                continue;
            }

            let (done, rest) = turn.records.split_at_mut(i);
            let record = &mut rest[0];
            match self.dedup.check(session, done, &record.request) {
                Decision::Allow => {}
                Decision::SkipIdentical(fingerprint) => {
                    self.skip(&actor, record, SkipReason::Identical { fingerprint });
                    continue;
                }
                Decision::SkipInFlight(fingerprint) => {
                    self.skip(&actor, record, SkipReason::InFlight { fingerprint });
                    continue;
                }
            }

            let tool = match self.gate.registry().resolve(&record.request.tool_name) {
                Ok(tool) => tool,
                Err(e) => {
                    record.status = ActionStatus::Failed {
                        error: ActionFailure::new(FailureKind::UnknownTool, e.to_string()),
                    };
                    continue;
                }
            };

            if let Err(e) = check_required(tool.as_ref(), &record.request) {
                debug!(step = turn.index, tool = tool.name(), error = %e, "Invalid arguments");
                record.status = ActionStatus::Failed {
                    error: ActionFailure::from(&e),
                };
                continue;
            }

            let started = Instant::now();
            let (result, attempts) = self
                .invoke_with_retry(tool.as_ref(), &record.request, budget.max_tool_retries, cancel)
                .await;
            record.attempts = attempts;
            record.timestamp = self.clock.now();
            record.status = match result {
                Ok(output) if output.success => ActionStatus::Executed { result: output },
                Ok(output) => ActionStatus::Failed {
                    error: ActionFailure::new(FailureKind::Permanent, output.output),
                },
                Err(e) => ActionStatus::Failed {
                    error: ActionFailure::from(&e),
                },
            };

            let success = record.is_executed();
            let duration_ms = started.elapsed().as_millis() as u64;
            info!(
                session_id = %actor,
                step = turn.index,
                tool = tool.name(),
                success,
                attempts,
                duration_ms,
                "Tool executed"
            );
            self.event_bus.publish(DomainEvent::ToolExecuted {
                session_id: actor.clone(),
                tool_name: tool.name().to_string(),
                success,
                attempts,
                duration_ms,
                timestamp: self.clock.now(),
            });
            if let Some(audit) = &self.audit {
                audit.log(
                    AuditEvent::ToolExecution {
                        tool_name: tool.name().to_string(),
                    },
                    &actor,
                    tool.name(),
                    if success {
                        AuditOutcome::Success
                    } else {
                        AuditOutcome::Failure
                    },
                    match &record.status {
                        ActionStatus::Failed { error } => Some(error.message.clone()),
                        _ => None,
                    },
                );
            }
        }
        State::Recording(turn)
    }

    fn skip(&self, actor: &str, record: &mut ActionRecord, reason: SkipReason) {
        debug!(
            session_id = %actor,
            tool = record.tool_name(),
            fingerprint = record.fingerprint.short(),
            "Skipped duplicate action"
        );
        self.event_bus.publish(DomainEvent::ActionSkipped {
            session_id: actor.to_string(),
            tool_name: record.tool_name().to_string(),
            reason: reason.clone(),
            timestamp: self.clock.now(),
        });
        if let Some(audit) = &self.audit {
            audit.log(
                AuditEvent::DuplicateSuppressed {
                    tool_name: record.tool_name().to_string(),
                    fingerprint: record.fingerprint.as_str().to_string(),
                },
                actor,
                record.tool_name(),
                AuditOutcome::Skipped,
                Some(reason.to_string()),
            );
        }
        record.status = ActionStatus::Skipped { reason };
    }

    /// Invoke `tool`, retrying transient failures and timeouts up to
    /// `max_retries` times. Returns the final result and the number of
    /// invocations made.
    async fn invoke_with_retry(
        &self,
        tool: &dyn Tool,
        request: &ActionRequest,
        max_retries: u32,
        cancel: &CancellationToken,
    ) -> (Result<ToolResult, ToolError>, u32) {
        let max_attempts = 1 + max_retries;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = tokio::time::timeout(self.tool_timeout, tool.execute(request.arguments_value()))
                .await
                .unwrap_or_else(|_| {
                    Err(ToolError::Timeout {
                        tool_name: tool.name().to_string(),
                        timeout_ms: self.tool_timeout.as_millis() as u64,
                    })
                });

            match result {
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    warn!(tool = tool.name(), attempt, error = %e, "Tool failed, retrying");
                    tokio::select! {
                        _ = cancel.cancelled() => return (Err(e), attempt),
                        _ = tokio::time::sleep(self.backoff(attempt)) => {}
                    }
                }
                other => return (other, attempt),
            }
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.retry_backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }

    fn record(
        &self,
        turn: Turn,
        session: &mut Session,
        transcript: &mut Transcript,
        recorder: &mut StepRecorder,
        streaks: &mut Streaks,
        cancel: &CancellationToken,
    ) -> Result<State, Error> {
        // Observations in parsed order; refusals get one corrective message.
        for record in &turn.records {
            if matches!(
                record.status,
                ActionStatus::Skipped {
                    reason: SkipReason::PermissionDenied { .. }
                }
            ) {
                continue;
            }
            transcript.push(Message::tool_result(
                record.tool_name(),
                prompt::observation(record),
            ));
        }
        if !turn.rejected.is_empty() {
            let empty = Allowlist::default();
            let allowlist = self.gate.allowlist(turn.level).unwrap_or(&empty);
            transcript.push(Message::feedback(prompt::rejection_feedback(
                turn.level,
                &turn.rejected,
                allowlist,
            )));
        }

        let mut step = Step {
            index: turn.index,
            permission_level: turn.level,
            model_response_text: turn.response,
            narration: turn.parsed.narration,
            actions: turn.records,
            parse_errors: turn.parsed.errors,
            terminated_session: false,
            recorded_at: self.clock.now(),
        };

        if !step.actions.is_empty() {
            if step.made_progress() {
                streaks.unproductive_steps = 0;
            } else {
                streaks.unproductive_steps += 1;
            }
        }

        let budget = *session.budget();
        let verdict = turn.verdict.or_else(|| {
            if cancel.is_cancelled() {
                Some(abort(AbortReason::Cancelled))
            } else if streaks.unproductive_steps >= budget.stall_threshold {
                Some(abort(AbortReason::Stalled {
                    consecutive_steps: streaks.unproductive_steps,
                }))
            } else if session.steps().len() + 1 >= budget.max_steps {
                Some(abort(AbortReason::BudgetExhausted {
                    max_steps: budget.max_steps,
                }))
            } else {
                None
            }
        });
        step.terminated_session = verdict.is_some();

        debug!(
            session_id = %session.id(),
            step = step.index,
            actions = step.actions.len(),
            executed = step.executed_count(),
            "Recording step"
        );
        if let Err(e) = recorder.record(session, step) {
            let status = abort(AbortReason::HistoryViolation {
                message: e.to_string(),
            });
            self.terminate(session, status);
            return Err(e);
        }

        Ok(match verdict {
            Some(status) => State::Terminated(status),
            None => State::AwaitingModel,
        })
    }

    fn terminate(&self, session: &mut Session, status: SessionStatus) {
        match &status {
            SessionStatus::Aborted { reason } => warn!(
                session_id = %session.id(),
                steps = session.steps().len(),
                %reason,
                "Session aborted"
            ),
            _ => info!(
                session_id = %session.id(),
                steps = session.steps().len(),
                "Session completed"
            ),
        }
        session.set_status(status.clone());
        self.event_bus.publish(DomainEvent::SessionTerminated {
            session_id: session.id().to_string(),
            status,
            steps: session.steps().len(),
            timestamp: self.clock.now(),
        });
    }
}

impl std::fmt::Debug for IterativeExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IterativeExecutor")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .field("model_timeout", &self.model_timeout)
            .field("tool_timeout", &self.tool_timeout)
            .finish()
    }
}

fn abort(reason: AbortReason) -> SessionStatus {
    SessionStatus::Aborted { reason }
}

fn aborted(reason: AbortReason) -> State {
    State::Terminated(abort(reason))
}

/// Reject requests missing a key the tool's schema lists as `required`.
fn check_required(tool: &dyn Tool, request: &ActionRequest) -> Result<(), ToolError> {
    let schema = tool.parameters_schema();
    let Some(required) = schema.get("required").and_then(|r| r.as_array()) else {
        return Ok(());
    };
    let missing: Vec<&str> = required
        .iter()
        .filter_map(|key| key.as_str())
        .filter(|key| !request.arguments.contains_key(*key))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ToolError::InvalidArguments(format!(
            "missing required argument(s): {}",
            missing.join(", ")
        )))
    }
}
