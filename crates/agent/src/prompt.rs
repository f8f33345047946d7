//! Text the executor sends to the model: the system prompt and the
//! feedback messages appended after each step.

use agentloop_core::action::{ActionRecord, ActionStatus, SkipReason};
use agentloop_core::permission::PermissionLevel;
use agentloop_core::tool::Allowlist;
use std::fmt::Write;

/// Sent after a response that contained nothing usable.
pub const PARSE_RETRY_PROMPT: &str = "Your last action could not be parsed, restate it. \
Wrap each action in <tool_call>{\"name\": \"<tool>\", \"arguments\": {...}}</tool_call>, \
or answer in plain text if you are done.";

/// Build the system prompt for a step run at `level`.
pub fn system_prompt(level: PermissionLevel, allowlist: &Allowlist) -> String {
    let mut prompt = String::from(
        "You are an assistant that completes tasks by calling tools.\n\n## Tool Use Protocol\n\n\
         To call a tool, emit a block like this anywhere in your reply:\n\n\
         <tool_call>\n{\"name\": \"tool_name\", \"arguments\": {\"param\": \"value\"}}\n</tool_call>\n\n\
         You may call several tools in one reply; they run in the order written. \
         Results come back in the next message. Do not repeat an action that already ran. \
         When the task is complete, reply in plain text with no tool calls.\n\n",
    );

    let _ = writeln!(prompt, "Permission level: {level}\n");

    if allowlist.is_empty() {
        prompt.push_str("No tools are available at this level. Answer in plain text.\n");
        return prompt;
    }

    prompt.push_str("### Available Tools\n\n");
    for def in allowlist.definitions() {
        let _ = writeln!(
            prompt,
            "**{}**: {}\nParameters: `{}`\n",
            def.name, def.description, def.parameters
        );
    }
    prompt
}

/// Feedback for the malformed blocks in an otherwise usable response.
pub fn partial_parse_feedback(errors: usize) -> String {
    format!(
        "{errors} of your action blocks could not be parsed and were ignored. \
         If they were needed, restate them."
    )
}

/// Corrective instruction for actions the permission gate refused.
pub fn rejection_feedback(
    level: PermissionLevel,
    rejected: &[(String, String)],
    allowlist: &Allowlist,
) -> String {
    let mut msg = format!("These actions are not permitted at the {level} permission level:\n");
    for (tool, reason) in rejected {
        let _ = writeln!(msg, "- {tool}: {reason}");
    }
    let names: Vec<String> = allowlist.names().into_iter().collect();
    if names.is_empty() {
        msg.push_str("No tools are available; answer in plain text.");
    } else {
        let _ = write!(msg, "Use only: {}.", names.join(", "));
    }
    msg
}

/// The observation fed back for one action record.
pub fn observation(record: &ActionRecord) -> String {
    let tool = record.tool_name();
    match &record.status {
        ActionStatus::Executed { result } => result.output.clone(),
        ActionStatus::Failed { error } => format!("Error from {tool}: {}", error.message),
        ActionStatus::Skipped {
            reason: SkipReason::Identical { .. },
        } => format!(
            "Skipped duplicate {tool} call: an identical action already ran this session. \
             Use the earlier result."
        ),
        ActionStatus::Skipped {
            reason: SkipReason::InFlight { .. },
        } => format!("Skipped duplicate {tool} call: an identical action is still running."),
        ActionStatus::Skipped { reason } => format!("Skipped {tool}: {reason}"),
        ActionStatus::Pending => format!("{tool} did not finish."),
    }
}
