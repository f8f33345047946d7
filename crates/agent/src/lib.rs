//! The agent execution loop.
//!
//! Each step follows the same path:
//!
//! 1. **Ask** the model, with the tools allowed at the current permission level
//! 2. **Parse** its turn into narration and ordered action requests
//! 3. **Filter** the actions through the permission gate, then the deduplicator
//! 4. **Execute** what survives, one action at a time, retrying transient failures
//! 5. **Record** the step in the session's append-only history
//!
//! The loop continues until the model answers in plain text, the step
//! budget runs out, the session stalls, or the model becomes unreachable.

pub mod dedup;
pub mod executor;
pub mod parser;
pub mod prompt;
pub mod recorder;
pub mod script;

pub use dedup::{ActionDeduplicator, Decision};
pub use executor::{IterativeExecutor, SessionOutcome};
pub use parser::{ParsedResponse, ResponseParser, normalize_arguments};
pub use recorder::{StepRecorder, step_digest};
pub use script::{Script, ScriptError, ScriptedProvider, ScriptedTurn};
