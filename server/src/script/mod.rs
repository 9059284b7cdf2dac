//! The scripted-object event queue and state machine.
//!
//! Every scripted object owns one [`ScriptInstance`]: a FIFO mailbox of
//! world events, a set of named states each holding event handlers, and
//! a current-state pointer. Events are processed strictly one at a time
//! per instance; state changes and resets are explicit handler outcomes
//! consumed by the processing loop, never an error path.

mod context;
mod engine;
mod event;
mod instance;
mod listeners;
mod state;

pub use context::{ChatOutput, ScriptContext, ScriptError, DEBUG_CHANNEL};
pub use engine::ScriptEngine;
pub use event::{DispatchOutcome, EventKind, ScriptEvent};
pub use instance::{Processed, ScriptInstance};
pub use listeners::{ListenerRegistry, INVALID_LISTENER, MAX_LISTENERS};
pub use state::{Handler, ScriptState, DEFAULT_STATE};
