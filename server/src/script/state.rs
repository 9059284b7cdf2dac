use std::collections::HashMap;

use super::context::{ScriptContext, ScriptError};
use super::event::{DispatchOutcome, EventKind, ScriptEvent};

/// Every script starts in, and resets to, this state.
pub const DEFAULT_STATE: &str = "default";

/// An event handler attached to one state. A handler may mutate its
/// object through the context, emit chat, register listeners, and asks
/// for transitions through its returned [`DispatchOutcome`]. Faults are
/// error values, recoverable per-event.
pub type Handler =
    Box<dyn FnMut(&mut ScriptContext, &ScriptEvent) -> Result<DispatchOutcome, ScriptError> + Send>;

/// One named node of a script's finite-state machine: the set of event
/// handlers valid while the state is current.
pub struct ScriptState {
    name: String,
    handlers: HashMap<EventKind, Handler>,
}

impl ScriptState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handlers: HashMap::new(),
        }
    }

    /// Attaches a handler for one event kind, builder style. A later
    /// registration for the same kind replaces the earlier one.
    pub fn on(
        mut self,
        kind: EventKind,
        handler: impl FnMut(&mut ScriptContext, &ScriptEvent) -> Result<DispatchOutcome, ScriptError>
            + Send
            + 'static,
    ) -> Self {
        self.handlers.insert(kind, Box::new(handler));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handles(&self, kind: EventKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Runs this state's handler for the event, if one is registered.
    /// An unhandled event is a silent no-op.
    pub fn dispatch(
        &mut self,
        context: &mut ScriptContext,
        event: &ScriptEvent,
    ) -> Result<DispatchOutcome, ScriptError> {
        match self.handlers.get_mut(&event.kind()) {
            Some(handler) => handler(context, event),
            None => Ok(DispatchOutcome::Continue),
        }
    }
}
