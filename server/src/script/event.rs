use uuid::Uuid;

/// A world occurrence queued for one script instance.
///
/// This is the closed set of event kinds the engine dispatches; adding
/// a variant is a compile-time-checked change everywhere it is matched.
/// `Reset` and `Shutdown` are control events consumed by the processing
/// loop itself rather than by state handlers.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptEvent {
    Touch {
        toucher: Uuid,
    },
    Collision {
        other: Uuid,
    },
    Listen {
        channel: i32,
        name: String,
        source: Uuid,
        message: String,
    },
    HttpResponse {
        request_id: Uuid,
        status: u16,
        body: String,
    },
    Money {
        payer: Uuid,
        amount: i32,
    },
    Timer,
    LinkMessage {
        sender_link: i32,
        num: i32,
        text: String,
        key: Uuid,
    },
    StateEntry,
    StateExit,
    /// Control: return to `default` and zero the execution-time clock
    Reset,
    /// Control: stop the instance for good
    Shutdown,
}

/// Discriminant used to register and look up handlers.
#[derive(Copy, Debug, Clone, Eq, PartialEq, Hash)]
pub enum EventKind {
    Touch,
    Collision,
    Listen,
    HttpResponse,
    Money,
    Timer,
    LinkMessage,
    StateEntry,
    StateExit,
    Reset,
    Shutdown,
}

impl ScriptEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ScriptEvent::Touch { .. } => EventKind::Touch,
            ScriptEvent::Collision { .. } => EventKind::Collision,
            ScriptEvent::Listen { .. } => EventKind::Listen,
            ScriptEvent::HttpResponse { .. } => EventKind::HttpResponse,
            ScriptEvent::Money { .. } => EventKind::Money,
            ScriptEvent::Timer => EventKind::Timer,
            ScriptEvent::LinkMessage { .. } => EventKind::LinkMessage,
            ScriptEvent::StateEntry => EventKind::StateEntry,
            ScriptEvent::StateExit => EventKind::StateExit,
            ScriptEvent::Reset => EventKind::Reset,
            ScriptEvent::Shutdown => EventKind::Shutdown,
        }
    }
}

/// What a handler asks the processing loop to do next.
///
/// State changes and resets are ordinary control flow here, not errors;
/// the loop performs the transition synchronously on the same thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Continue,
    ChangeState(String),
    Reset,
}
