use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use log::warn;
use uuid::Uuid;

use crate::scene::{AssetStore, SceneObject};

use super::context::{ChatOutput, ScriptContext, ScriptError, DEBUG_CHANNEL};
use super::event::{DispatchOutcome, EventKind, ScriptEvent};
use super::state::{ScriptState, DEFAULT_STATE};

// ceiling on state_entry handlers chaining further transitions
const MAX_CHAINED_TRANSITIONS: usize = 8;

/// What one call to [`ScriptInstance::process_event`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Processed {
    /// Queue empty, or the instance is stopped
    Idle,
    /// Lazy entry into `default` consumed this slot; the triggering
    /// event is still queued
    InitialEntry,
    /// One event was dispatched to the current state
    Handled(EventKind),
    /// The event triggered a state change or reset
    Transitioned { from: String, to: String },
    /// A shutdown control event stopped the instance
    Stopped,
}

struct Inner {
    states: Vec<ScriptState>,
    current: Option<usize>,
    context: ScriptContext,
}

impl Inner {
    fn state_index(&self, name: &str) -> Option<usize> {
        self.states.iter().position(|state| state.name() == name)
    }
}

/// The runtime of one scripted object: its event mailbox, named states
/// and current-state pointer.
///
/// Processing happens under the inner lock, so events are strictly
/// serialized: never two events for the same instance at once, and
/// always in arrival order. The mailbox sits outside that lock, which
/// lets a handler's own side effects (a motion it starts, chat it
/// triggers) post follow-up events to the very instance that is
/// mid-dispatch. Posting never blocks; a stopped instance swallows
/// posts.
pub struct ScriptInstance {
    object_id: Uuid,
    running: AtomicBool,
    queue: Mutex<VecDeque<ScriptEvent>>,
    inner: Mutex<Inner>,
}

impl ScriptInstance {
    /// Builds an instance from its states. The state set must include
    /// `default`, which the instance enters lazily on the first
    /// processed event.
    pub fn new(
        object: Arc<SceneObject>,
        states: Vec<ScriptState>,
        assets: Arc<dyn AssetStore>,
    ) -> Result<Arc<Self>, ScriptError> {
        if !states.iter().any(|state| state.name() == DEFAULT_STATE) {
            return Err(ScriptError::MissingDefaultState);
        }
        let object_id = object.id();
        Ok(Arc::new(Self {
            object_id,
            running: AtomicBool::new(true),
            queue: Mutex::new(VecDeque::new()),
            inner: Mutex::new(Inner {
                states,
                current: None,
                context: ScriptContext::new(object, assets),
            }),
        }))
    }

    pub fn object_id(&self) -> Uuid {
        self.object_id
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_queue(&self) -> MutexGuard<'_, VecDeque<ScriptEvent>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues a world event for this instance. Never blocks the caller
    /// and never fails; a stopped instance swallows the post.
    pub fn post_event(&self, event: ScriptEvent) {
        if !self.running.load(Ordering::Acquire) {
            return;
        }
        self.lock_queue().push_back(event);
    }

    /// Dequeues and dispatches exactly one event, performing any state
    /// transition it requests before returning.
    pub fn process_event(&self) -> Processed {
        let mut inner = self.lock();
        if !self.running.load(Ordering::Acquire) {
            return Processed::Idle;
        }

        // lazy entry into `default`: state_entry consumes this slot and
        // the triggering event stays queued
        if inner.current.is_none() {
            if self.lock_queue().is_empty() {
                return Processed::Idle;
            }
            // validated at construction
            let Some(index) = inner.state_index(DEFAULT_STATE) else {
                return Processed::Idle;
            };
            inner.current = Some(index);
            match self.run_handler(&mut inner, index, &ScriptEvent::StateEntry) {
                Some(DispatchOutcome::ChangeState(target)) => {
                    self.perform_transition(&mut inner, &target, false);
                }
                Some(DispatchOutcome::Reset) => {
                    self.perform_transition(&mut inner, DEFAULT_STATE, true);
                }
                Some(DispatchOutcome::Continue) | None => {}
            }
            return Processed::InitialEntry;
        }

        let Some(event) = self.lock_queue().pop_front() else {
            return Processed::Idle;
        };

        match event {
            ScriptEvent::Reset => {
                match self.perform_transition(&mut inner, DEFAULT_STATE, true) {
                    Some((from, to)) => Processed::Transitioned { from, to },
                    None => Processed::Handled(EventKind::Reset),
                }
            }
            ScriptEvent::Shutdown => {
                self.teardown(&mut inner);
                Processed::Stopped
            }
            event => {
                let Some(index) = inner.current else {
                    return Processed::Idle;
                };
                let kind = event.kind();
                match self.run_handler(&mut inner, index, &event) {
                    Some(DispatchOutcome::Continue) | None => Processed::Handled(kind),
                    Some(DispatchOutcome::ChangeState(target)) => {
                        match self.perform_transition(&mut inner, &target, false) {
                            Some((from, to)) => Processed::Transitioned { from, to },
                            None => Processed::Handled(kind),
                        }
                    }
                    Some(DispatchOutcome::Reset) => {
                        match self.perform_transition(&mut inner, DEFAULT_STATE, true) {
                            Some((from, to)) => Processed::Transitioned { from, to },
                            None => Processed::Handled(kind),
                        }
                    }
                }
            }
        }
    }

    /// Runs one handler, accumulating its wall-clock time. A fault is
    /// logged to the debug channel and reported as `None`.
    fn run_handler(
        &self,
        inner: &mut Inner,
        state_index: usize,
        event: &ScriptEvent,
    ) -> Option<DispatchOutcome> {
        let Inner {
            states, context, ..
        } = inner;
        let start = Instant::now();
        let result = states[state_index].dispatch(context, event);
        context.execution_time += start.elapsed();

        match result {
            Ok(outcome) => Some(outcome),
            Err(error) => {
                warn!(
                    "Script {} fault in {:?} handler: {}",
                    self.object_id,
                    event.kind(),
                    error
                );
                context.say(DEBUG_CHANNEL, format!("{}", error));
                None
            }
        }
    }

    /// Executes a state change synchronously on the calling thread:
    /// listeners cleared, timers and owned motion disabled, pending
    /// queue discarded, `state_exit` on the old state, pointer switch,
    /// `state_entry` on the new state. Returns the (from, to) pair, or
    /// `None` when the target state does not exist.
    fn perform_transition(
        &self,
        inner: &mut Inner,
        target: &str,
        zero_clock: bool,
    ) -> Option<(String, String)> {
        let from_index = inner.current?;
        let from_name = inner.states[from_index].name().to_string();

        let mut target = target.to_string();
        let mut zero_clock = zero_clock;
        let mut completed: Option<(String, String)> = None;

        for _ in 0..MAX_CHAINED_TRANSITIONS {
            let Some(to_index) = inner.state_index(&target) else {
                warn!(
                    "Script {} requested unknown state '{}', staying in '{}'",
                    self.object_id, target, from_name
                );
                return completed;
            };

            // events never carry across states
            inner.context.listeners.clear();
            inner.context.clear_timer();
            inner.context.stop_owned_motion();
            self.lock_queue().clear();
            if zero_clock {
                inner.context.execution_time = std::time::Duration::ZERO;
            }

            if let Some(exit_index) = inner.current {
                if let Some(outcome) =
                    self.run_handler(inner, exit_index, &ScriptEvent::StateExit)
                {
                    if outcome != DispatchOutcome::Continue {
                        // state_exit cannot redirect the transition
                        warn!(
                            "Script {} state_exit tried to change state, ignored",
                            self.object_id
                        );
                    }
                }
            }

            inner.current = Some(to_index);
            let to_name = inner.states[to_index].name().to_string();
            completed = Some((from_name.clone(), to_name));

            match self.run_handler(inner, to_index, &ScriptEvent::StateEntry) {
                Some(DispatchOutcome::ChangeState(next)) => {
                    target = next;
                    zero_clock = false;
                }
                Some(DispatchOutcome::Reset) => {
                    target = DEFAULT_STATE.to_string();
                    zero_clock = true;
                }
                Some(DispatchOutcome::Continue) | None => return completed,
            }
        }

        warn!(
            "Script {} exceeded {} chained state changes, stopping at '{}'",
            self.object_id,
            MAX_CHAINED_TRANSITIONS,
            inner.states[inner.current.unwrap_or(from_index)].name()
        );
        completed
    }

    fn teardown(&self, inner: &mut Inner) {
        self.running.store(false, Ordering::Release);
        self.lock_queue().clear();
        inner.context.listeners.clear();
        inner.context.clear_timer();
        inner.context.stop_owned_motion();
    }

    /// Stops the instance and releases everything it owns; later posts
    /// are no-ops.
    pub fn remove(&self) {
        let mut inner = self.lock();
        self.teardown(&mut inner);
    }

    /// Posts a `Timer` event when the armed script timer has elapsed.
    pub fn poll_timer(&self, now: Instant) {
        let mut inner = self.lock();
        if !self.running.load(Ordering::Acquire) {
            return;
        }
        let (Some(interval), Some(due)) =
            (inner.context.timer_interval, inner.context.next_timer_fire)
        else {
            return;
        };
        if now >= due {
            inner.context.next_timer_fire = Some(now + interval);
            self.lock_queue().push_back(ScriptEvent::Timer);
        }
    }

    // Introspection used by the engine, chat routing and tests

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn queued_len(&self) -> usize {
        self.lock_queue().len()
    }

    pub fn current_state_name(&self) -> Option<String> {
        let inner = self.lock();
        inner
            .current
            .map(|index| inner.states[index].name().to_string())
    }

    pub fn execution_time(&self) -> std::time::Duration {
        self.lock().context.execution_time()
    }

    /// Whether any of this instance's listeners accept the chat line.
    pub fn accepts_chat(&self, channel: i32, name: &str, source: &Uuid, message: &str) -> bool {
        self.lock().context.listeners.accepts(channel, name, source, message)
    }

    pub fn drain_chat(&self) -> Vec<ChatOutput> {
        self.lock().context.drain_chat()
    }

    /// Runs a closure against the script context under the instance
    /// lock; used to register listeners or timers from outside a
    /// handler.
    pub fn with_context<R>(&self, f: impl FnOnce(&mut ScriptContext) -> R) -> R {
        let mut inner = self.lock();
        f(&mut inner.context)
    }
}
