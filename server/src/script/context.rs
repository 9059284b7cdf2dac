use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::{Quat, Vec3};
use thiserror::Error;
use uuid::Uuid;

use crate::scene::{AssetStore, SceneError, SceneObject, Transform};

use super::listeners::ListenerRegistry;

/// The in-world channel where script faults are spoken.
pub const DEBUG_CHANNEL: i32 = 0x7FFF_FFFF;

/// A recoverable fault raised by a script event handler. The processing
/// loop logs it to the debug channel and moves on to the next event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error(transparent)]
    Scene(#[from] SceneError),

    #[error("Script fault: {0}")]
    Fault(String),

    /// Raised at construction when the state set lacks `default`
    #[error("Script defines no default state")]
    MissingDefaultState,
}

/// A chat line emitted by a script, to be routed by the chat module.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatOutput {
    pub channel: i32,
    pub source: Uuid,
    pub text: String,
}

/// Everything a script handler can reach: its object, its listeners,
/// its timer, the asset store and an outbox for chat. Owned by the
/// script instance and only ever touched under the instance lock.
pub struct ScriptContext {
    object: Arc<SceneObject>,
    pub(super) listeners: ListenerRegistry,
    pub(super) timer_interval: Option<Duration>,
    pub(super) next_timer_fire: Option<Instant>,
    assets: Arc<dyn AssetStore>,
    outbox: Vec<ChatOutput>,
    pub(super) execution_time: Duration,
    // teardown hook for a motion program this script started
    motion_stopper: Option<Box<dyn FnMut() + Send>>,
}

impl ScriptContext {
    pub(super) fn new(object: Arc<SceneObject>, assets: Arc<dyn AssetStore>) -> Self {
        Self {
            object,
            listeners: ListenerRegistry::new(),
            timer_interval: None,
            next_timer_fire: None,
            assets,
            outbox: Vec::new(),
            execution_time: Duration::ZERO,
            motion_stopper: None,
        }
    }

    pub fn object(&self) -> &Arc<SceneObject> {
        &self.object
    }

    pub fn object_id(&self) -> Uuid {
        self.object.id()
    }

    pub fn assets(&self) -> &Arc<dyn AssetStore> {
        &self.assets
    }

    // Transform access

    pub fn transform(&self) -> Transform {
        self.object.transform()
    }

    /// Script-driven position write; fails while a running motion
    /// program owns the transform.
    pub fn set_position(&self, position: Vec3) -> Result<(), ScriptError> {
        Ok(self.object.set_position(position)?)
    }

    /// Script-driven rotation write; fails while a running motion
    /// program owns the transform.
    pub fn set_rotation(&self, rotation: Quat) -> Result<(), ScriptError> {
        Ok(self.object.set_rotation(rotation)?)
    }

    // Chat

    /// Says a line of chat from this object; drained by the chat router.
    pub fn say(&mut self, channel: i32, text: impl Into<String>) {
        self.outbox.push(ChatOutput {
            channel,
            source: self.object.id(),
            text: text.into(),
        });
    }

    pub(super) fn drain_chat(&mut self) -> Vec<ChatOutput> {
        std::mem::take(&mut self.outbox)
    }

    // Listeners

    /// Registers a chat listener; returns the handle, or the invalid
    /// sentinel when all 64 slots are in use.
    pub fn listen(
        &mut self,
        channel: i32,
        name: impl Into<String>,
        source: Option<Uuid>,
        message: impl Into<String>,
    ) -> i32 {
        self.listeners.listen(channel, name, source, message)
    }

    pub fn listen_remove(&mut self, handle: i32) {
        self.listeners.remove(handle);
    }

    pub fn listen_control(&mut self, handle: i32, active: bool) {
        self.listeners.set_active(handle, active);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.count()
    }

    // Timer

    /// Arms the script timer; each elapse posts a `Timer` event.
    pub fn set_timer(&mut self, interval: Duration) {
        self.timer_interval = Some(interval);
        self.next_timer_fire = Some(Instant::now() + interval);
    }

    pub fn clear_timer(&mut self) {
        self.timer_interval = None;
        self.next_timer_fire = None;
    }

    // Motion ownership

    /// Records the teardown hook for a motion program this script
    /// started, so state changes and resets can disable it.
    pub fn own_motion(&mut self, stopper: impl FnMut() + Send + 'static) {
        // a previously owned motion is superseded; stop it now
        self.stop_owned_motion();
        self.motion_stopper = Some(Box::new(stopper));
    }

    pub(super) fn stop_owned_motion(&mut self) {
        if let Some(mut stopper) = self.motion_stopper.take() {
            stopper();
        }
    }

    /// Wall-clock time this script has spent inside event handlers.
    pub fn execution_time(&self) -> Duration {
        self.execution_time
    }
}
