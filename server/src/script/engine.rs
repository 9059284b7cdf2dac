use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::debug;
use uuid::Uuid;

use crate::motion::{MotionEvent, MotionSink};
use crate::scene::{AssetStore, SceneObject};

use super::context::{ChatOutput, ScriptError};
use super::event::ScriptEvent;
use super::instance::{Processed, ScriptInstance};
use super::state::ScriptState;

/// Owns every script instance in the region, keyed by object, and feeds
/// them from the world's event producers.
///
/// Instances serialize their own processing; the engine just iterates
/// runnable scripts, which lets any number of pump threads share the
/// work without breaking per-instance ordering.
pub struct ScriptEngine {
    instances: Mutex<HashMap<Uuid, Arc<ScriptInstance>>>,
    assets: Arc<dyn AssetStore>,
}

impl ScriptEngine {
    pub fn new(assets: Arc<dyn AssetStore>) -> Self {
        Self {
            instances: Mutex::new(HashMap::new()),
            assets,
        }
    }

    /// Attaches a script to an object; the instance starts in no state
    /// and enters `default` on its first processed event.
    pub fn attach(
        &self,
        object: Arc<SceneObject>,
        states: Vec<ScriptState>,
    ) -> Result<Arc<ScriptInstance>, ScriptError> {
        let instance = ScriptInstance::new(object, states, self.assets.clone())?;
        self.instances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(instance.object_id(), instance.clone());
        Ok(instance)
    }

    /// Stops and detaches an object's script, releasing everything it
    /// owns. Unknown objects are ignored.
    pub fn detach(&self, object_id: &Uuid) {
        let removed = self
            .instances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(object_id);
        if let Some(instance) = removed {
            instance.remove();
        }
    }

    pub fn instance(&self, object_id: &Uuid) -> Option<Arc<ScriptInstance>> {
        self.instances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(object_id)
            .cloned()
    }

    /// Posts an event to one object's script; a no-op when the object
    /// has no (running) script.
    pub fn post_to(&self, object_id: &Uuid, event: ScriptEvent) {
        if let Some(instance) = self.instance(object_id) {
            instance.post_event(event);
        } else {
            debug!("No script on object {}, dropping {:?}", object_id, event.kind());
        }
    }

    /// Routes a chat line to every script listening for it.
    pub fn deliver_chat(&self, channel: i32, name: &str, source: &Uuid, message: &str) {
        let listeners: Vec<Arc<ScriptInstance>> = {
            let instances = self
                .instances
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            instances.values().cloned().collect()
        };
        for instance in listeners {
            if instance.accepts_chat(channel, name, source, message) {
                instance.post_event(ScriptEvent::Listen {
                    channel,
                    name: name.to_string(),
                    source: *source,
                    message: message.to_string(),
                });
            }
        }
    }

    /// One pass of the shared script-execution loop: fires due timers
    /// and processes at most one event per runnable instance. Returns
    /// how many instances did work.
    pub fn pump(&self, now: Instant) -> usize {
        let instances: Vec<Arc<ScriptInstance>> = {
            let map = self
                .instances
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            map.values().cloned().collect()
        };
        let mut worked = 0;
        for instance in instances {
            instance.poll_timer(now);
            if instance.process_event() != Processed::Idle {
                worked += 1;
            }
        }
        worked
    }

    /// Chat spoken by scripts since the last drain, for the chat router
    /// to broadcast.
    pub fn drain_chat(&self) -> Vec<ChatOutput> {
        let instances: Vec<Arc<ScriptInstance>> = {
            let map = self
                .instances
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            map.values().cloned().collect()
        };
        let mut output = Vec::new();
        for instance in instances {
            output.extend(instance.drain_chat());
        }
        output
    }

    /// Worker loop draining a feed of posted events, pumping all
    /// runnable instances after each delivery. Exits on shutdown or
    /// when every sender is gone.
    pub fn run_worker(
        engine: Arc<Self>,
        receiver: Receiver<(Uuid, ScriptEvent)>,
        recv_timeout: Duration,
        shutdown: Arc<AtomicBool>,
    ) -> JoinHandle<()> {
        std::thread::Builder::new()
            .name("script-worker".to_string())
            .spawn(move || loop {
                if shutdown.load(Ordering::Acquire) {
                    return;
                }
                match receiver.recv_timeout(recv_timeout) {
                    Ok((object_id, event)) => {
                        engine.post_to(&object_id, event);
                        while engine.pump(Instant::now()) > 0 {}
                    }
                    // re-check shutdown, fire any due timers
                    Err(RecvTimeoutError::Timeout) => {
                        engine.pump(Instant::now());
                    }
                    Err(RecvTimeoutError::Disconnected) => return,
                }
            })
            .expect("failed to spawn script worker thread")
    }

    /// Spawns the shared script-execution thread, pumping every
    /// runnable instance until asked to shut down.
    pub fn spawn_pump(
        engine: Arc<Self>,
        interval: Duration,
        shutdown: Arc<AtomicBool>,
    ) -> JoinHandle<()> {
        std::thread::Builder::new()
            .name("script-pump".to_string())
            .spawn(move || {
                while !shutdown.load(Ordering::Acquire) {
                    let worked = engine.pump(Instant::now());
                    if worked == 0 {
                        std::thread::sleep(interval);
                    }
                }
            })
            .expect("failed to spawn script pump thread")
    }
}

/// Motion start/end notifications surface to the owning object's script
/// as link messages, the cross-script signaling channel.
impl MotionSink for ScriptEngine {
    fn motion_event(&self, object_id: Uuid, event: MotionEvent) {
        let text = match event {
            MotionEvent::Started => "motion_started",
            MotionEvent::Ended => "motion_ended",
        };
        self.post_to(
            &object_id,
            ScriptEvent::LinkMessage {
                sender_link: 0,
                num: match event {
                    MotionEvent::Started => 1,
                    MotionEvent::Ended => 0,
                },
                text: text.to_string(),
                key: object_id,
            },
        );
    }
}
