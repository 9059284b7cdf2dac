use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use glam::Vec3;
use thiserror::Error;
use uuid::Uuid;

use veldt_shared::{KeyframedMotion, PlayMode};

use crate::scene::SceneObject;

/// Length of one motion tick in seconds.
pub const TICK_SECONDS: f64 = 1.0 / 45.0;

/// Errors raised by motion-controller operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MotionControlError {
    #[error("No motion program is attached to object {0}")]
    UnknownObject(Uuid),
}

/// Playback transition reported through the [`MotionSink`].
#[derive(Copy, Debug, Clone, Eq, PartialEq)]
pub enum MotionEvent {
    Started,
    Ended,
}

/// Receiver for motion start/end notifications. The controller calls
/// this with none of its locks held, so a sink may freely post back
/// into script instances.
pub trait MotionSink: Send + Sync {
    fn motion_event(&self, object_id: Uuid, event: MotionEvent);
}

struct Entry {
    object: Arc<SceneObject>,
    motion: KeyframedMotion,
}

/// Shared fixed-tick scheduler for all active motion programs.
///
/// All program state lives under the controller's own lock, which is
/// never held while the object lock or the sink is taken. While a
/// program is running it owns the object's transform exclusively.
pub struct MotionController {
    entries: Mutex<HashMap<Uuid, Entry>>,
    sink: Arc<dyn MotionSink>,
}

impl MotionController {
    pub fn new(sink: Arc<dyn MotionSink>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            sink,
        }
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attaches a motion program to an object and begins playback.
    pub fn start(&self, object: Arc<SceneObject>, motion: KeyframedMotion) {
        let object_id = object.id();
        {
            let mut entries = self.lock_entries();
            entries.insert(object_id, Entry { object, motion });
        }
        // the entry was just inserted, play cannot miss it
        let _ = self.play(&object_id);
    }

    /// Resumes (or first starts) playback. Idempotent: `Started` fires
    /// only on a genuine stopped-to-running transition.
    pub fn play(&self, object_id: &Uuid) -> Result<(), MotionControlError> {
        let started = {
            let mut entries = self.lock_entries();
            let entry = entries
                .get_mut(object_id)
                .ok_or(MotionControlError::UnknownObject(*object_id))?;
            if entry.motion.running {
                false
            } else {
                entry.motion.running = true;
                if entry.motion.mode == PlayMode::Reverse {
                    entry.motion.running_reverse = true;
                }
                entry.object.set_motion_owned(true);
                true
            }
        };
        if started {
            self.sink.motion_event(*object_id, MotionEvent::Started);
        }
        Ok(())
    }

    /// Halts playback without resetting the frame cursor; a later
    /// `play` resumes mid-program. Velocities are zeroed so the object
    /// holds still.
    pub fn pause(&self, object_id: &Uuid) -> Result<(), MotionControlError> {
        let mut entries = self.lock_entries();
        let entry = entries
            .get_mut(object_id)
            .ok_or(MotionControlError::UnknownObject(*object_id))?;
        entry.motion.running = false;
        entry.object.set_motion_owned(false);
        entry.object.apply_motion_write(|transform| {
            transform.velocity = Vec3::ZERO;
            transform.angular_velocity = Vec3::ZERO;
        });
        Ok(())
    }

    /// Halts playback and clears the frame cursor; `Ended` fires only
    /// if the program was actually running.
    pub fn stop(&self, object_id: &Uuid) -> Result<(), MotionControlError> {
        let was_running = {
            let mut entries = self.lock_entries();
            let entry = entries
                .get_mut(object_id)
                .ok_or(MotionControlError::UnknownObject(*object_id))?;
            let was_running = entry.motion.running;
            entry.motion.running = false;
            entry.motion.running_reverse = false;
            entry.motion.current_frame = None;
            entry.motion.time_in_frame = 0.0;
            entry.object.set_motion_owned(false);
            entry.object.apply_motion_write(|transform| {
                transform.velocity = Vec3::ZERO;
                transform.angular_velocity = Vec3::ZERO;
            });
            was_running
        };
        if was_running {
            self.sink.motion_event(*object_id, MotionEvent::Ended);
        }
        Ok(())
    }

    /// Detaches an object's motion program entirely, stopping it first.
    pub fn detach(&self, object_id: &Uuid) {
        let removed = {
            let mut entries = self.lock_entries();
            entries.remove(object_id)
        };
        if let Some(entry) = removed {
            let was_running = entry.motion.running;
            entry.object.set_motion_owned(false);
            entry.object.apply_motion_write(|transform| {
                transform.velocity = Vec3::ZERO;
                transform.angular_velocity = Vec3::ZERO;
            });
            if was_running {
                self.sink.motion_event(*object_id, MotionEvent::Ended);
            }
        }
    }

    /// Deep clone of an object's program for inspection.
    pub fn snapshot(&self, object_id: &Uuid) -> Result<KeyframedMotion, MotionControlError> {
        let entries = self.lock_entries();
        entries
            .get(object_id)
            .map(|entry| entry.motion.clone())
            .ok_or(MotionControlError::UnknownObject(*object_id))
    }

    /// Advances every running program by `dt` seconds.
    ///
    /// Completion events are collected under the controller lock and
    /// fired only after it is released.
    pub fn tick(&self, dt: f64) {
        let mut ended: Vec<Uuid> = Vec::new();
        {
            let mut entries = self.lock_entries();
            for (object_id, entry) in entries.iter_mut() {
                if !entry.motion.running {
                    continue;
                }
                if tick_entry(entry, dt) {
                    ended.push(*object_id);
                }
            }
        }
        for object_id in ended {
            self.sink.motion_event(object_id, MotionEvent::Ended);
        }
    }

    /// Spawns the fixed-tick playback thread.
    pub fn spawn_ticker(
        controller: Arc<Self>,
        shutdown: Arc<AtomicBool>,
    ) -> JoinHandle<()> {
        std::thread::Builder::new()
            .name("motion-tick".to_string())
            .spawn(move || {
                let tick = Duration::from_secs_f64(TICK_SECONDS);
                while !shutdown.load(Ordering::Acquire) {
                    controller.tick(TICK_SECONDS);
                    std::thread::sleep(tick);
                }
            })
            .expect("failed to spawn motion tick thread")
    }
}

/// One tick of one program. Returns true when the program reached its
/// natural end (Forward mode completion).
fn tick_entry(entry: &mut Entry, dt: f64) -> bool {
    let frame_count = entry.motion.frame_count();

    let current = match entry.motion.current_frame {
        None => {
            // first running tick picks the starting frame
            let start = if entry.motion.mode == PlayMode::Reverse {
                frame_count - 1
            } else {
                0
            };
            entry.motion.current_frame = Some(start);
            entry.motion.time_in_frame = 0.0;
            aim_at_frame(entry, start);
            return false;
        }
        Some(frame) => frame,
    };

    entry.motion.time_in_frame += dt;
    let duration = entry
        .motion
        .frame(current)
        .map(|frame| frame.duration.max(TICK_SECONDS))
        .unwrap_or(TICK_SECONDS);

    if entry.motion.time_in_frame < duration {
        integrate(entry, dt);
        return false;
    }

    // frame complete: snap to its target exactly, then advance
    snap_to_frame(entry, current);
    let carry = entry.motion.time_in_frame - duration;
    entry.motion.time_in_frame = carry.max(0.0);

    let next = match entry.motion.mode {
        PlayMode::Forward => {
            if current + 1 >= frame_count {
                entry.motion.running = false;
                entry.motion.current_frame = None;
                entry.motion.time_in_frame = 0.0;
                entry.object.set_motion_owned(false);
                entry.object.apply_motion_write(|transform| {
                    transform.velocity = Vec3::ZERO;
                    transform.angular_velocity = Vec3::ZERO;
                });
                return true;
            }
            current + 1
        }
        PlayMode::Loop => (current + 1) % frame_count,
        PlayMode::PingPong => {
            if entry.motion.running_reverse {
                if current == 0 {
                    entry.motion.running_reverse = false;
                    1.min(frame_count - 1)
                } else {
                    current - 1
                }
            } else if current + 1 >= frame_count {
                entry.motion.running_reverse = true;
                current.saturating_sub(1)
            } else {
                current + 1
            }
        }
        PlayMode::Reverse => {
            if current == 0 {
                frame_count - 1
            } else {
                current - 1
            }
        }
    };

    entry.motion.current_frame = Some(next);
    aim_at_frame(entry, next);
    false
}

/// New-keyframe tick: compute the constant velocities that carry the
/// object from where it is now to the frame's target over its duration.
fn aim_at_frame(entry: &mut Entry, index: usize) {
    let Some(frame) = entry.motion.frame(index) else {
        return;
    };
    let duration = frame.duration.max(TICK_SECONDS);
    entry.object.apply_motion_write(|transform| {
        transform.velocity = match frame.position {
            Some(target) => (target - transform.position) / duration as f32,
            None => Vec3::ZERO,
        };
        transform.angular_velocity = match frame.rotation {
            Some(target) => {
                (target * transform.rotation.inverse()).to_scaled_axis() / duration as f32
            }
            None => Vec3::ZERO,
        };
    });
}

/// Continuation tick: Euler-integrate the current velocities.
fn integrate(entry: &mut Entry, dt: f64) {
    let dt = dt as f32;
    entry.object.apply_motion_write(|transform| {
        transform.position += transform.velocity * dt;
        let step = glam::Quat::from_scaled_axis(transform.angular_velocity * dt);
        transform.rotation = (step * transform.rotation).normalize();
    });
}

/// Land exactly on a completed frame's target, cancelling integration
/// drift.
fn snap_to_frame(entry: &mut Entry, index: usize) {
    let Some(frame) = entry.motion.frame(index) else {
        return;
    };
    entry.object.apply_motion_write(|transform| {
        if let Some(position) = frame.position {
            transform.position = position;
        }
        if let Some(rotation) = frame.rotation {
            transform.rotation = rotation;
        }
    });
}
