use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use glam::{Quat, Vec3};
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by scene lookups and transform writes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SceneError {
    #[error("Object {0} is not in the scene")]
    ObjectNotFound(Uuid),

    /// A running keyframed motion owns this object's transform; script
    /// writes are rejected until it is paused or stopped
    #[error("Transform of object {0} is owned by a running motion program")]
    MotionActive(Uuid),
}

/// Shared mutable transform state of one scene object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub velocity: Vec3,
    pub angular_velocity: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
        }
    }
}

/// One object in the scene graph.
///
/// The transform is guarded by the object's own lock; it is only ever
/// reachable through methods that acquire that lock internally, so no
/// caller can hold it across unrelated work. While a motion program is
/// running it takes exclusive ownership of the transform and script
/// writes fail with [`SceneError::MotionActive`].
#[derive(Debug)]
pub struct SceneObject {
    id: Uuid,
    name: String,
    transform: Mutex<Transform>,
    motion_owned: AtomicBool,
}

impl SceneObject {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            name: name.into(),
            transform: Mutex::new(Transform::default()),
            motion_owned: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock_transform(&self) -> MutexGuard<'_, Transform> {
        // a poisoned transform is still structurally valid; recover it
        // so one panicked writer cannot wedge the whole object
        self.transform
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the current transform.
    pub fn transform(&self) -> Transform {
        *self.lock_transform()
    }

    /// Script-driven position write; fails while a motion program owns
    /// the transform.
    pub fn set_position(&self, position: Vec3) -> Result<(), SceneError> {
        if self.motion_owned.load(Ordering::Acquire) {
            return Err(SceneError::MotionActive(self.id));
        }
        self.lock_transform().position = position;
        Ok(())
    }

    /// Script-driven rotation write; fails while a motion program owns
    /// the transform.
    pub fn set_rotation(&self, rotation: Quat) -> Result<(), SceneError> {
        if self.motion_owned.load(Ordering::Acquire) {
            return Err(SceneError::MotionActive(self.id));
        }
        self.lock_transform().rotation = rotation;
        Ok(())
    }

    /// Whether a motion program currently owns the transform.
    pub fn motion_owned(&self) -> bool {
        self.motion_owned.load(Ordering::Acquire)
    }

    pub(crate) fn set_motion_owned(&self, owned: bool) {
        self.motion_owned.store(owned, Ordering::Release);
    }

    /// Transform mutation reserved for the motion controller, applied
    /// under the object lock.
    pub(crate) fn apply_motion_write(&self, write: impl FnOnce(&mut Transform)) {
        let mut transform = self.lock_transform();
        write(&mut transform);
    }
}

/// Registry of scene objects, passed explicitly to the subsystems that
/// need lookups.
pub struct Scene {
    objects: Mutex<HashMap<Uuid, Arc<SceneObject>>>,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert(&self, object: Arc<SceneObject>) {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(object.id(), object);
    }

    pub fn get(&self, id: &Uuid) -> Result<Arc<SceneObject>, SceneError> {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or(SceneError::ObjectNotFound(*id))
    }

    pub fn remove(&self, id: &Uuid) -> Option<Arc<SceneObject>> {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    pub fn len(&self) -> usize {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}
