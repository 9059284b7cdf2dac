use std::sync::Arc;

use glam::Vec3;

use veldt_server::{
    DispatchOutcome, EventKind, MemoryAssetStore, MotionController, SceneError, SceneObject,
    ScriptContext, ScriptEngine, ScriptEvent, ScriptState, TICK_SECONDS,
};
use veldt_shared::{KeyframedMotion, PlayMode};

fn forward_program(frames: &[(Vec3, f64)]) -> KeyframedMotion {
    KeyframedMotion::try_new(
        PlayMode::Forward,
        Some(frames.iter().map(|(position, _)| *position).collect()),
        None,
        frames.iter().map(|(_, duration)| *duration).collect(),
    )
    .unwrap()
}

#[test]
fn script_writes_are_rejected_while_a_motion_runs() {
    let engine = Arc::new(ScriptEngine::new(Arc::new(MemoryAssetStore::new())));
    let controller = MotionController::new(engine.clone());
    let object = SceneObject::new("platform");
    let id = object.id();

    controller.start(
        object.clone(),
        forward_program(&[(Vec3::new(0.0, 0.0, 4.0), 1.0)]),
    );

    assert_eq!(
        object.set_position(Vec3::ONE),
        Err(SceneError::MotionActive(id))
    );

    controller.stop(&id).unwrap();
    assert!(object.set_position(Vec3::ONE).is_ok());
}

#[test]
fn forward_completion_reaches_the_script_as_one_link_message() {
    let engine = Arc::new(ScriptEngine::new(Arc::new(MemoryAssetStore::new())));
    let controller = MotionController::new(engine.clone());
    let object = SceneObject::new("elevator");
    let id = object.id();

    let instance = engine
        .attach(object.clone(), vec![ScriptState::new("default")])
        .unwrap();

    controller.start(object, forward_program(&[(Vec3::new(0.0, 0.0, 10.0), 0.2)]));
    // Started is posted through the sink before any ticking
    assert_eq!(instance.queued_len(), 1);

    // run well past the program's length; Ended must not repeat
    for _ in 0..50 {
        controller.tick(TICK_SECONDS);
    }

    let queued = instance.queued_len();
    assert_eq!(queued, 2, "expected exactly started + ended, got {}", queued);

    // drain: lazy entry consumes the first slot, then the two link messages
    instance.process_event();
    instance.process_event();
    assert_eq!(instance.process_event(), veldt_server::Processed::Handled(EventKind::LinkMessage));
    assert_eq!(instance.process_event(), veldt_server::Processed::Idle);
}

#[test]
fn a_script_owned_motion_stops_on_state_change() {
    let engine = Arc::new(ScriptEngine::new(Arc::new(MemoryAssetStore::new())));
    let controller = Arc::new(MotionController::new(engine.clone()));
    let object = SceneObject::new("patrol");
    let id = object.id();

    let ctrl = controller.clone();
    let default = ScriptState::new("default").on(
        EventKind::Touch,
        move |ctx: &mut ScriptContext, _event: &ScriptEvent| {
            let stopper_ctrl = ctrl.clone();
            ctx.own_motion(move || {
                let _ = stopper_ctrl.stop(&id);
            });
            Ok(DispatchOutcome::ChangeState("halted".to_string()))
        },
    );
    let halted = ScriptState::new("halted");

    let instance = engine
        .attach(object.clone(), vec![default, halted])
        .unwrap();
    controller.start(
        object.clone(),
        forward_program(&[(Vec3::new(3.0, 0.0, 0.0), 5.0)]),
    );
    assert!(object.motion_owned());

    instance.post_event(ScriptEvent::Touch {
        toucher: uuid::Uuid::new_v4(),
    });
    instance.process_event(); // lazy entry
    instance.process_event(); // the motion-started link message
    instance.process_event(); // touch -> owns motion, then transitions

    // the transition's cleanup ran the owned-motion stopper
    assert!(!object.motion_owned());
    assert!(!controller.snapshot(&id).unwrap().running);
}

#[test]
fn integration_moves_the_object_toward_the_keyframe_target() {
    let engine = Arc::new(ScriptEngine::new(Arc::new(MemoryAssetStore::new())));
    let controller = MotionController::new(engine);
    let object = SceneObject::new("drone");
    let target = Vec3::new(9.0, 0.0, 0.0);

    controller.start(object.clone(), forward_program(&[(target, 1.0)]));

    // half the frame duration: the object should be under way
    for _ in 0..22 {
        controller.tick(TICK_SECONDS);
    }
    let midway = object.transform().position;
    assert!(midway.x > 1.0 && midway.x < 9.0, "midway at {:?}", midway);

    for _ in 0..40 {
        controller.tick(TICK_SECONDS);
    }
    assert_eq!(object.transform().position, target);
}
