//! Keyframed-motion persistence round trips.

use glam::{Quat, Vec3};
use veldt_shared::{KeyframedMotion, MotionError, PlayMode};

fn program_with_frames(frames: usize) -> KeyframedMotion {
    let positions: Vec<Vec3> = (0..frames)
        .map(|i| Vec3::new(i as f32, 0.0, -(i as f32)))
        .collect();
    let rotations: Vec<Quat> = (0..frames)
        .map(|i| Quat::from_rotation_y(0.1 * i as f32))
        .collect();
    let durations: Vec<f64> = (0..frames).map(|i| 0.5 + i as f64).collect();
    KeyframedMotion::try_new(PlayMode::Loop, Some(positions), Some(rotations), durations)
        .unwrap()
}

#[test]
fn round_trip_is_byte_for_byte_stable() {
    for frames in [1, 2, 7, 32] {
        let mut motion = program_with_frames(frames);
        motion.running = true;
        motion.current_frame = Some(frames - 1);
        motion.time_in_frame = 0.125;

        let bytes = motion.serialize();
        let restored = KeyframedMotion::deserialize(&bytes).unwrap();
        assert_eq!(restored, motion);
        assert_eq!(restored.serialize(), bytes);
    }
}

#[test]
fn translation_only_and_rotation_only_round_trip() {
    let translation_only = KeyframedMotion::try_new(
        PlayMode::Forward,
        Some(vec![Vec3::ONE, Vec3::ZERO]),
        None,
        vec![1.0, 2.0],
    )
    .unwrap();
    let restored = KeyframedMotion::deserialize(&translation_only.serialize()).unwrap();
    assert!(restored.has_translation());
    assert!(!restored.has_rotation());
    assert_eq!(restored, translation_only);

    let rotation_only = KeyframedMotion::try_new(
        PlayMode::Reverse,
        None,
        Some(vec![Quat::IDENTITY, Quat::from_rotation_z(1.0)]),
        vec![1.0, 2.0],
    )
    .unwrap();
    let restored = KeyframedMotion::deserialize(&rotation_only.serialize()).unwrap();
    assert_eq!(restored, rotation_only);
}

#[test]
fn tampered_array_lengths_fail_instead_of_truncating() {
    let motion = program_with_frames(3);
    let mut bytes = motion.serialize();

    // the position array count sits after mode (4), cursor (4), time (8)
    // and the two flags + presence flag (3): flip 3 -> 2
    let count_offset = 4 + 4 + 8 + 2 + 1;
    assert_eq!(bytes[count_offset], 3);
    bytes[count_offset] = 2;

    // shrinking the count desynchronizes the stream; whatever the exact
    // failure, it must be an error, not a silently shorter program
    match KeyframedMotion::deserialize(&bytes) {
        Err(_) => {}
        Ok(program) => panic!(
            "tampered program deserialized with {} frames",
            program.frame_count()
        ),
    }
}

#[test]
fn zero_keyframe_payload_is_rejected() {
    let motion = program_with_frames(1);
    let good = motion.serialize();
    // rebuild the tail with empty arrays: flags say no positions, no
    // rotations, zero durations
    let mut bytes = good[..4 + 4 + 8 + 2].to_vec();
    bytes.extend_from_slice(&[0, 0]); // no positions, no rotations
    bytes.extend_from_slice(&0u16.to_le_bytes()); // zero durations
    assert_eq!(
        KeyframedMotion::deserialize(&bytes).unwrap_err(),
        MotionError::NoKeyframes
    );
}
