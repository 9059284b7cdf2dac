use glam::{Quat, Vec3};
use thiserror::Error;

use crate::wire::{ByteReader, ByteWriter, Wire, WireError};

/// Errors raised at the keyframed-motion construction and persistence
/// boundaries. Invalid programs are rejected outright, never silently
/// truncated.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MotionError {
    /// A motion program must hold at least one keyframe
    #[error("Keyframed motion requires at least one keyframe")]
    NoKeyframes,

    /// Optional arrays must match the duration array exactly
    #[error("Keyframe {array} array length {actual} does not match {expected} durations")]
    LengthMismatch {
        array: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Serialized play mode was out of range
    #[error("Invalid play mode value {value}")]
    InvalidPlayMode { value: i32 },

    /// Serialized frame cursor pointed outside the program
    #[error("Frame cursor {cursor} out of range for {frames} keyframes")]
    CursorOutOfRange { cursor: i32, frames: usize },

    /// Underlying wire-format failure
    #[error("Malformed motion data: {0}")]
    Wire(#[from] WireError),
}

/// Playback mode for a keyframed motion program.
#[derive(Copy, Debug, Clone, Eq, PartialEq)]
pub enum PlayMode {
    Forward,
    Loop,
    PingPong,
    Reverse,
}

impl PlayMode {
    pub fn to_i32(self) -> i32 {
        match self {
            PlayMode::Forward => 0,
            PlayMode::Loop => 1,
            PlayMode::PingPong => 2,
            PlayMode::Reverse => 3,
        }
    }

    pub fn from_i32(value: i32) -> Result<Self, MotionError> {
        match value {
            0 => Ok(PlayMode::Forward),
            1 => Ok(PlayMode::Loop),
            2 => Ok(PlayMode::PingPong),
            3 => Ok(PlayMode::Reverse),
            _ => Err(MotionError::InvalidPlayMode { value }),
        }
    }
}

/// One frame of a motion program, as handed out for inspection: target
/// transform plus how long the object should take to reach it.
#[derive(Debug, Clone, PartialEq)]
pub struct Keyframe {
    pub position: Option<Vec3>,
    pub rotation: Option<Quat>,
    pub duration: f64,
}

/// An ordered keyframe sequence plus its playback cursor.
///
/// Translation and rotation are enabled program-wide: when the position
/// array is present it must be exactly as long as the duration array,
/// likewise rotations. `Clone` is a deep copy, used to hand out
/// snapshots without exposing the live program to torn reads.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyframedMotion {
    pub mode: PlayMode,
    positions: Option<Vec<Vec3>>,
    rotations: Option<Vec<Quat>>,
    durations: Vec<f64>,
    /// Active frame cursor; `None` means no frame is active yet
    pub current_frame: Option<usize>,
    /// Seconds accumulated within the active frame
    pub time_in_frame: f64,
    pub running: bool,
    pub running_reverse: bool,
}

impl KeyframedMotion {
    /// Builds a program, rejecting empty or mismatched keyframe arrays.
    pub fn try_new(
        mode: PlayMode,
        positions: Option<Vec<Vec3>>,
        rotations: Option<Vec<Quat>>,
        durations: Vec<f64>,
    ) -> Result<Self, MotionError> {
        if durations.is_empty() {
            return Err(MotionError::NoKeyframes);
        }
        if let Some(positions) = &positions {
            if positions.len() != durations.len() {
                return Err(MotionError::LengthMismatch {
                    array: "position",
                    expected: durations.len(),
                    actual: positions.len(),
                });
            }
        }
        if let Some(rotations) = &rotations {
            if rotations.len() != durations.len() {
                return Err(MotionError::LengthMismatch {
                    array: "rotation",
                    expected: durations.len(),
                    actual: rotations.len(),
                });
            }
        }
        Ok(Self {
            mode,
            positions,
            rotations,
            durations,
            current_frame: None,
            time_in_frame: 0.0,
            running: false,
            running_reverse: false,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.durations.len()
    }

    /// The target/duration of one frame, or `None` out of range.
    pub fn frame(&self, index: usize) -> Option<Keyframe> {
        if index >= self.durations.len() {
            return None;
        }
        Some(Keyframe {
            position: self.positions.as_ref().map(|p| p[index]),
            rotation: self.rotations.as_ref().map(|r| r[index]),
            duration: self.durations[index],
        })
    }

    pub fn has_translation(&self) -> bool {
        self.positions.is_some()
    }

    pub fn has_rotation(&self) -> bool {
        self.rotations.is_some()
    }

    /// Persists the program in its length-prefixed binary layout:
    /// mode, frame cursor, time position, the two running flags, the
    /// optional position and rotation arrays, then the duration array.
    pub fn serialize(&self) -> Vec<u8> {
        let mut writer = ByteWriter::new();
        self.mode.to_i32().ser(&mut writer);
        let cursor: i32 = match self.current_frame {
            Some(frame) => frame as i32,
            None => -1,
        };
        cursor.ser(&mut writer);
        self.time_in_frame.ser(&mut writer);
        self.running.ser(&mut writer);
        self.running_reverse.ser(&mut writer);

        self.positions.is_some().ser(&mut writer);
        if let Some(positions) = &self.positions {
            positions.ser(&mut writer);
        }
        self.rotations.is_some().ser(&mut writer);
        if let Some(rotations) = &self.rotations {
            rotations.ser(&mut writer);
        }
        self.durations.ser(&mut writer);
        writer.into_bytes()
    }

    /// Restores a persisted program, enforcing the same invariants as
    /// construction: mismatched array lengths are a format error.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, MotionError> {
        let mut reader = ByteReader::new(bytes);
        let mode = PlayMode::from_i32(i32::de(&mut reader)?)?;
        let cursor = i32::de(&mut reader)?;
        let time_in_frame = f64::de(&mut reader)?;
        let running = bool::de(&mut reader)?;
        let running_reverse = bool::de(&mut reader)?;

        let positions = if bool::de(&mut reader)? {
            Some(Vec::<Vec3>::de(&mut reader)?)
        } else {
            None
        };
        let rotations = if bool::de(&mut reader)? {
            Some(Vec::<Quat>::de(&mut reader)?)
        } else {
            None
        };
        let durations = Vec::<f64>::de(&mut reader)?;

        let mut motion = Self::try_new(mode, positions, rotations, durations)?;
        motion.current_frame = match cursor {
            -1 => None,
            frame if frame >= 0 && (frame as usize) < motion.frame_count() => {
                Some(frame as usize)
            }
            frame => {
                return Err(MotionError::CursorOutOfRange {
                    cursor: frame,
                    frames: motion.frame_count(),
                })
            }
        };
        motion.time_in_frame = time_in_frame;
        motion.running = running;
        motion.running_reverse = running_reverse;
        Ok(motion)
    }
}
