//! Fixed-timestep keyframed motion playback.
//!
//! A single [`MotionController`] drives every active motion program in
//! the region at 45 ticks per second, moving each object toward its
//! current keyframe target by Euler integration and reporting start/end
//! transitions through a [`MotionSink`].

mod controller;

pub use controller::{
    MotionControlError, MotionController, MotionEvent, MotionSink, TICK_SECONDS,
};
