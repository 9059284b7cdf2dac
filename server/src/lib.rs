//! # Veldt Server
//! The region server core: circuits speaking the reliable sequenced
//! message protocol, the per-object scripted event state machine, the
//! fixed-tick keyframed motion controller and group IM routing.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

mod config;

pub mod circuit;
pub mod im;
pub mod motion;
pub mod scene;
pub mod script;

pub use config::RegionConfig;

pub use circuit::{
    Circuit, CircuitError, CircuitManager, DatagramSink, HandlerError, HandlerThread,
    InboundMessage, Trust,
};
pub use im::{Delivery, GroupSessions, ImError, ImMessage, ImRouter, Membership};
pub use motion::{MotionControlError, MotionController, MotionEvent, MotionSink, TICK_SECONDS};
pub use scene::{
    AssetError, AssetStore, MemoryAssetStore, Scene, SceneError, SceneObject, Transform,
};
pub use script::{
    ChatOutput, DispatchOutcome, EventKind, Processed, ScriptContext, ScriptEngine,
    ScriptError, ScriptEvent, ScriptInstance, ScriptState, DEBUG_CHANNEL, DEFAULT_STATE,
    INVALID_LISTENER, MAX_LISTENERS,
};
