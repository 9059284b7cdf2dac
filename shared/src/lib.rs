//! # Veldt Shared
//! Wire protocol, sequence arithmetic, reliable-delivery bookkeeping and
//! the keyframed motion program data model, shared between the veldt
//! region server and its tooling.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

mod ack;
mod header;
mod message;
mod motion;
mod seq;
mod wire;

pub use ack::{AckFailure, AckManager, SentPacket};
pub use header::{PacketType, StandardHeader};
pub use message::{decode, encode, DecodeError, Message, MessageKind, Packet, Payload};
pub use motion::{Keyframe, KeyframedMotion, MotionError, PlayMode};
pub use seq::{
    sequence_greater_than, sequence_less_than, wrapping_diff, SequenceWindow,
    DEFAULT_WINDOW_SIZE,
};
pub use wire::{ByteReader, ByteWriter, Wire, WireError};
