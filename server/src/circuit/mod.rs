//! The message transport / circuit layer.
//!
//! Raw datagrams come in, are decoded into typed messages, deduplicated
//! and acknowledged per circuit, then dispatched onto bounded handler
//! queues drained by dedicated worker threads. Reliable sends are
//! retained and retransmitted until acked or the retry ceiling kills
//! the circuit.

mod circuit;
mod handler;
mod manager;

pub use circuit::Circuit;
pub use handler::{HandlerError, HandlerThread};
pub use manager::{CircuitError, CircuitManager, DatagramSink, InboundMessage, Trust};
