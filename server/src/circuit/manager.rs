use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::{debug, info, warn};
use thiserror::Error;
use uuid::Uuid;

use veldt_shared::{decode, Message, MessageKind, PacketType, Payload, StandardHeader};

use super::circuit::Circuit;
use crate::config::RegionConfig;

/// Errors surfaced to local callers of the transport layer. Remote
/// misbehavior (bad datagrams, identity mismatches) is dropped silently
/// and never reaches this type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CircuitError {
    #[error("No circuit open for {address}")]
    UnknownCircuit { address: SocketAddr },

    #[error("Message kind {kind:?} already has a registered handler")]
    HandlerAlreadyRegistered { kind: MessageKind },
}

/// Trust level of a handler registration. NotTrusted handlers have the
/// payload's embedded agent/session identity checked against the
/// circuit before dispatch; a mismatch is a silent drop.
#[derive(Copy, Debug, Clone, Eq, PartialEq)]
pub enum Trust {
    Trusted,
    NotTrusted,
}

/// A decoded message queued for a handler thread, carrying the identity
/// of the circuit it arrived on.
pub struct InboundMessage {
    pub address: SocketAddr,
    pub agent_id: Uuid,
    pub session_id: Uuid,
    pub message: Message,
}

/// Outbound datagram seam; the UDP socket in production, a capture
/// buffer in tests.
pub trait DatagramSink: Send + Sync {
    fn send(&self, address: SocketAddr, bytes: &[u8]);
}

struct HandlerRegistration {
    trust: Trust,
    sender: Sender<InboundMessage>,
}

/// Owns every circuit and routes datagrams between the wire and the
/// registered per-message-kind handler queues.
///
/// The receive path never blocks: queue dispatch is `try_send`, decode
/// failures drop the datagram, and all per-circuit reliable-delivery
/// state advances in `service`.
pub struct CircuitManager<S: DatagramSink> {
    config: RegionConfig,
    sink: S,
    circuits: Mutex<HashMap<SocketAddr, Circuit>>,
    // circuit codes handed out by the login path, awaiting their handshake
    expected: Mutex<HashMap<u32, (Uuid, Uuid)>>,
    handlers: Mutex<HashMap<MessageKind, HandlerRegistration>>,
}

impl<S: DatagramSink> CircuitManager<S> {
    pub fn new(config: RegionConfig, sink: S) -> Self {
        Self {
            config,
            sink,
            circuits: Mutex::new(HashMap::new()),
            expected: Mutex::new(HashMap::new()),
            handlers: Mutex::new(HashMap::new()),
        }
    }

    /// The outbound datagram sink, mainly for capture in tests.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Binds a message kind to a fresh handler queue, bounded at the
    /// configured capacity, and returns its receiving end.
    pub fn register_handler(
        &self,
        kind: MessageKind,
        trust: Trust,
    ) -> Result<Receiver<InboundMessage>, CircuitError> {
        let (sender, receiver) = bounded(self.config.handler_queue_bound);
        self.register_handler_shared(kind, trust, sender)?;
        Ok(receiver)
    }

    /// Binds an additional message kind onto an existing handler queue
    /// by passing a clone of that queue's sender.
    pub fn register_handler_shared(
        &self,
        kind: MessageKind,
        trust: Trust,
        sender: Sender<InboundMessage>,
    ) -> Result<(), CircuitError> {
        let mut handlers = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if handlers.contains_key(&kind) {
            return Err(CircuitError::HandlerAlreadyRegistered { kind });
        }
        handlers.insert(kind, HandlerRegistration { trust, sender });
        Ok(())
    }

    /// Issues a fresh random circuit code for an agent cleared to
    /// connect, registering it for the upcoming handshake.
    pub fn issue_circuit_code(&self, agent_id: Uuid, session_id: Uuid) -> u32 {
        let code = fastrand::u32(1..);
        self.expect_circuit(code, agent_id, session_id);
        code
    }

    /// Pre-registers a circuit code for an agent about to connect; the
    /// handshake is only trusted when it quotes this code and identity.
    pub fn expect_circuit(&self, code: u32, agent_id: Uuid, session_id: Uuid) {
        self.expected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(code, (agent_id, session_id));
    }

    pub fn circuit_count(&self) -> usize {
        self.circuits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_connected(&self, address: &SocketAddr) -> bool {
        self.circuits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(address)
    }

    /// Handles one raw datagram from the socket. Malformed input is
    /// dropped, never propagated: this is the receive loop's boundary.
    pub fn process_datagram(&self, address: SocketAddr, bytes: &[u8], now: Instant) {
        let packet = match decode(bytes) {
            Ok(packet) => packet,
            Err(error) => {
                debug!("Dropping malformed datagram from {}: {}", address, error);
                return;
            }
        };

        let mut circuits = self
            .circuits
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        // the handshake is the only packet accepted without a circuit
        if let Payload::Message(Message::UseCircuitCode {
            code,
            agent_id,
            session_id,
        }) = &packet.payload
        {
            self.open_circuit(
                &mut circuits,
                address,
                &packet.header,
                *code,
                *agent_id,
                *session_id,
                now,
            );
            return;
        }

        let Some(circuit) = circuits.get_mut(&address) else {
            debug!("Dropping packet from unknown endpoint {}", address);
            return;
        };
        circuit.mark_heard(now);

        match packet.header.packet_type {
            PacketType::Data => {
                if !circuit.accept_sequence(packet.header.sequence) {
                    // retransmit of something already delivered; re-ack it
                    if packet.header.reliable {
                        circuit.queue_ack(packet.header.sequence);
                    }
                    return;
                }
                if packet.header.reliable {
                    circuit.queue_ack(packet.header.sequence);
                }
                if let Payload::Message(message) = packet.payload {
                    self.dispatch(circuit, message);
                }
            }
            PacketType::Ack => {
                if let Payload::Acks(sequences) = &packet.payload {
                    circuit.process_acks(sequences);
                }
            }
            PacketType::Ping => {
                let pong = circuit.encode_control(PacketType::Pong);
                self.sink.send(address, &pong);
            }
            PacketType::Pong => {}
            PacketType::Disconnect => {
                info!("Circuit {} disconnected by remote", address);
                circuits.remove(&address);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn open_circuit(
        &self,
        circuits: &mut HashMap<SocketAddr, Circuit>,
        address: SocketAddr,
        header: &StandardHeader,
        code: u32,
        agent_id: Uuid,
        session_id: Uuid,
        now: Instant,
    ) {
        if let Some(circuit) = circuits.get_mut(&address) {
            if circuit.circuit_code == code && circuit.verify_identity(&agent_id, &session_id) {
                // the client lost our ack and retransmitted the handshake;
                // re-ack it without touching the circuit's delivery state
                debug!("Handshake retransmit from {}, re-acking", address);
                circuit.mark_heard(now);
                circuit.accept_sequence(header.sequence);
                if header.reliable {
                    circuit.queue_ack(header.sequence);
                }
                return;
            }
        }

        let expected = self
            .expected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&code)
            .copied();
        match expected {
            Some((expected_agent, expected_session))
                if expected_agent == agent_id && expected_session == session_id =>
            {
                let mut circuit = Circuit::new(address, code, agent_id, session_id, now);
                circuit.accept_sequence(header.sequence);
                if header.reliable {
                    circuit.queue_ack(header.sequence);
                }
                info!("Circuit {} opened for agent {}", address, agent_id);
                circuits.insert(address, circuit);
            }
            _ => {
                warn!(
                    "Rejecting handshake from {} with unknown or mismatched code {}",
                    address, code
                );
            }
        }
    }

    /// Routes one decoded message to its registered handler queue,
    /// enforcing the trust check and never blocking.
    fn dispatch(&self, circuit: &Circuit, message: Message) {
        let kind = message.kind();
        let handlers = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(registration) = handlers.get(&kind) else {
            debug!("No handler registered for {:?}, dropping", kind);
            return;
        };

        if registration.trust == Trust::NotTrusted {
            match message.agent_session() {
                Some((agent_id, session_id))
                    if circuit.verify_identity(&agent_id, &session_id) => {}
                _ => {
                    // spoofed or unverifiable identity: silent drop
                    debug!(
                        "Identity mismatch on {:?} from {}, dropping",
                        kind, circuit.address
                    );
                    return;
                }
            }
        }

        let inbound = InboundMessage {
            address: circuit.address,
            agent_id: circuit.agent_id,
            session_id: circuit.session_id,
            message,
        };
        match registration.sender.try_send(inbound) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Handler queue full for {:?}, dropping message", kind);
            }
            Err(TrySendError::Disconnected(_)) => {
                warn!("Handler queue for {:?} is gone, dropping message", kind);
            }
        }
    }

    /// Sends a message with at-least-once delivery; it is retained and
    /// retransmitted until acked or the retry ceiling tears the circuit
    /// down.
    pub fn send_reliable(
        &self,
        address: &SocketAddr,
        message: Message,
        now: Instant,
    ) -> Result<(), CircuitError> {
        self.send(address, message, true, now)
    }

    /// Fire-and-forget send.
    pub fn send_unreliable(
        &self,
        address: &SocketAddr,
        message: Message,
        now: Instant,
    ) -> Result<(), CircuitError> {
        self.send(address, message, false, now)
    }

    fn send(
        &self,
        address: &SocketAddr,
        message: Message,
        reliable: bool,
        now: Instant,
    ) -> Result<(), CircuitError> {
        let mut circuits = self
            .circuits
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let circuit = circuits
            .get_mut(address)
            .ok_or(CircuitError::UnknownCircuit { address: *address })?;
        let bytes = circuit.encode_message(message, reliable, now);
        self.sink.send(*address, &bytes);
        Ok(())
    }

    /// Periodic maintenance pass: flushes queued acks, retransmits
    /// expired reliable packets and tears down circuits that exceeded
    /// the retry ceiling or went silent. Returns the addresses of every
    /// circuit torn down, each fatal to that circuit alone.
    pub fn service(&self, now: Instant) -> Vec<SocketAddr> {
        let mut circuits = self
            .circuits
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut dead = Vec::new();

        for (address, circuit) in circuits.iter_mut() {
            if let Some(ack_bytes) = circuit.flush_acks() {
                self.sink.send(*address, &ack_bytes);
            }

            if circuit.silent_for(now) > self.config.circuit_timeout {
                info!("Circuit {} timed out", address);
                dead.push(*address);
                continue;
            }

            match circuit.collect_resends(
                now,
                self.config.resend_interval,
                self.config.ack_retry_ceiling,
            ) {
                Ok(resends) => {
                    for bytes in resends {
                        self.sink.send(*address, &bytes);
                    }
                }
                Err(failure) => {
                    warn!("Tearing down circuit {}: {}", address, failure);
                    dead.push(*address);
                }
            }
        }

        // teardown drops the circuit's queued acks and unacked table
        for address in &dead {
            circuits.remove(address);
        }
        dead
    }

    /// Sends a disconnect notice and removes the circuit.
    pub fn close_circuit(&self, address: &SocketAddr) {
        let mut circuits = self
            .circuits
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(mut circuit) = circuits.remove(address) {
            let bytes = circuit.encode_control(PacketType::Disconnect);
            self.sink.send(*address, &bytes);
        }
    }
}
