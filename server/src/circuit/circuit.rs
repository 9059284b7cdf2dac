use std::net::SocketAddr;
use std::time::{Duration, Instant};

use uuid::Uuid;

use veldt_shared::{
    encode, AckFailure, AckManager, Message, Packet, PacketType, SequenceWindow,
};

/// Represents one client connection: remote endpoint, authenticated
/// identity and the reliable-delivery state for both directions.
///
/// Owned exclusively by the transport layer; handler threads only ever
/// see the identifiers copied into their queued messages.
pub struct Circuit {
    pub address: SocketAddr,
    pub circuit_code: u32,
    pub agent_id: Uuid,
    pub session_id: Uuid,
    acks: AckManager,
    window: SequenceWindow,
    pending_acks: Vec<u16>,
    last_heard: Instant,
}

impl Circuit {
    pub fn new(
        address: SocketAddr,
        circuit_code: u32,
        agent_id: Uuid,
        session_id: Uuid,
        now: Instant,
    ) -> Self {
        Self {
            address,
            circuit_code,
            agent_id,
            session_id,
            acks: AckManager::new(),
            window: SequenceWindow::new(),
            pending_acks: Vec::new(),
            last_heard: now,
        }
    }

    /// Whether a payload's embedded identity matches this circuit's
    /// authenticated identity.
    pub fn verify_identity(&self, agent_id: &Uuid, session_id: &Uuid) -> bool {
        self.agent_id == *agent_id && self.session_id == *session_id
    }

    pub fn mark_heard(&mut self, now: Instant) {
        self.last_heard = now;
    }

    pub fn silent_for(&self, now: Instant) -> Duration {
        now.duration_since(self.last_heard)
    }

    /// Receiver-side duplicate detection. Returns false for sequences
    /// already delivered (retransmits of acked-but-lost acks).
    pub fn accept_sequence(&mut self, sequence: u16) -> bool {
        self.window.accept(sequence)
    }

    /// Queues an acknowledgment for a received reliable sequence.
    pub fn queue_ack(&mut self, sequence: u16) {
        self.pending_acks.push(sequence);
    }

    /// Drains queued acks into a standalone Ack packet, if any.
    pub fn flush_acks(&mut self) -> Option<Vec<u8>> {
        if self.pending_acks.is_empty() {
            return None;
        }
        let acks = std::mem::take(&mut self.pending_acks);
        let sequence = self.acks.next_sequence();
        Some(encode(&Packet::acks(sequence, acks)))
    }

    pub fn process_acks(&mut self, sequences: &[u16]) {
        for sequence in sequences {
            self.acks.process_ack(*sequence);
        }
    }

    /// Encodes an outgoing message, assigning its sequence and retaining
    /// the payload when reliable.
    pub fn encode_message(&mut self, message: Message, reliable: bool, now: Instant) -> Vec<u8> {
        let sequence = self.acks.next_sequence();
        let bytes = encode(&Packet::data(sequence, reliable, message));
        if reliable {
            self.acks.track(sequence, bytes.clone(), now);
        }
        bytes
    }

    /// Encodes a control packet (ping/pong/disconnect).
    pub fn encode_control(&mut self, packet_type: PacketType) -> Vec<u8> {
        let sequence = self.acks.next_sequence();
        encode(&Packet::control(packet_type, sequence))
    }

    pub fn outstanding_reliable(&self) -> usize {
        self.acks.outstanding()
    }

    /// Collects reliable payloads due for retransmission; the error
    /// means this circuit has exceeded its retry ceiling and must die.
    pub fn collect_resends(
        &mut self,
        now: Instant,
        resend_interval: Duration,
        retry_ceiling: u8,
    ) -> Result<Vec<Vec<u8>>, AckFailure> {
        self.acks.collect_resends(now, resend_interval, retry_ceiling)
    }
}
