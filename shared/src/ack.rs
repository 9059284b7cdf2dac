use std::time::{Duration, Instant};

use thiserror::Error;

use crate::seq::sequence_less_than;

/// The sender-side fate of a circuit whose reliable delivery has failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AckFailure {
    /// A reliable packet went unacknowledged past the retry ceiling.
    /// Fatal to the owning circuit only.
    #[error("Sequence {sequence} unacknowledged after {attempts} sends, circuit is dead")]
    RetryCeiling { sequence: u16, attempts: u8 },
}

/// A reliable packet retained until the remote acknowledges it.
#[derive(Debug, Clone)]
pub struct SentPacket {
    pub sequence: u16,
    pub payload: Vec<u8>,
    pub send_count: u8,
    pub last_send: Instant,
}

/// Sender-side reliable-delivery bookkeeping for one circuit.
///
/// Assigns outgoing sequence numbers, retains reliable payloads keyed by
/// sequence, retransmits on a timer and reports when the retry ceiling
/// is exceeded so the circuit owner can tear the circuit down.
pub struct AckManager {
    next_sequence: u16,
    // ordered by sequence; new sequences are monotonic so push_back suffices
    sent: Vec<SentPacket>,
}

impl AckManager {
    pub fn new() -> Self {
        Self {
            next_sequence: 0,
            sent: Vec::new(),
        }
    }

    /// Assigns the next outgoing sequence number.
    pub fn next_sequence(&mut self) -> u16 {
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        sequence
    }

    /// Start tracking a reliable payload until it is acknowledged.
    pub fn track(&mut self, sequence: u16, payload: Vec<u8>, now: Instant) {
        self.sent.push(SentPacket {
            sequence,
            payload,
            send_count: 1,
            last_send: now,
        });
    }

    /// Process an acknowledgment from the remote. Returns whether the
    /// sequence was outstanding (false for duplicate/unknown acks).
    pub fn process_ack(&mut self, sequence: u16) -> bool {
        // scan from the front, acks usually land for the oldest entry
        let mut index = 0;
        while index < self.sent.len() {
            let outstanding = self.sent[index].sequence;
            if outstanding == sequence {
                self.sent.remove(index);
                return true;
            }
            if sequence_less_than(sequence, outstanding) {
                return false;
            }
            index += 1;
        }
        false
    }

    /// Number of reliable packets awaiting acknowledgment.
    pub fn outstanding(&self) -> usize {
        self.sent.len()
    }

    /// Collects payloads due for retransmission, bumping their send
    /// counts. Fails once any entry has been sent `retry_ceiling` times
    /// without an ack; the caller must then tear down the circuit.
    pub fn collect_resends(
        &mut self,
        now: Instant,
        resend_interval: Duration,
        retry_ceiling: u8,
    ) -> Result<Vec<Vec<u8>>, AckFailure> {
        let mut resends = Vec::new();
        for entry in &mut self.sent {
            if now.duration_since(entry.last_send) < resend_interval {
                continue;
            }
            if entry.send_count >= retry_ceiling {
                return Err(AckFailure::RetryCeiling {
                    sequence: entry.sequence,
                    attempts: entry.send_count,
                });
            }
            entry.send_count += 1;
            entry.last_send = now;
            resends.push(entry.payload.clone());
        }
        Ok(resends)
    }
}

impl Default for AckManager {
    fn default() -> Self {
        Self::new()
    }
}
