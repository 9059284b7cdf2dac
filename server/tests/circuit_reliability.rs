use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Instant;

use uuid::Uuid;

use veldt_server::{CircuitManager, DatagramSink, RegionConfig, Trust};
use veldt_shared::{decode, encode, Message, MessageKind, Packet, Payload};

struct CaptureSink {
    sent: Mutex<Vec<(SocketAddr, Vec<u8>)>>,
}

impl CaptureSink {
    fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
        }
    }
}

impl DatagramSink for CaptureSink {
    fn send(&self, address: SocketAddr, bytes: &[u8]) {
        self.sent.lock().unwrap().push((address, bytes.to_vec()));
    }
}

struct Client {
    address: SocketAddr,
    agent_id: Uuid,
    session_id: Uuid,
}

fn connect(manager: &CircuitManager<CaptureSink>, port: u16, code: u32, now: Instant) -> Client {
    let _ = env_logger::builder().is_test(true).try_init();
    let client = Client {
        address: format!("10.0.0.1:{}", port).parse().unwrap(),
        agent_id: Uuid::new_v4(),
        session_id: Uuid::new_v4(),
    };
    manager.expect_circuit(code, client.agent_id, client.session_id);
    let handshake = encode(&Packet::data(
        0,
        true,
        Message::UseCircuitCode {
            code,
            agent_id: client.agent_id,
            session_id: client.session_id,
        },
    ));
    manager.process_datagram(client.address, &handshake, now);
    assert!(manager.is_connected(&client.address));
    client
}

fn kick(reason: &str) -> Message {
    Message::KickUser {
        reason: reason.to_string(),
    }
}

#[test]
fn retry_ceiling_kills_only_the_silent_circuit() {
    let config = RegionConfig::default();
    let resend = config.resend_interval;
    let ceiling = config.ack_retry_ceiling as u32;
    let manager = CircuitManager::new(config, CaptureSink::new());
    let now = Instant::now();

    let silent = connect(&manager, 4001, 11, now);
    let healthy = connect(&manager, 4002, 22, now);

    manager.send_reliable(&silent.address, kick("afk"), now).unwrap();
    manager
        .send_reliable(&healthy.address, kick("afk"), now)
        .unwrap();

    // the healthy client acks its packet; the silent one never answers
    let sequence = {
        let manager_sink: &CaptureSink = manager.sink();
        let sent = manager_sink.sent.lock().unwrap();
        let (_, bytes) = sent
            .iter()
            .rev()
            .find(|(address, _)| *address == healthy.address)
            .expect("reliable send was not written to the wire");
        decode(bytes).unwrap().header.sequence
    };
    let ack = encode(&Packet::acks(0, vec![sequence]));
    manager.process_datagram(healthy.address, &ack, now);

    // drive resends until the ceiling trips
    let mut dead = Vec::new();
    for round in 1..=(ceiling + 1) {
        let later = now + resend * (round + 1);
        dead = manager.service(later);
        if !dead.is_empty() {
            break;
        }
    }

    assert_eq!(dead, vec![silent.address]);
    assert!(!manager.is_connected(&silent.address));
    assert!(manager.is_connected(&healthy.address));
}

#[test]
fn duplicate_datagrams_dispatch_once_and_are_reacked() {
    let manager = CircuitManager::new(RegionConfig::default(), CaptureSink::new());
    let now = Instant::now();
    let client = connect(&manager, 5001, 33, now);

    let receiver = manager
        .register_handler(MessageKind::ChatFromViewer, Trust::NotTrusted)
        .unwrap();

    let chat = encode(&Packet::data(
        1,
        true,
        Message::ChatFromViewer {
            agent_id: client.agent_id,
            session_id: client.session_id,
            channel: 0,
            text: "hello".to_string(),
        },
    ));
    manager.process_datagram(client.address, &chat, now);
    // the ack for sequence 1 was lost; the client retransmits
    manager.process_datagram(client.address, &chat, now);

    assert_eq!(receiver.len(), 1);
    let inbound = receiver.recv().unwrap();
    assert_eq!(inbound.agent_id, client.agent_id);

    // both receptions queued an ack, so the lost-ack retransmit is
    // answered too
    let acked: Vec<u16> = {
        let sent = manager.sink().sent.lock().unwrap();
        sent.iter()
            .filter(|(address, _)| *address == client.address)
            .filter_map(|(_, bytes)| match decode(bytes).ok()?.payload {
                Payload::Acks(sequences) => Some(sequences),
                _ => None,
            })
            .flatten()
            .collect()
    };
    assert!(acked.is_empty(), "acks flush in service, not inline");
    manager.service(now);
    let acked: Vec<u16> = {
        let sent = manager.sink().sent.lock().unwrap();
        sent.iter()
            .filter(|(address, _)| *address == client.address)
            .filter_map(|(_, bytes)| match decode(bytes).ok()?.payload {
                Payload::Acks(sequences) => Some(sequences),
                _ => None,
            })
            .flatten()
            .collect()
    };
    assert_eq!(acked, vec![0, 1, 1]);
}

#[test]
fn handshake_retransmit_keeps_circuit_state_intact() {
    let manager = CircuitManager::new(RegionConfig::default(), CaptureSink::new());
    let now = Instant::now();
    let client = connect(&manager, 5501, 55, now);

    let receiver = manager
        .register_handler(MessageKind::ChatFromViewer, Trust::NotTrusted)
        .unwrap();

    let chat = encode(&Packet::data(
        1,
        true,
        Message::ChatFromViewer {
            agent_id: client.agent_id,
            session_id: client.session_id,
            channel: 0,
            text: "hello".to_string(),
        },
    ));
    manager.process_datagram(client.address, &chat, now);
    assert_eq!(receiver.len(), 1);

    // the handshake ack was lost, so the client sends it again
    let handshake = encode(&Packet::data(
        0,
        true,
        Message::UseCircuitCode {
            code: 55,
            agent_id: client.agent_id,
            session_id: client.session_id,
        },
    ));
    manager.process_datagram(client.address, &handshake, now);
    assert!(manager.is_connected(&client.address));
    assert_eq!(manager.circuit_count(), 1);

    // duplicate detection survived the retransmit: an already-delivered
    // sequence must not dispatch a second time
    manager.process_datagram(client.address, &chat, now);
    assert_eq!(receiver.len(), 1);

    // every reception, the replayed handshake included, is re-acked
    manager.service(now);
    let acked: Vec<u16> = {
        let sent = manager.sink().sent.lock().unwrap();
        sent.iter()
            .filter(|(address, _)| *address == client.address)
            .filter_map(|(_, bytes)| match decode(bytes).ok()?.payload {
                Payload::Acks(sequences) => Some(sequences),
                _ => None,
            })
            .flatten()
            .collect()
    };
    assert_eq!(acked, vec![0, 1, 0, 1]);
}

#[test]
fn spoofed_identity_is_dropped_silently() {
    let manager = CircuitManager::new(RegionConfig::default(), CaptureSink::new());
    let now = Instant::now();
    let client = connect(&manager, 6001, 44, now);

    let receiver = manager
        .register_handler(MessageKind::ObjectTouch, Trust::NotTrusted)
        .unwrap();

    let spoofed = encode(&Packet::data(
        1,
        false,
        Message::ObjectTouch {
            agent_id: Uuid::new_v4(),
            session_id: client.session_id,
            object_id: Uuid::new_v4(),
        },
    ));
    manager.process_datagram(client.address, &spoofed, now);
    assert!(receiver.is_empty());

    // the genuine identity passes
    let genuine = encode(&Packet::data(
        2,
        false,
        Message::ObjectTouch {
            agent_id: client.agent_id,
            session_id: client.session_id,
            object_id: Uuid::new_v4(),
        },
    ));
    manager.process_datagram(client.address, &genuine, now);
    assert_eq!(receiver.len(), 1);
}

#[test]
fn a_full_handler_queue_drops_overflow_instead_of_blocking() {
    let config = RegionConfig {
        handler_queue_bound: 2,
        ..RegionConfig::default()
    };
    let manager = CircuitManager::new(config, CaptureSink::new());
    let now = Instant::now();
    let client = connect(&manager, 8001, 88, now);

    let receiver = manager
        .register_handler(MessageKind::ObjectTouch, Trust::NotTrusted)
        .unwrap();

    // nothing drains the queue while five touches arrive
    for sequence in 1..=5 {
        let touch = encode(&Packet::data(
            sequence,
            false,
            Message::ObjectTouch {
                agent_id: client.agent_id,
                session_id: client.session_id,
                object_id: Uuid::new_v4(),
            },
        ));
        manager.process_datagram(client.address, &touch, now);
    }

    assert_eq!(receiver.len(), 2);
    assert!(manager.is_connected(&client.address));
}

#[test]
fn handshake_with_wrong_code_is_rejected() {
    let manager = CircuitManager::new(RegionConfig::default(), CaptureSink::new());
    let now = Instant::now();
    let address: SocketAddr = "10.0.0.9:7001".parse().unwrap();

    manager.expect_circuit(77, Uuid::new_v4(), Uuid::new_v4());
    let handshake = encode(&Packet::data(
        0,
        true,
        Message::UseCircuitCode {
            code: 78,
            agent_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
        },
    ));
    manager.process_datagram(address, &handshake, now);
    assert!(!manager.is_connected(&address));
    assert_eq!(manager.circuit_count(), 0);
}
