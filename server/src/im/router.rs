use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use log::{debug, warn};
use thiserror::Error;
use uuid::Uuid;

use crate::config::RegionConfig;

use super::session::GroupSessions;

/// Errors surfaced through an IM's result callback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImError {
    #[error("IM delivery queue is full")]
    QueueFull,

    #[error("Agent {agent} is not a member of group {group}")]
    NotAMember { agent: Uuid, group: Uuid },

    #[error("IM router is shut down")]
    ShutDown,
}

/// A group instant message in flight.
///
/// `session_id` of `None` marks a session-start request; the router
/// resolves the live session either way and reports the id it used via
/// the result callback.
pub struct ImMessage {
    pub from_agent: Uuid,
    pub from_name: String,
    pub session_id: Option<Uuid>,
    pub group_id: Uuid,
    pub text: String,
    result: Box<dyn FnOnce(Result<Uuid, ImError>) + Send>,
}

impl ImMessage {
    pub fn new(
        from_agent: Uuid,
        from_name: impl Into<String>,
        session_id: Option<Uuid>,
        group_id: Uuid,
        text: impl Into<String>,
        result: impl FnOnce(Result<Uuid, ImError>) + Send + 'static,
    ) -> Self {
        Self {
            from_agent,
            from_name: from_name.into(),
            session_id,
            group_id,
            text: text.into(),
            result: Box::new(result),
        }
    }

    fn resolve(self, result: Result<Uuid, ImError>) {
        (self.result)(result);
    }
}

/// Answers whether an agent belongs to a group, and who the group's
/// members are. Backed by the grid's group service in production, by a
/// table in tests.
pub trait Membership: Send + Sync {
    fn is_member(&self, agent_id: &Uuid, group_id: &Uuid) -> bool;
    fn members(&self, group_id: &Uuid) -> Vec<Uuid>;
}

/// The outward delivery seam: hands one routed message to one
/// participant. Failures are per-recipient and never abort the fan-out.
pub trait Delivery: Send + Sync {
    fn deliver(
        &self,
        to_agent: &Uuid,
        session_id: &Uuid,
        from_agent: &Uuid,
        from_name: &str,
        text: &str,
    ) -> Result<(), String>;
}

struct RouterInner {
    receiver: Receiver<ImMessage>,
    membership: Arc<dyn Membership>,
    delivery: Arc<dyn Delivery>,
    sessions: Arc<GroupSessions>,
    worker_count: AtomicUsize,
    worker_serial: AtomicUsize,
    max_workers: usize,
    recv_timeout: Duration,
    shutdown: AtomicBool,
}

/// Routes group IMs through an elastic worker pool.
///
/// `send` never blocks: it enqueues on a bounded channel and grows the
/// pool by one worker whenever the backlog exceeds the worker count,
/// up to the configured ceiling. Idle workers keep polling; a worker
/// deregisters itself only when it exits on shutdown or channel loss,
/// so the pool can regrow after a failure.
pub struct ImRouter {
    sender: Sender<ImMessage>,
    inner: Arc<RouterInner>,
}

impl ImRouter {
    pub fn new(
        config: &RegionConfig,
        membership: Arc<dyn Membership>,
        delivery: Arc<dyn Delivery>,
        sessions: Arc<GroupSessions>,
    ) -> Self {
        let (sender, receiver) = bounded(config.im_queue_bound);
        Self {
            sender,
            inner: Arc::new(RouterInner {
                receiver,
                membership,
                delivery,
                sessions,
                worker_count: AtomicUsize::new(0),
                worker_serial: AtomicUsize::new(0),
                max_workers: config.im_max_workers,
                recv_timeout: config.handler_recv_timeout,
                shutdown: AtomicBool::new(false),
            }),
        }
    }

    pub fn sessions(&self) -> &GroupSessions {
        &self.inner.sessions
    }

    pub fn worker_count(&self) -> usize {
        self.inner.worker_count.load(Ordering::Acquire)
    }

    /// Enqueues a message for routing. Overflow and shutdown are
    /// reported through the message's own result callback.
    pub fn send(&self, message: ImMessage) {
        if self.inner.shutdown.load(Ordering::Acquire) {
            message.resolve(Err(ImError::ShutDown));
            return;
        }
        match self.sender.try_send(message) {
            Ok(()) => self.grow_pool_if_backlogged(),
            Err(TrySendError::Full(message)) => {
                warn!("IM queue full, failing message from {}", message.from_agent);
                message.resolve(Err(ImError::QueueFull));
            }
            Err(TrySendError::Disconnected(message)) => {
                message.resolve(Err(ImError::ShutDown));
            }
        }
    }

    /// Stops the pool: workers observe the flag within one receive
    /// timeout and exit.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);
    }

    fn grow_pool_if_backlogged(&self) {
        let workers = self.inner.worker_count.load(Ordering::Acquire);
        if self.sender.len() <= workers || workers >= self.inner.max_workers {
            return;
        }
        if self
            .inner
            .worker_count
            .compare_exchange(workers, workers + 1, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // another sender grew the pool first
            return;
        }
        let serial = self.inner.worker_serial.fetch_add(1, Ordering::Relaxed);
        let inner = self.inner.clone();
        std::thread::Builder::new()
            .name(format!("im-worker-{}", serial))
            .spawn(move || run_worker(inner))
            .expect("failed to spawn IM worker thread");
    }
}

/// Decrements the pool count when the worker exits, however it exits.
struct PoolSlot(Arc<RouterInner>);

impl Drop for PoolSlot {
    fn drop(&mut self) {
        self.0.worker_count.fetch_sub(1, Ordering::AcqRel);
    }
}

fn run_worker(inner: Arc<RouterInner>) {
    let _slot = PoolSlot(inner.clone());
    loop {
        if inner.shutdown.load(Ordering::Acquire) {
            return;
        }
        match inner.receiver.recv_timeout(inner.recv_timeout) {
            Ok(message) => route(&inner, message),
            // a drained queue is not an exit condition: the timeout only
            // exists to re-check the shutdown flag
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

fn route(inner: &RouterInner, message: ImMessage) {
    if !inner
        .membership
        .is_member(&message.from_agent, &message.group_id)
    {
        debug!(
            "Dropping IM from {}: not a member of group {}",
            message.from_agent, message.group_id
        );
        let failure = ImError::NotAMember {
            agent: message.from_agent,
            group: message.group_id,
        };
        message.resolve(Err(failure));
        return;
    }

    let seed = inner.membership.members(&message.group_id);
    let session_id = inner.sessions.get_or_create(&message.group_id, &seed);
    inner.sessions.join(&message.group_id, message.from_agent);

    for participant in inner.sessions.participants(&message.group_id) {
        if let Err(reason) = inner.delivery.deliver(
            &participant,
            &session_id,
            &message.from_agent,
            &message.from_name,
            &message.text,
        ) {
            warn!(
                "IM delivery to {} in session {} failed: {}",
                participant, session_id, reason
            );
        }
    }
    message.resolve(Ok(session_id));
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    use crossbeam_channel::unbounded;

    use super::*;

    struct TableMembership {
        groups: HashMap<Uuid, HashSet<Uuid>>,
    }

    impl TableMembership {
        fn with_group(group_id: Uuid, members: &[Uuid]) -> Arc<Self> {
            let mut groups = HashMap::new();
            groups.insert(group_id, members.iter().copied().collect());
            Arc::new(Self { groups })
        }
    }

    impl Membership for TableMembership {
        fn is_member(&self, agent_id: &Uuid, group_id: &Uuid) -> bool {
            self.groups
                .get(group_id)
                .map(|members| members.contains(agent_id))
                .unwrap_or(false)
        }

        fn members(&self, group_id: &Uuid) -> Vec<Uuid> {
            self.groups
                .get(group_id)
                .map(|members| members.iter().copied().collect())
                .unwrap_or_default()
        }
    }

    struct RecordingDelivery {
        delivered: Mutex<Vec<(Uuid, Uuid, String)>>,
    }

    impl RecordingDelivery {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                delivered: Mutex::new(Vec::new()),
            })
        }
    }

    impl Delivery for RecordingDelivery {
        fn deliver(
            &self,
            to_agent: &Uuid,
            session_id: &Uuid,
            _from_agent: &Uuid,
            _from_name: &str,
            text: &str,
        ) -> Result<(), String> {
            self.delivered
                .lock()
                .unwrap()
                .push((*to_agent, *session_id, text.to_string()));
            Ok(())
        }
    }

    fn message_with_result(
        from_agent: Uuid,
        group_id: Uuid,
        text: &str,
    ) -> (ImMessage, Receiver<Result<Uuid, ImError>>) {
        let (tx, rx) = unbounded();
        let message = ImMessage::new(from_agent, "Test Agent", None, group_id, text, move |r| {
            let _ = tx.send(r);
        });
        (message, rx)
    }

    #[test]
    fn routes_to_every_participant_and_reports_the_session() {
        let group = Uuid::new_v4();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let membership = TableMembership::with_group(group, &[alice, bob]);
        let delivery = RecordingDelivery::new();
        let sessions = Arc::new(GroupSessions::new());
        let router = ImRouter::new(
            &RegionConfig::default(),
            membership,
            delivery.clone(),
            sessions.clone(),
        );

        let (message, result) = message_with_result(alice, group, "hello group");
        router.send(message);

        let session_id = result
            .recv_timeout(Duration::from_secs(5))
            .expect("router never resolved the message")
            .expect("routing failed");
        assert_eq!(sessions.session_id(&group), Some(session_id));

        let delivered = delivery.delivered.lock().unwrap();
        let recipients: HashSet<Uuid> = delivered.iter().map(|(to, _, _)| *to).collect();
        assert_eq!(recipients, [alice, bob].into_iter().collect());
        assert!(delivered.iter().all(|(_, s, _)| *s == session_id));
        router.shutdown();
    }

    #[test]
    fn non_member_fails_without_killing_the_worker() {
        let group = Uuid::new_v4();
        let alice = Uuid::new_v4();
        let outsider = Uuid::new_v4();
        let membership = TableMembership::with_group(group, &[alice]);
        let delivery = RecordingDelivery::new();
        let router = ImRouter::new(
            &RegionConfig::default(),
            membership,
            delivery.clone(),
            Arc::new(GroupSessions::new()),
        );

        let (bad, bad_result) = message_with_result(outsider, group, "let me in");
        router.send(bad);
        assert_eq!(
            bad_result.recv_timeout(Duration::from_secs(5)).unwrap(),
            Err(ImError::NotAMember {
                agent: outsider,
                group
            })
        );

        // the same pool still routes valid traffic
        let (good, good_result) = message_with_result(alice, group, "still here");
        router.send(good);
        assert!(good_result
            .recv_timeout(Duration::from_secs(5))
            .unwrap()
            .is_ok());
        router.shutdown();
    }

    #[test]
    fn overflow_fails_through_the_result_callback() {
        let group = Uuid::new_v4();
        let alice = Uuid::new_v4();
        let config = RegionConfig {
            im_queue_bound: 1,
            // no workers may spawn, so the queue cannot drain
            im_max_workers: 0,
            ..RegionConfig::default()
        };
        let router = ImRouter::new(
            &config,
            TableMembership::with_group(group, &[alice]),
            RecordingDelivery::new(),
            Arc::new(GroupSessions::new()),
        );

        let (first, _first_result) = message_with_result(alice, group, "fills the queue");
        router.send(first);
        assert_eq!(router.worker_count(), 0);

        let (second, second_result) = message_with_result(alice, group, "overflows");
        router.send(second);
        assert_eq!(
            second_result.recv_timeout(Duration::from_secs(1)).unwrap(),
            Err(ImError::QueueFull)
        );
    }
}
