use std::default::Default;
use std::time::Duration;

/// Contains Config properties which will be used by the region server's
/// transport, script and IM subsystems. Consulted once at construction
/// per component.
#[derive(Clone)]
pub struct RegionConfig {
    /// Capacity of each registered handler queue; overflowing datagrams
    /// are dropped rather than blocking the receive path
    pub handler_queue_bound: usize,
    /// How long a handler worker blocks waiting for the next message
    /// before re-checking for shutdown
    pub handler_recv_timeout: Duration,
    /// How long a reliable packet may sit unacknowledged before it is
    /// retransmitted
    pub resend_interval: Duration,
    /// Sends per reliable packet before the circuit is considered dead
    pub ack_retry_ceiling: u8,
    /// A circuit that has been silent this long is torn down
    pub circuit_timeout: Duration,
    /// Ceiling for the elastic IM delivery worker pool
    pub im_max_workers: usize,
    /// Capacity of the shared IM delivery queue
    pub im_queue_bound: usize,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            handler_queue_bound: 256,
            handler_recv_timeout: Duration::from_millis(1000),
            resend_interval: Duration::from_millis(500),
            ack_retry_ceiling: 8,
            circuit_timeout: Duration::from_secs(60),
            im_max_workers: 3,
            im_queue_bound: 1024,
        }
    }
}
