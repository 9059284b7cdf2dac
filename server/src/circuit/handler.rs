use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::warn;
use thiserror::Error;

use super::manager::InboundMessage;

/// A recoverable failure inside one message handler. Logged by the
/// worker loop; never terminates the worker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Handler failed: {reason}")]
pub struct HandlerError {
    pub reason: String,
}

impl HandlerError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl From<String> for HandlerError {
    fn from(reason: String) -> Self {
        Self { reason }
    }
}

impl From<&str> for HandlerError {
    fn from(reason: &str) -> Self {
        Self {
            reason: reason.to_string(),
        }
    }
}

/// A dedicated worker thread draining one handler queue.
///
/// The loop is dequeue-with-timeout, dispatch, log-and-continue on
/// handler failure. It exits only when asked to stop or when every
/// sender for its queue has been dropped.
pub struct HandlerThread {
    shutdown: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl HandlerThread {
    pub fn spawn(
        name: impl Into<String>,
        receiver: Receiver<InboundMessage>,
        recv_timeout: Duration,
        mut handler: impl FnMut(InboundMessage) -> Result<(), HandlerError> + Send + 'static,
    ) -> Self {
        let name = name.into();
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_flag = shutdown.clone();
        let thread_name = name.clone();

        let handle = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || loop {
                match receiver.recv_timeout(recv_timeout) {
                    Ok(message) => {
                        let kind = message.message.kind();
                        if let Err(error) = handler(message) {
                            warn!(
                                "Handler thread '{}' failed on {:?}: {}",
                                thread_name, kind, error
                            );
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => {
                        if shutdown_flag.load(Ordering::Acquire) {
                            break;
                        }
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .expect("failed to spawn handler thread");

        Self { shutdown, handle }
    }

    /// Signals the worker to stop and joins it.
    pub fn stop(self) {
        self.shutdown.store(true, Ordering::Release);
        let _ = self.handle.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use std::net::SocketAddr;
    use std::sync::atomic::AtomicUsize;
    use uuid::Uuid;
    use veldt_shared::Message;

    fn test_message() -> InboundMessage {
        InboundMessage {
            address: "127.0.0.1:1".parse::<SocketAddr>().unwrap(),
            agent_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            message: Message::KickUser {
                reason: "n/a".into(),
            },
        }
    }

    #[test]
    fn a_failing_handler_does_not_kill_the_worker() {
        let (sender, receiver) = bounded(8);
        let handled = Arc::new(AtomicUsize::new(0));
        let handled_counter = handled.clone();

        let worker = HandlerThread::spawn(
            "test-handler",
            receiver,
            Duration::from_millis(20),
            move |_| {
                let count = handled_counter.fetch_add(1, Ordering::SeqCst);
                if count == 0 {
                    Err(HandlerError::new("first message fails"))
                } else {
                    Ok(())
                }
            },
        );

        sender.send(test_message()).unwrap();
        sender.send(test_message()).unwrap();
        drop(sender);
        worker.stop();

        assert_eq!(handled.load(Ordering::SeqCst), 2);
    }
}
