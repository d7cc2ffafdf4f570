//! Snapshot-and-clear event collection

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::warn;

use crate::utils::timeout::with_custom_timeout;

/// Buffers events from one listener channel
///
/// `drain` takes whatever has arrived; `collect` waits (up to the deadline)
/// for an expected number of events and then also takes any extras.
pub struct EventCollector<E> {
    receiver: mpsc::Receiver<E>,
    timeout: Duration,
}

impl<E> EventCollector<E> {
    pub fn new(receiver: mpsc::Receiver<E>, timeout: Duration) -> Self {
        Self { receiver, timeout }
    }

    /// Take every event received so far without waiting
    pub fn drain(&mut self) -> Vec<E> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }

    /// Wait for at least `expected` events, or until the timeout elapses
    ///
    /// Returns what arrived; fewer than `expected` means the deadline passed.
    pub async fn collect(&mut self, expected: usize) -> Vec<E> {
        let deadline = Instant::now() + self.timeout;
        let mut events = Vec::with_capacity(expected);
        while events.len() < expected {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match with_custom_timeout(self.receiver.recv(), remaining).await {
                Ok(Some(event)) => events.push(event),
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        "Timed out after {:?} with {} of {} expected events",
                        self.timeout,
                        events.len(),
                        expected
                    );
                    break;
                }
            }
        }
        events.extend(self.drain());
        events
    }

    /// Wait for the next event, up to the timeout
    pub async fn next(&mut self) -> Option<E> {
        with_custom_timeout(self.receiver.recv(), self.timeout)
            .await
            .ok()
            .flatten()
    }
}
