//! Per-party coordination primitives.
//!
//! Each party owns one reply slot per handshake kind and two countdown
//! latches. A slot holds at most one pending reply; late deliveries into a
//! full slot are dropped on purpose so a reply task can never block.

use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};

/// Capacity-one reply channel. `deliver(None)` signals "peer refused".
pub struct ReplySlot<T> {
    tx: mpsc::Sender<Option<T>>,
    rx: Mutex<mpsc::Receiver<Option<T>>>,
}

impl<T> ReplySlot<T> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self { tx, rx: Mutex::new(rx) }
    }

    /// Non-blocking write; dropped when the slot is already full.
    pub fn deliver(&self, value: Option<T>) {
        let _ = self.tx.try_send(value);
    }

    /// Wait for the next delivery. Outer `None` means the deadline passed.
    pub async fn recv(&self, timeout: Duration) -> Option<Option<T>> {
        let mut rx = self.rx.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(value)) => Some(value),
            Ok(None) => None,
            Err(_) => None,
        }
    }
}

impl<T> Default for ReplySlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Countdown latch: `add` the expected acknowledgment count, `done` on each
/// arrival, `wait` until the count reaches zero.
pub struct AckLatch {
    count: watch::Sender<usize>,
}

impl AckLatch {
    pub fn new() -> Self {
        let (count, _) = watch::channel(0);
        Self { count }
    }

    pub fn add(&self, n: usize) {
        self.count.send_modify(|value| *value += n);
    }

    pub fn done(&self) {
        self.count.send_modify(|value| *value = value.saturating_sub(1));
    }

    pub fn remaining(&self) -> usize {
        *self.count.borrow()
    }

    /// Reset to zero, e.g. after giving up on stragglers.
    pub fn clear(&self) {
        self.count.send_modify(|value| *value = 0);
    }

    /// True when the count reached zero within the deadline.
    pub async fn wait(&self, timeout: Duration) -> bool {
        let mut rx = self.count.subscribe();
        let result = tokio::time::timeout(timeout, rx.wait_for(|value| *value == 0)).await;
        result.is_ok()
    }
}

impl Default for AckLatch {
    fn default() -> Self {
        Self::new()
    }
}

/// The runtime coordination channels of one party.
#[derive(Default)]
pub struct SyncMeta {
    pub cc_slot: ReplySlot<pop_core::infrastructure::transport::CheckConfigReply>,
    pub mc_slot: ReplySlot<pop_core::infrastructure::transport::MergeConfigReply>,
    pub ack_latch: AckLatch,
    pub propagate_latch: AckLatch,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn slot_drops_when_full() {
        let slot: ReplySlot<u32> = ReplySlot::new();
        slot.deliver(Some(1));
        slot.deliver(Some(2));
        assert_eq!(slot.recv(Duration::from_millis(50)).await, Some(Some(1)));
        assert_eq!(slot.recv(Duration::from_millis(50)).await, None);
    }

    #[tokio::test]
    async fn slot_passes_refusals_through() {
        let slot: ReplySlot<u32> = ReplySlot::new();
        slot.deliver(None);
        assert_eq!(slot.recv(Duration::from_millis(50)).await, Some(None));
    }

    #[tokio::test]
    async fn latch_releases_at_zero() {
        let latch = AckLatch::new();
        latch.add(2);
        assert!(!latch.wait(Duration::from_millis(20)).await);
        latch.done();
        latch.done();
        assert!(latch.wait(Duration::from_millis(20)).await);
        assert_eq!(latch.remaining(), 0);
    }

    #[tokio::test]
    async fn latch_tolerates_early_acks() {
        let latch = AckLatch::new();
        latch.done();
        latch.add(1);
        latch.done();
        assert!(latch.wait(Duration::from_millis(20)).await);
    }
}
