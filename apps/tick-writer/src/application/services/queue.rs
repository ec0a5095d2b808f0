//! Inbound Queue
//!
//! FIFO between producers and the writer's consumer task. Unbounded by
//! default, so `push` never blocks and never fails for depth. A bounded
//! queue applies its [`OverflowPolicy`] when full.
//!
//! Synchronous producers call [`InboundQueue::push`]; producers running on
//! the runtime call [`InboundQueue::push_wait`], which awaits space under
//! [`OverflowPolicy::Block`] instead of parking a worker thread. The
//! consumer awaits [`InboundQueue::recv`].

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};
use tokio::sync::Notify;

/// What a bounded queue does when a push finds it full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Evict the oldest queued item to make room.
    #[default]
    DropOldest,
    /// Reject the incoming item.
    DropNewest,
    /// Wait until the consumer frees a slot.
    ///
    /// `push` parks the calling thread, so async producers must use
    /// `push_wait`.
    Block,
}

impl OverflowPolicy {
    /// Parse a policy name (`drop-oldest`, `drop-newest`, `block`).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "drop-oldest" => Some(Self::DropOldest),
            "drop-newest" => Some(Self::DropNewest),
            "block" => Some(Self::Block),
            _ => None,
        }
    }

    /// Get the policy name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::DropOldest => "drop-oldest",
            Self::DropNewest => "drop-newest",
            Self::Block => "block",
        }
    }
}

/// Queue sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueConfig {
    /// Maximum queued items (`None` = unbounded).
    pub capacity: Option<usize>,
    /// Policy applied when a bounded queue is full.
    pub overflow: OverflowPolicy,
}

impl QueueConfig {
    /// Unbounded queue.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            capacity: None,
            overflow: OverflowPolicy::DropOldest,
        }
    }

    /// Bounded queue with the given overflow policy.
    #[must_use]
    pub const fn bounded(capacity: usize, overflow: OverflowPolicy) -> Self {
        Self {
            capacity: Some(capacity),
            overflow,
        }
    }
}

/// Result of a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Item queued.
    Enqueued,
    /// Item queued after evicting the oldest item.
    DisplacedOldest,
    /// Queue full; item rejected.
    Rejected,
    /// Queue closed; item rejected.
    Closed,
}

impl PushOutcome {
    /// Whether the pushed item made it into the queue.
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Enqueued | Self::DisplacedOldest)
    }
}

#[derive(Debug)]
struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Multi-producer, single-consumer FIFO.
#[derive(Debug)]
pub struct InboundQueue<T> {
    state: Mutex<QueueState<T>>,
    not_empty: Notify,
    not_full: Condvar,
    space: Notify,
    config: QueueConfig,
}

impl<T> InboundQueue<T> {
    /// Create a queue.
    #[must_use]
    pub fn new(config: QueueConfig) -> Self {
        let capacity = config.capacity.map_or(0, |c| c.max(1));
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            not_empty: Notify::new(),
            not_full: Condvar::new(),
            space: Notify::new(),
            config: QueueConfig {
                capacity: config.capacity.map(|c| c.max(1)),
                overflow: config.overflow,
            },
        }
    }

    /// Queue configuration.
    #[must_use]
    pub const fn config(&self) -> QueueConfig {
        self.config
    }

    /// Push an item, applying the overflow policy if the queue is bounded and full.
    pub fn push(&self, item: T) -> PushOutcome {
        let mut state = self.state.lock();
        if state.closed {
            return PushOutcome::Closed;
        }

        let mut outcome = PushOutcome::Enqueued;
        if let Some(capacity) = self.config.capacity
            && state.items.len() >= capacity
        {
            match self.config.overflow {
                OverflowPolicy::DropNewest => return PushOutcome::Rejected,
                OverflowPolicy::DropOldest => {
                    state.items.pop_front();
                    outcome = PushOutcome::DisplacedOldest;
                }
                OverflowPolicy::Block => {
                    while state.items.len() >= capacity && !state.closed {
                        self.not_full.wait(&mut state);
                    }
                    if state.closed {
                        return PushOutcome::Closed;
                    }
                }
            }
        }

        state.items.push_back(item);
        drop(state);
        self.not_empty.notify_one();
        outcome
    }

    /// Push an item, awaiting space instead of parking the thread when the
    /// queue is full under [`OverflowPolicy::Block`]. Other policies behave
    /// exactly like [`push`](Self::push).
    pub async fn push_wait(&self, item: T) -> PushOutcome {
        let (Some(capacity), OverflowPolicy::Block) = (self.config.capacity, self.config.overflow)
        else {
            return self.push(item);
        };

        loop {
            let space = {
                let mut state = self.state.lock();
                if state.closed {
                    return PushOutcome::Closed;
                }
                if state.items.len() < capacity {
                    state.items.push_back(item);
                    drop(state);
                    self.not_empty.notify_one();
                    return PushOutcome::Enqueued;
                }
                // Registered under the lock so a pop between unlock and
                // await still wakes this producer.
                self.space.notified()
            };
            space.await;
        }
    }

    /// Pop the next item without waiting.
    pub fn try_recv(&self) -> Option<T> {
        let item = self.state.lock().items.pop_front();
        if item.is_some() {
            self.freed();
        }
        item
    }

    fn freed(&self) {
        self.not_full.notify_one();
        self.space.notify_waiters();
    }

    /// Wait for the next item. Returns `None` once closed and empty.
    ///
    /// Cancel-safe: an item is only removed when this future completes.
    pub async fn recv(&self) -> Option<T> {
        loop {
            {
                let mut state = self.state.lock();
                if let Some(item) = state.items.pop_front() {
                    drop(state);
                    self.freed();
                    return Some(item);
                }
                if state.closed {
                    return None;
                }
            }
            self.not_empty.notified().await;
        }
    }

    /// Close the queue. Queued items remain receivable; new pushes fail.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.not_full.notify_all();
        self.space.notify_waiters();
        self.not_empty.notify_one();
    }

    /// Whether the queue has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of queued items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Whether no items are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use test_case::test_case;

    use super::*;

    #[test_case("drop-oldest" => Some(OverflowPolicy::DropOldest))]
    #[test_case("DROP_NEWEST" => Some(OverflowPolicy::DropNewest))]
    #[test_case(" block " => Some(OverflowPolicy::Block))]
    #[test_case("spill" => None)]
    fn overflow_policy_parsing(input: &str) -> Option<OverflowPolicy> {
        OverflowPolicy::parse(input)
    }

    #[test]
    fn unbounded_preserves_fifo_order() {
        let queue = InboundQueue::new(QueueConfig::unbounded());
        for i in 0..1_000 {
            assert_eq!(queue.push(i), PushOutcome::Enqueued);
        }
        assert_eq!(queue.len(), 1_000);

        for i in 0..1_000 {
            assert_eq!(queue.try_recv(), Some(i));
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn drop_newest_rejects_when_full() {
        let queue = InboundQueue::new(QueueConfig::bounded(2, OverflowPolicy::DropNewest));
        assert_eq!(queue.push(1), PushOutcome::Enqueued);
        assert_eq!(queue.push(2), PushOutcome::Enqueued);
        assert_eq!(queue.push(3), PushOutcome::Rejected);

        assert_eq!(queue.try_recv(), Some(1));
        assert_eq!(queue.try_recv(), Some(2));
        assert_eq!(queue.try_recv(), None);
    }

    #[test]
    fn drop_oldest_evicts_front() {
        let queue = InboundQueue::new(QueueConfig::bounded(2, OverflowPolicy::DropOldest));
        queue.push(1);
        queue.push(2);
        assert_eq!(queue.push(3), PushOutcome::DisplacedOldest);

        assert_eq!(queue.try_recv(), Some(2));
        assert_eq!(queue.try_recv(), Some(3));
    }

    #[test]
    fn block_waits_for_consumer() {
        let queue = Arc::new(InboundQueue::new(QueueConfig::bounded(
            1,
            OverflowPolicy::Block,
        )));
        queue.push(1);

        let producer = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || queue.push(2))
        };

        std::thread::sleep(Duration::from_millis(50));
        assert!(!producer.is_finished());
        assert_eq!(queue.len(), 1);

        assert_eq!(queue.try_recv(), Some(1));
        assert_eq!(producer.join().unwrap(), PushOutcome::Enqueued);
        assert_eq!(queue.try_recv(), Some(2));
    }

    #[test]
    fn close_releases_blocked_producer() {
        let queue = Arc::new(InboundQueue::new(QueueConfig::bounded(
            1,
            OverflowPolicy::Block,
        )));
        queue.push(1);

        let producer = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || queue.push(2))
        };

        std::thread::sleep(Duration::from_millis(50));
        queue.close();
        assert_eq!(producer.join().unwrap(), PushOutcome::Closed);
    }

    #[test]
    fn push_after_close_is_rejected() {
        let queue = InboundQueue::new(QueueConfig::unbounded());
        queue.push(1);
        queue.close();

        assert!(queue.is_closed());
        assert_eq!(queue.push(2), PushOutcome::Closed);
        assert_eq!(queue.try_recv(), Some(1));
    }

    #[test]
    fn zero_capacity_is_treated_as_one() {
        let queue = InboundQueue::new(QueueConfig::bounded(0, OverflowPolicy::DropNewest));
        assert_eq!(queue.push(1), PushOutcome::Enqueued);
        assert_eq!(queue.push(2), PushOutcome::Rejected);
    }

    #[test]
    fn recv_is_pending_until_push() {
        let queue = InboundQueue::new(QueueConfig::unbounded());
        let mut recv = tokio_test::task::spawn(queue.recv());
        tokio_test::assert_pending!(recv.poll());

        queue.push(7);
        assert!(recv.is_woken());
        tokio_test::assert_ready_eq!(recv.poll(), Some(7));
    }

    #[test]
    fn push_wait_is_pending_until_space_frees() {
        let queue = InboundQueue::new(QueueConfig::bounded(1, OverflowPolicy::Block));
        queue.push(1);

        let mut push = tokio_test::task::spawn(queue.push_wait(2));
        tokio_test::assert_pending!(push.poll());
        assert_eq!(queue.len(), 1);

        assert_eq!(queue.try_recv(), Some(1));
        assert!(push.is_woken());
        tokio_test::assert_ready_eq!(push.poll(), PushOutcome::Enqueued);
        assert_eq!(queue.try_recv(), Some(2));
    }

    #[test]
    fn close_releases_waiting_push() {
        let queue = InboundQueue::new(QueueConfig::bounded(1, OverflowPolicy::Block));
        queue.push(1);

        let mut push = tokio_test::task::spawn(queue.push_wait(2));
        tokio_test::assert_pending!(push.poll());

        queue.close();
        assert!(push.is_woken());
        tokio_test::assert_ready_eq!(push.poll(), PushOutcome::Closed);
    }

    #[test_case(OverflowPolicy::DropNewest => PushOutcome::Rejected)]
    #[test_case(OverflowPolicy::DropOldest => PushOutcome::DisplacedOldest)]
    fn push_wait_never_waits_without_block(overflow: OverflowPolicy) -> PushOutcome {
        let queue = InboundQueue::new(QueueConfig::bounded(1, overflow));
        queue.push(1);

        let mut push = tokio_test::task::spawn(queue.push_wait(2));
        match push.poll() {
            std::task::Poll::Ready(outcome) => outcome,
            std::task::Poll::Pending => panic!("push_wait waited under {overflow:?}"),
        }
    }

    #[tokio::test]
    async fn recv_wakes_on_push_from_thread() {
        let queue = Arc::new(InboundQueue::new(QueueConfig::unbounded()));

        let producer = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                queue.push(42);
            })
        };

        let item = tokio::time::timeout(Duration::from_secs(1), queue.recv())
            .await
            .expect("should receive before timeout");
        assert_eq!(item, Some(42));
        producer.join().unwrap();
    }

    #[tokio::test]
    async fn recv_returns_none_after_close_and_drain() {
        let queue = InboundQueue::new(QueueConfig::unbounded());
        queue.push(1);
        queue.close();

        assert_eq!(queue.recv().await, Some(1));
        assert_eq!(queue.recv().await, None);
    }
}
