//! Work queue with explicit acknowledgement.
//!
//! Invocations travel through a [`WorkQueue`] as serialized [`Message`]s, one
//! lane per [`TaskQueue`]. A consumer receives a [`Delivery`] and must
//! [`ack`](Delivery::ack) it once the work is done. A delivery dropped without
//! an ack goes back to the front of its lane with its attempt counter bumped,
//! so every message is processed at least once.
//!
//! [`MemoryQueue`] is the in-process implementation. Lanes are bounded: a
//! message occupies capacity from push until ack, and a push that cannot get
//! capacity within the enqueue timeout fails with [`QueueError::Full`].

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use gitmate_framework::{SubmitError, TaskQueue};

// ============================================================================
// Errors
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// The queue has been closed.
    #[error("queue is closed")]
    Closed,

    /// No capacity became available within the enqueue timeout.
    #[error("queue '{queue}' is full (waited {waited:?})")]
    Full { queue: TaskQueue, waited: Duration },
}

pub type QueueResult<T> = Result<T, QueueError>;

impl From<QueueError> for SubmitError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Closed => SubmitError::Unavailable(err.to_string()),
            QueueError::Full { queue, waited } => SubmitError::Backpressure {
                queue: queue.to_string(),
                waited,
            },
        }
    }
}

// ============================================================================
// Message / Delivery
// ============================================================================

/// A serialized unit of work.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub task_id: Uuid,
    /// JSON encoding of the invocation.
    pub body: String,
    /// Delivery attempt, starting at 1.
    pub attempt: u32,
}

impl Message {
    pub fn new(task_id: Uuid, body: String) -> Self {
        Self {
            task_id,
            body,
            attempt: 1,
        }
    }

    /// Whether this message was handed out before and not acknowledged.
    pub fn redelivered(&self) -> bool {
        self.attempt > 1
    }
}

/// Settles deliveries with the queue they came from.
pub trait Settle: Send + Sync {
    /// The message was processed and leaves the queue.
    fn ack(&self, queue: TaskQueue, task_id: Uuid);

    /// The message was not processed and must be delivered again.
    fn requeue(&self, queue: TaskQueue, message: Message);
}

/// A message handed to a consumer.
///
/// Dropping a delivery without calling [`ack`](Self::ack) requeues it.
pub struct Delivery {
    queue: TaskQueue,
    message: Message,
    settled: bool,
    origin: Arc<dyn Settle>,
}

impl Delivery {
    pub fn new(queue: TaskQueue, message: Message, origin: Arc<dyn Settle>) -> Self {
        Self {
            queue,
            message,
            settled: false,
            origin,
        }
    }

    pub fn queue(&self) -> TaskQueue {
        self.queue
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Acknowledges the delivery.
    pub fn ack(mut self) {
        self.settled = true;
        self.origin.ack(self.queue, self.message.task_id);
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut message = std::mem::take(&mut self.message);
        message.attempt += 1;
        self.origin.requeue(self.queue, message);
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("queue", &self.queue)
            .field("message", &self.message)
            .field("settled", &self.settled)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// WorkQueue
// ============================================================================

/// A set of named FIFO lanes with at-least-once delivery.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Appends a message to the lane for `queue`, waiting for capacity.
    async fn push(&self, queue: TaskQueue, message: Message) -> QueueResult<()>;

    /// Waits for the next message on `queue`.
    async fn poll(&self, queue: TaskQueue) -> QueueResult<Delivery>;

    /// Closes the queue. Pending and future polls and pushes fail with
    /// [`QueueError::Closed`], and unacknowledged deliveries are discarded.
    ///
    /// This does not touch callers' handles; close through
    /// [`QueueBackend::close`](crate::worker::QueueBackend::close) to resolve
    /// them.
    fn close(&self);
}

// ============================================================================
// MemoryQueue
// ============================================================================

struct Lane {
    messages: Mutex<VecDeque<Message>>,
    ready: Notify,
    capacity: Semaphore,
}

impl Lane {
    fn new(capacity: usize) -> Self {
        Self {
            messages: Mutex::new(VecDeque::new()),
            ready: Notify::new(),
            capacity: Semaphore::new(capacity),
        }
    }
}

struct Lanes {
    short: Lane,
    long: Lane,
    analysis: Lane,
    closed: AtomicBool,
}

impl Lanes {
    fn lane(&self, queue: TaskQueue) -> &Lane {
        match queue {
            TaskQueue::Short => &self.short,
            TaskQueue::Long => &self.long,
            TaskQueue::Analysis => &self.analysis,
        }
    }
}

impl Settle for Lanes {
    fn ack(&self, queue: TaskQueue, task_id: Uuid) {
        trace!(queue = %queue, task_id = %task_id, "Delivery acknowledged");
        self.lane(queue).capacity.add_permits(1);
    }

    fn requeue(&self, queue: TaskQueue, message: Message) {
        if self.closed.load(Ordering::Acquire) {
            warn!(queue = %queue, task_id = %message.task_id, "Queue closed, dropping unacknowledged message");
            return;
        }
        debug!(
            queue = %queue,
            task_id = %message.task_id,
            attempt = message.attempt,
            "Delivery not acknowledged, requeueing"
        );
        let lane = self.lane(queue);
        lane.messages.lock().push_front(message);
        lane.ready.notify_one();
    }
}

/// In-process [`WorkQueue`].
#[derive(Clone)]
pub struct MemoryQueue {
    lanes: Arc<Lanes>,
    enqueue_timeout: Duration,
}

impl MemoryQueue {
    /// Creates a queue whose lanes each hold at most `capacity` unacknowledged
    /// messages.
    pub fn new(capacity: usize, enqueue_timeout: Duration) -> Self {
        Self {
            lanes: Arc::new(Lanes {
                short: Lane::new(capacity),
                long: Lane::new(capacity),
                analysis: Lane::new(capacity),
                closed: AtomicBool::new(false),
            }),
            enqueue_timeout,
        }
    }

    /// Number of messages waiting in `queue`, not counting deliveries in flight.
    pub fn len(&self, queue: TaskQueue) -> usize {
        self.lanes.lane(queue).messages.lock().len()
    }

    pub fn is_empty(&self, queue: TaskQueue) -> bool {
        self.len(queue) == 0
    }

    pub fn is_closed(&self) -> bool {
        self.lanes.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl WorkQueue for MemoryQueue {
    async fn push(&self, queue: TaskQueue, message: Message) -> QueueResult<()> {
        if self.is_closed() {
            return Err(QueueError::Closed);
        }
        let lane = self.lanes.lane(queue);

        match tokio::time::timeout(self.enqueue_timeout, lane.capacity.acquire()).await {
            Ok(Ok(permit)) => permit.forget(),
            Ok(Err(_)) => return Err(QueueError::Closed),
            Err(_) => {
                return Err(QueueError::Full {
                    queue,
                    waited: self.enqueue_timeout,
                });
            }
        }

        trace!(queue = %queue, task_id = %message.task_id, "Message enqueued");
        lane.messages.lock().push_back(message);
        lane.ready.notify_one();
        Ok(())
    }

    async fn poll(&self, queue: TaskQueue) -> QueueResult<Delivery> {
        let lane = self.lanes.lane(queue);
        loop {
            let ready = lane.ready.notified();
            if self.is_closed() {
                return Err(QueueError::Closed);
            }
            if let Some(message) = lane.messages.lock().pop_front() {
                let origin: Arc<dyn Settle> = self.lanes.clone();
                return Ok(Delivery::new(queue, message, origin));
            }
            ready.await;
        }
    }

    fn close(&self) {
        if self.lanes.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        for queue in TaskQueue::ALL {
            let lane = self.lanes.lane(queue);
            lane.capacity.close();
            lane.ready.notify_waiters();
        }
        debug!("Work queue closed");
    }
}

impl fmt::Debug for MemoryQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryQueue")
            .field("short", &self.len(TaskQueue::Short))
            .field("long", &self.len(TaskQueue::Long))
            .field("analysis", &self.len(TaskQueue::Analysis))
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn message(body: &str) -> Message {
        Message::new(Uuid::new_v4(), body.to_string())
    }

    fn queue(capacity: usize) -> MemoryQueue {
        MemoryQueue::new(capacity, Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_lanes_are_fifo_and_separate() {
        let q = queue(8);
        assert_ok!(q.push(TaskQueue::Short, message("a")).await);
        assert_ok!(q.push(TaskQueue::Long, message("b")).await);
        assert_ok!(q.push(TaskQueue::Short, message("c")).await);
        assert_eq!(q.len(TaskQueue::Short), 2);

        let first = q.poll(TaskQueue::Short).await.unwrap();
        assert_eq!(first.message().body, "a");
        first.ack();
        let second = q.poll(TaskQueue::Short).await.unwrap();
        assert_eq!(second.message().body, "c");
        second.ack();

        assert!(q.is_empty(TaskQueue::Short));
        assert_eq!(q.len(TaskQueue::Long), 1);
    }

    #[tokio::test]
    async fn test_unacked_delivery_is_redelivered_first() {
        let q = queue(8);
        assert_ok!(q.push(TaskQueue::Short, message("a")).await);
        assert_ok!(q.push(TaskQueue::Short, message("b")).await);

        let delivery = q.poll(TaskQueue::Short).await.unwrap();
        let task_id = delivery.message().task_id;
        assert!(!delivery.message().redelivered());
        drop(delivery);

        let again = q.poll(TaskQueue::Short).await.unwrap();
        assert_eq!(again.message().task_id, task_id);
        assert_eq!(again.message().attempt, 2);
        assert!(again.message().redelivered());
        again.ack();

        let next = q.poll(TaskQueue::Short).await.unwrap();
        assert_eq!(next.message().body, "b");
        next.ack();
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_lane_applies_backpressure() {
        let q = queue(1);
        assert_ok!(q.push(TaskQueue::Analysis, message("a")).await);

        let err = assert_err!(q.push(TaskQueue::Analysis, message("b")).await);
        assert_eq!(
            err,
            QueueError::Full {
                queue: TaskQueue::Analysis,
                waited: Duration::from_millis(50),
            }
        );

        // Other lanes are unaffected.
        assert_ok!(q.push(TaskQueue::Short, message("c")).await);

        // Capacity is held until ack, not until poll.
        let delivery = q.poll(TaskQueue::Analysis).await.unwrap();
        assert_err!(q.push(TaskQueue::Analysis, message("d")).await);
        delivery.ack();
        assert_ok!(q.push(TaskQueue::Analysis, message("e")).await);
    }

    #[tokio::test]
    async fn test_poll_waits_for_push() {
        let q = queue(4);
        let consumer = {
            let q = q.clone();
            tokio::spawn(async move {
                let delivery = q.poll(TaskQueue::Long).await.unwrap();
                let body = delivery.message().body.clone();
                delivery.ack();
                body
            })
        };

        tokio::task::yield_now().await;
        assert_ok!(q.push(TaskQueue::Long, message("late")).await);
        assert_eq!(consumer.await.unwrap(), "late");
    }

    #[tokio::test]
    async fn test_close_wakes_pollers_and_rejects_pushes() {
        let q = queue(4);
        let poller = {
            let q = q.clone();
            tokio::spawn(async move { q.poll(TaskQueue::Short).await.map(|_| ()) })
        };
        tokio::task::yield_now().await;

        q.close();
        assert_eq!(poller.await.unwrap(), Err(QueueError::Closed));
        assert_eq!(
            q.push(TaskQueue::Short, message("a")).await,
            Err(QueueError::Closed)
        );
        assert!(q.is_closed());
    }
}
