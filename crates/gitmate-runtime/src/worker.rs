//! Queue-backed execution.
//!
//! [`QueueBackend`] is the [`ExecutionBackend`] used in production. It encodes
//! each invocation as JSON, pushes it onto the lane of its task queue and
//! keeps the sender half of the caller's handle until a worker reports back.
//!
//! [`WorkerPool`] runs a fixed number of workers per task queue. A worker
//! holds one delivery at a time, runs it through the [`Executor`], and only
//! then acknowledges it and publishes the result. A worker that is torn down
//! mid-invocation never acks, so the message returns to its lane.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use gitmate_framework::{
    ExecutionBackend, Executor, Invocation, InvocationError, InvocationHandle, InvocationResult,
    ResponderRegistry, ResultSender, SubmitError, SubmitResult, TaskQueue,
};

use crate::config::WorkerConfig;
use crate::queue::{Message, QueueError, WorkQueue};

// ─── Pending results ──────────────────────────────────────────────────────────

/// Senders of invocations that were submitted but have not completed.
#[derive(Default)]
pub struct PendingResults {
    senders: Mutex<HashMap<Uuid, ResultSender>>,
}

impl PendingResults {
    fn insert(&self, task_id: Uuid, sender: ResultSender) {
        self.senders.lock().insert(task_id, sender);
    }

    fn remove(&self, task_id: &Uuid) -> Option<ResultSender> {
        self.senders.lock().remove(task_id)
    }

    /// Resolves the handle of `task_id`. Returns `false` if nobody is waiting,
    /// for instance because the message was a redelivery of an invocation
    /// that already completed.
    pub fn complete(&self, task_id: Uuid, result: InvocationResult) -> bool {
        match self.remove(&task_id) {
            Some(sender) => sender.send(result).is_ok(),
            None => false,
        }
    }

    /// Resolves every outstanding handle with [`InvocationError::Lost`] and
    /// returns how many there were.
    pub fn fail_all(&self) -> usize {
        let senders: Vec<ResultSender> = self.senders.lock().drain().map(|(_, s)| s).collect();
        let count = senders.len();
        for sender in senders {
            let _ = sender.send(Err(InvocationError::Lost));
        }
        count
    }

    pub fn len(&self) -> usize {
        self.senders.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ─── QueueBackend ─────────────────────────────────────────────────────────────

/// Submits invocations to a [`WorkQueue`].
#[derive(Clone)]
pub struct QueueBackend {
    registry: Arc<ResponderRegistry>,
    queue: Arc<dyn WorkQueue>,
    pending: Arc<PendingResults>,
}

impl QueueBackend {
    pub fn new(registry: Arc<ResponderRegistry>, queue: Arc<dyn WorkQueue>) -> Self {
        Self {
            registry,
            queue,
            pending: Arc::new(PendingResults::default()),
        }
    }

    pub fn queue(&self) -> &Arc<dyn WorkQueue> {
        &self.queue
    }

    pub fn pending(&self) -> &Arc<PendingResults> {
        &self.pending
    }

    /// Closes the queue and resolves every handle still waiting with
    /// [`InvocationError::Lost`]. Messages left in the queue are discarded.
    pub fn close(&self) {
        self.queue.close();
        let lost = self.pending.fail_all();
        if lost > 0 {
            warn!(invocations = lost, "Queue closed with invocations outstanding");
        } else {
            debug!("Queue closed");
        }
    }
}

#[async_trait]
impl ExecutionBackend for QueueBackend {
    async fn submit(&self, invocation: Invocation) -> SubmitResult<InvocationHandle> {
        if self.registry.get(&invocation.responder).is_none() {
            return Err(SubmitError::UnknownResponder(invocation.responder));
        }

        let body = serde_json::to_string(&invocation)?;
        let task_id = invocation.task_id;
        let (handle, sender) = InvocationHandle::pair(&invocation);
        self.pending.insert(task_id, sender);

        if let Err(e) = self.queue.push(invocation.queue, Message::new(task_id, body)).await {
            self.pending.remove(&task_id);
            return Err(e.into());
        }

        trace!(
            responder = %invocation.responder,
            task_id = %task_id,
            queue = %invocation.queue,
            "Invocation queued"
        );
        Ok(handle)
    }
}

impl fmt::Debug for QueueBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueBackend")
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

// ─── WorkerPool ───────────────────────────────────────────────────────────────

struct Running {
    cancel: CancellationToken,
    workers: Vec<JoinHandle<()>>,
}

/// Consumers of a [`QueueBackend`]'s queue.
pub struct WorkerPool {
    queue: Arc<dyn WorkQueue>,
    pending: Arc<PendingResults>,
    executor: Executor,
    workers: WorkerConfig,
    running: Mutex<Option<Running>>,
}

impl WorkerPool {
    pub fn new(backend: &QueueBackend, executor: Executor, workers: WorkerConfig) -> Self {
        Self {
            queue: Arc::clone(&backend.queue),
            pending: Arc::clone(&backend.pending),
            executor,
            workers,
            running: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Spawns the workers. Does nothing if they are already running.
    pub fn start(&self) {
        let mut running = self.running.lock();
        if running.is_some() {
            warn!("Worker pool is already running");
            return;
        }

        let cancel = CancellationToken::new();
        let mut workers = Vec::new();
        for queue in TaskQueue::ALL {
            let count = self.workers.for_queue(queue);
            for index in 0..count {
                let worker = Worker {
                    name: format!("{queue}-{index}"),
                    queue,
                    source: Arc::clone(&self.queue),
                    pending: Arc::clone(&self.pending),
                    executor: self.executor.clone(),
                    cancel: cancel.clone(),
                };
                workers.push(tokio::spawn(worker.run()));
            }
            debug!(queue = %queue, workers = count, "Workers started");
        }

        info!(workers = workers.len(), "Worker pool started");
        *running = Some(Running { cancel, workers });
    }

    /// Stops polling and waits for in-flight invocations to finish.
    pub async fn shutdown(&self) {
        let Some(Running { cancel, workers }) = self.running.lock().take() else {
            return;
        };
        cancel.cancel();
        for worker in workers {
            if let Err(e) = worker.await
                && e.is_panic()
            {
                error!(error = %e, "Worker panicked");
            }
        }
        info!("Worker pool stopped");
    }

    /// Tears the workers down without waiting. Deliveries in flight are not
    /// acknowledged and return to their lanes.
    pub fn abort(&self) {
        let Some(Running { cancel, workers }) = self.running.lock().take() else {
            return;
        };
        cancel.cancel();
        for worker in workers {
            worker.abort();
        }
        warn!("Worker pool aborted");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if let Some(Running { cancel, .. }) = self.running.get_mut().take() {
            cancel.cancel();
        }
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

struct Worker {
    name: String,
    queue: TaskQueue,
    source: Arc<dyn WorkQueue>,
    pending: Arc<PendingResults>,
    executor: Executor,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(self) {
        trace!(worker = %self.name, "Worker polling");
        loop {
            let delivery = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                polled = self.source.poll(self.queue) => match polled {
                    Ok(delivery) => delivery,
                    Err(QueueError::Closed) => break,
                    Err(e) => {
                        error!(worker = %self.name, error = %e, "Polling failed");
                        break;
                    }
                },
            };

            let message = delivery.message();
            let task_id = message.task_id;
            let mut invocation: Invocation = match serde_json::from_str(&message.body) {
                Ok(invocation) => invocation,
                Err(e) => {
                    error!(
                        worker = %self.name,
                        task_id = %task_id,
                        error = %e,
                        "Discarding undecodable message"
                    );
                    delivery.ack();
                    self.pending.complete(
                        task_id,
                        Err(InvocationError::Failed(format!("undecodable invocation: {e}"))),
                    );
                    continue;
                }
            };
            invocation.attempt = message.attempt;

            let result = self.executor.execute(&invocation).await;
            delivery.ack();
            if !self.pending.complete(task_id, result) {
                debug!(
                    worker = %self.name,
                    task_id = %task_id,
                    "No caller waiting for result"
                );
            }
        }
        trace!(worker = %self.name, "Worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use serde_json::{Map, json};
    use tokio_test::assert_ok;

    use super::*;
    use crate::queue::MemoryQueue;
    use gitmate_core::IssueAction;
    use gitmate_framework::{BoxError, Responder, ResponderContext};

    fn registry_with(responders: Vec<Responder>) -> Arc<ResponderRegistry> {
        let mut builder = ResponderRegistry::builder();
        for responder in responders {
            builder
                .register([IssueAction::Opened], "test", responder)
                .unwrap();
        }
        Arc::new(builder.build())
    }

    fn invocation(registry: &ResponderRegistry, name: &str) -> Invocation {
        Invocation::new(registry.get(name).unwrap(), vec!["arg".into()], Map::new())
    }

    fn one_worker_each() -> WorkerConfig {
        WorkerConfig {
            short: 1,
            long: 1,
            analysis: 1,
        }
    }

    fn echo() -> Responder {
        Responder::new("echo", |ctx: ResponderContext| async move {
            Ok::<_, BoxError>(ctx.args().len())
        })
    }

    #[tokio::test]
    async fn test_queued_invocation_completes() {
        let registry = registry_with(vec![echo()]);
        let queue = Arc::new(MemoryQueue::new(8, Duration::from_secs(1)));
        let backend = QueueBackend::new(Arc::clone(&registry), queue);
        let pool = WorkerPool::new(&backend, Executor::new(Arc::clone(&registry)), one_worker_each());
        pool.start();

        let handle = assert_ok!(backend.submit(invocation(&registry, "test.echo")).await);
        let result = handle.get(Some(Duration::from_secs(5))).await;
        assert_eq!(result, Ok(json!(1)));
        assert!(backend.pending().is_empty());

        pool.shutdown().await;
        assert!(!pool.is_running());
    }

    #[tokio::test]
    async fn test_unknown_responder_is_rejected() {
        let registry = registry_with(vec![echo()]);
        let queue = Arc::new(MemoryQueue::new(8, Duration::from_secs(1)));
        let backend = QueueBackend::new(Arc::clone(&registry), queue.clone());

        let mut stray = invocation(&registry, "test.echo");
        stray.responder = "test.missing".into();
        let err = backend.submit(stray).await.unwrap_err();
        assert!(matches!(err, SubmitError::UnknownResponder(name) if name == "test.missing"));
        assert!(queue.is_empty(TaskQueue::Short));
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_is_backpressure() {
        let registry = registry_with(vec![echo()]);
        let queue = Arc::new(MemoryQueue::new(1, Duration::from_millis(100)));
        let backend = QueueBackend::new(Arc::clone(&registry), queue);

        assert_ok!(backend.submit(invocation(&registry, "test.echo")).await);
        let err = backend
            .submit(invocation(&registry, "test.echo"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SubmitError::Backpressure { ref queue, waited }
                if queue == "short" && waited == Duration::from_millis(100)
        ));
        assert_eq!(backend.pending().len(), 1);
    }

    #[tokio::test]
    async fn test_closed_queue_is_unavailable() {
        let registry = registry_with(vec![echo()]);
        let queue = Arc::new(MemoryQueue::new(8, Duration::from_secs(1)));
        queue.close();
        let backend = QueueBackend::new(Arc::clone(&registry), queue);

        let err = backend
            .submit(invocation(&registry, "test.echo"))
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::Unavailable(_)));
        assert!(backend.pending().is_empty());
    }

    #[tokio::test]
    async fn test_aborted_worker_leaves_message_for_redelivery() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let stuck_once = Responder::new("stuck_once", move |_ctx: ResponderContext| {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    std::future::pending::<()>().await;
                }
                Ok::<_, BoxError>("done")
            }
        });
        let registry = registry_with(vec![stuck_once]);
        let queue = Arc::new(MemoryQueue::new(8, Duration::from_secs(1)));
        let backend = QueueBackend::new(Arc::clone(&registry), queue.clone());
        let pool = WorkerPool::new(&backend, Executor::new(Arc::clone(&registry)), one_worker_each());

        pool.start();
        let handle = assert_ok!(backend.submit(invocation(&registry, "test.stuck_once")).await);
        while calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        pool.abort();
        // Give the aborted worker a chance to drop its delivery.
        while queue.is_empty(TaskQueue::Short) {
            tokio::task::yield_now().await;
        }

        pool.start();
        let result = handle.get(Some(Duration::from_secs(5))).await;
        assert_eq!(result, Ok(json!("done")));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        pool.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_cancels_running_handler() {
        let started = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));
        let (s, f) = (Arc::clone(&started), Arc::clone(&finished));
        let slow = Responder::new("slow", move |_ctx: ResponderContext| {
            let (s, f) = (Arc::clone(&s), Arc::clone(&f));
            async move {
                s.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(600)).await;
                f.fetch_add(1, Ordering::SeqCst);
                Ok::<(), BoxError>(())
            }
        });
        let registry = registry_with(vec![slow]);
        let queue = Arc::new(MemoryQueue::new(8, Duration::from_secs(1)));
        let backend = QueueBackend::new(Arc::clone(&registry), queue.clone());
        let executor =
            Executor::new(Arc::clone(&registry)).with_time_limit(Duration::from_secs(3600));
        let pool = WorkerPool::new(&backend, executor, one_worker_each());

        pool.start();
        assert_ok!(backend.submit(invocation(&registry, "test.slow")).await);
        while started.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        pool.abort();

        tokio::time::sleep(Duration::from_secs(700)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 0);
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(queue.len(TaskQueue::Short), 1);
    }

    #[tokio::test]
    async fn test_close_resolves_queued_handles_as_lost() {
        let registry = registry_with(vec![echo()]);
        let queue = Arc::new(MemoryQueue::new(8, Duration::from_secs(1)));
        let backend = QueueBackend::new(Arc::clone(&registry), queue.clone());

        let first = assert_ok!(backend.submit(invocation(&registry, "test.echo")).await);
        let second = assert_ok!(backend.submit(invocation(&registry, "test.echo")).await);
        assert_eq!(backend.pending().len(), 2);

        backend.close();
        assert!(queue.is_closed());
        assert!(backend.pending().is_empty());
        assert_eq!(first.get(Some(Duration::from_secs(5))).await, Err(InvocationError::Lost));
        assert_eq!(second.get(Some(Duration::from_secs(5))).await, Err(InvocationError::Lost));
    }

    #[tokio::test]
    async fn test_close_after_abort_resolves_in_flight_handle() {
        let started = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&started);
        let stuck = Responder::new("stuck", move |_ctx: ResponderContext| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                std::future::pending::<()>().await;
                Ok::<(), BoxError>(())
            }
        });
        let registry = registry_with(vec![stuck]);
        let queue = Arc::new(MemoryQueue::new(8, Duration::from_secs(1)));
        let backend = QueueBackend::new(Arc::clone(&registry), queue.clone());
        let pool = WorkerPool::new(&backend, Executor::new(Arc::clone(&registry)), one_worker_each());

        pool.start();
        let handle = assert_ok!(backend.submit(invocation(&registry, "test.stuck")).await);
        while started.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        pool.abort();
        backend.close();

        let result = handle.get(Some(Duration::from_secs(5))).await;
        assert_eq!(result, Err(InvocationError::Lost));
        assert!(backend.pending().is_empty());
    }

    #[tokio::test]
    async fn test_failure_is_published_to_handle() {
        let failing = Responder::new("failing", |_ctx: ResponderContext| async move {
            Err::<(), BoxError>("repository is archived".into())
        });
        let registry = registry_with(vec![failing]);
        let queue = Arc::new(MemoryQueue::new(8, Duration::from_secs(1)));
        let backend = QueueBackend::new(Arc::clone(&registry), queue);
        let pool = WorkerPool::new(&backend, Executor::new(Arc::clone(&registry)), one_worker_each());
        pool.start();

        let handle = assert_ok!(backend.submit(invocation(&registry, "test.failing")).await);
        let result = handle.get(Some(Duration::from_secs(5))).await;
        assert_eq!(
            result,
            Err(InvocationError::Failed("repository is archived".into()))
        );
        pool.shutdown().await;
    }
}
