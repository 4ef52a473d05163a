//! Execution backends.
//!
//! The dispatcher turns each selected responder into an [`Invocation`] and
//! hands it to an [`ExecutionBackend`]. The backend returns an
//! [`InvocationHandle`] immediately; the result arrives later.
//!
//! Every backend runs invocations through an [`Executor`], which provides the
//! failure isolation: a handler that errors, panics or exceeds its time limit
//! is logged and reported through its handle, and nothing propagates back into
//! the dispatcher or into sibling invocations.
//!
//! This crate ships the eager [`InlineBackend`]. The queue-backed backend with
//! its worker pool lives in `gitmate-runtime`.

use std::any::Any;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::oneshot;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use gitmate_core::EventArg;

use crate::error::{InvocationError, InvocationResult, SubmitError, SubmitResult, error_chain};
use crate::handler::ResponderContext;
use crate::registry::{Registration, ResponderRegistry};

// ============================================================================
// TaskQueue
// ============================================================================

/// Named queue an invocation is routed to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskQueue {
    /// Quick reactions such as labelling or commenting.
    #[default]
    Short,
    /// Long-running work such as rebasing.
    Long,
    /// Code analysis runs.
    Analysis,
}

impl TaskQueue {
    pub const ALL: [TaskQueue; 3] = [TaskQueue::Short, TaskQueue::Long, TaskQueue::Analysis];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskQueue::Short => "short",
            TaskQueue::Long => "long",
            TaskQueue::Analysis => "analysis",
        }
    }
}

impl fmt::Display for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskQueue {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskQueue::ALL
            .into_iter()
            .find(|q| q.as_str() == s)
            .ok_or_else(|| format!("unknown task queue '{s}'"))
    }
}

// ============================================================================
// Invocation
// ============================================================================

/// One scheduled call of one responder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    pub task_id: Uuid,
    /// Task name of the responder.
    pub responder: String,
    pub queue: TaskQueue,
    pub args: Vec<EventArg>,
    /// Options resolved from the repository's settings.
    pub options: Map<String, Value>,
    /// Delivery attempt, starting at 1. Incremented on redelivery.
    #[serde(default = "first_attempt")]
    pub attempt: u32,
}

fn first_attempt() -> u32 {
    1
}

impl Invocation {
    pub fn new(registration: &Registration, args: Vec<EventArg>, options: Map<String, Value>) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            responder: registration.name().to_string(),
            queue: registration.queue(),
            args,
            options,
            attempt: first_attempt(),
        }
    }
}

// ============================================================================
// InvocationHandle
// ============================================================================

/// Sender half of an [`InvocationHandle`].
pub type ResultSender = oneshot::Sender<InvocationResult>;

/// Awaitable result of a submitted invocation.
#[derive(Debug)]
pub struct InvocationHandle {
    task_id: Uuid,
    responder: String,
    rx: oneshot::Receiver<InvocationResult>,
}

impl InvocationHandle {
    /// Creates a handle for `invocation` and the sender that resolves it.
    pub fn pair(invocation: &Invocation) -> (Self, ResultSender) {
        let (tx, rx) = oneshot::channel();
        let handle = Self {
            task_id: invocation.task_id,
            responder: invocation.responder.clone(),
            rx,
        };
        (handle, tx)
    }

    pub fn task_id(&self) -> Uuid {
        self.task_id
    }

    pub fn responder(&self) -> &str {
        &self.responder
    }

    /// Waits for the result, at most `timeout` if given.
    pub async fn get(self, timeout: Option<Duration>) -> InvocationResult {
        let received = match timeout {
            Some(limit) => match tokio::time::timeout(limit, self.rx).await {
                Ok(received) => received,
                Err(_) => return Err(InvocationError::WaitTimeout),
            },
            None => self.rx.await,
        };
        received.unwrap_or(Err(InvocationError::Lost))
    }
}

// ============================================================================
// ExecutionBackend
// ============================================================================

/// Accepts invocations for asynchronous execution.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Submits an invocation. Returns once the invocation is accepted, not
    /// once it has run.
    async fn submit(&self, invocation: Invocation) -> SubmitResult<InvocationHandle>;
}

// ============================================================================
// Executor
// ============================================================================

/// Runs invocations in isolation.
///
/// Each handler runs on its own task with a hard time limit. Failures are
/// logged at WARN with the invocation's arguments and options, then returned
/// as an [`InvocationError`].
#[derive(Debug, Clone)]
pub struct Executor {
    registry: Arc<ResponderRegistry>,
    time_limit: Duration,
}

impl Executor {
    /// Default hard time limit per invocation.
    pub const DEFAULT_TIME_LIMIT: Duration = Duration::from_secs(3600);

    pub fn new(registry: Arc<ResponderRegistry>) -> Self {
        Self {
            registry,
            time_limit: Self::DEFAULT_TIME_LIMIT,
        }
    }

    pub fn with_time_limit(mut self, time_limit: Duration) -> Self {
        self.time_limit = time_limit;
        self
    }

    pub fn registry(&self) -> &Arc<ResponderRegistry> {
        &self.registry
    }

    pub fn time_limit(&self) -> Duration {
        self.time_limit
    }

    /// Runs `invocation` to completion, failure or timeout.
    ///
    /// The handler runs on its own task, which is aborted on timeout and when
    /// the returned future is dropped.
    pub async fn execute(&self, invocation: &Invocation) -> InvocationResult {
        let Some(registration) = self.registry.get(&invocation.responder) else {
            let error = InvocationError::UnknownResponder(invocation.responder.clone());
            self.report(invocation, &error);
            return Err(error);
        };

        let ctx = ResponderContext::new(invocation.args.clone(), invocation.options.clone())
            .with_signature(registration.signature())
            .for_task(invocation.task_id, &invocation.responder);

        debug!(
            responder = %invocation.responder,
            task_id = %invocation.task_id,
            attempt = invocation.attempt,
            "Running responder"
        );

        let mut task = AbortOnDropHandle::new(tokio::spawn(registration.call(ctx)));
        let error = match tokio::time::timeout(self.time_limit, &mut task).await {
            Ok(Ok(Ok(value))) => return Ok(value),
            Ok(Ok(Err(e))) => InvocationError::Failed(error_chain(&*e)),
            Ok(Err(join)) if join.is_panic() => {
                InvocationError::Panicked(panic_message(join.into_panic()))
            }
            Ok(Err(join)) => InvocationError::Failed(join.to_string()),
            Err(_) => InvocationError::TimedOut(self.time_limit),
        };

        self.report(invocation, &error);
        Err(error)
    }

    fn report(&self, invocation: &Invocation, error: &InvocationError) {
        warn!(
            responder = %invocation.responder,
            task_id = %invocation.task_id,
            args = ?invocation.args,
            options = ?invocation.options,
            error = %error,
            "Task {}[{}] had unexpected failure",
            invocation.responder,
            invocation.task_id
        );
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ============================================================================
// InlineBackend
// ============================================================================

/// Runs every invocation right away on the current tokio runtime.
///
/// No queue, no persistence, no redelivery. Meant for development and tests.
#[derive(Debug, Clone)]
pub struct InlineBackend {
    executor: Executor,
}

impl InlineBackend {
    pub fn new(executor: Executor) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl ExecutionBackend for InlineBackend {
    async fn submit(&self, invocation: Invocation) -> SubmitResult<InvocationHandle> {
        if self.executor.registry().get(&invocation.responder).is_none() {
            return Err(SubmitError::UnknownResponder(invocation.responder));
        }

        let (handle, tx) = InvocationHandle::pair(&invocation);
        let executor = self.executor.clone();
        tokio::spawn(async move {
            let result = executor.execute(&invocation).await;
            let _ = tx.send(result);
        });
        Ok(handle)
    }
}
