//! Responder handlers and the context they are called with.
//!
//! Handlers are plain async functions taking a [`ResponderContext`]:
//!
//! ```rust,ignore
//! async fn add_welcome_comment(ctx: ResponderContext) -> Result<(), BoxError> {
//!     let pr = ctx.merge_request(0)?;
//!     let message: String = ctx.option("message")?;
//!     // ...
//!     Ok(())
//! }
//! ```
//!
//! They stay directly callable, so unit tests can build a context with
//! [`ResponderContext::new`] and await the function without any registry.
//! The registry stores them type-erased as a tower [`BoxCloneSyncService`].

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tower::util::BoxCloneSyncService;
use uuid::Uuid;

use gitmate_core::{Comment, Commit, EventArg, Issue, MergeRequest, RepositoryHandle};

use crate::error::{BoxError, ExtractError, ExtractResult};
use crate::signature::Signature;

/// Type-erased responder, as stored in the registry.
pub type ResponderService = BoxCloneSyncService<ResponderContext, Value, BoxError>;

// ============================================================================
// Handler Trait
// ============================================================================

/// An async function usable as a responder.
///
/// Implemented for every `Fn(ResponderContext) -> impl Future<Output =
/// Result<T, E>>` where `T` serializes (the value is published through the
/// invocation handle) and `E` converts into a [`BoxError`].
pub trait Handler: Clone + Send + Sync + 'static {
    /// Calls the handler and serializes its return value.
    fn call(self, ctx: ResponderContext) -> BoxFuture<'static, Result<Value, BoxError>>;
}

impl<F, Fut, T, E> Handler for F
where
    F: Fn(ResponderContext) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Serialize + Send + 'static,
    E: Into<BoxError> + Send + 'static,
{
    fn call(self, ctx: ResponderContext) -> BoxFuture<'static, Result<Value, BoxError>> {
        let fut = (self)(ctx);
        async move {
            match fut.await {
                Ok(value) => Ok(serde_json::to_value(value)?),
                Err(e) => Err(e.into()),
            }
        }
        .boxed()
    }
}

/// Erases a handler into a [`ResponderService`].
pub fn into_service<H: Handler>(handler: H) -> ResponderService {
    BoxCloneSyncService::new(tower::service_fn(move |ctx: ResponderContext| {
        handler.clone().call(ctx)
    }))
}

// ============================================================================
// ResponderContext
// ============================================================================

/// Everything one invocation of a responder gets to see.
///
/// Cloning is cheap; arguments and options are shared.
#[derive(Debug, Clone)]
pub struct ResponderContext {
    task_id: Uuid,
    responder: Arc<str>,
    args: Arc<[EventArg]>,
    options: Arc<Map<String, Value>>,
    defaults: Arc<Map<String, Value>>,
}

impl ResponderContext {
    /// Creates a context with the given positional arguments and resolved
    /// options, and no declared defaults.
    pub fn new(args: Vec<EventArg>, options: Map<String, Value>) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            responder: Arc::from(""),
            args: args.into(),
            options: Arc::new(options),
            defaults: Arc::default(),
        }
    }

    /// Attaches the declared defaults of `signature`, used as fallbacks by
    /// [`option`](Self::option).
    pub fn with_signature(mut self, signature: &Signature) -> Self {
        self.defaults = Arc::new(signature.defaults());
        self
    }

    pub(crate) fn for_task(mut self, task_id: Uuid, responder: &str) -> Self {
        self.task_id = task_id;
        self.responder = Arc::from(responder);
        self
    }

    /// Unique id of this invocation.
    pub fn task_id(&self) -> Uuid {
        self.task_id
    }

    /// Task name of the running responder, `"<plugin>.<handler>"`.
    pub fn responder(&self) -> &str {
        &self.responder
    }

    /// All positional arguments.
    pub fn args(&self) -> &[EventArg] {
        &self.args
    }

    pub fn arg(&self, index: usize) -> ExtractResult<&EventArg> {
        self.args
            .get(index)
            .ok_or(ExtractError::MissingArgument(index))
    }

    /// The options resolved from the repository's settings. Options the
    /// repository does not set are absent here; see [`option`](Self::option).
    pub fn options(&self) -> &Map<String, Value> {
        &self.options
    }

    /// Resolved options completed with the declared defaults.
    pub fn effective_options(&self) -> Map<String, Value> {
        let mut merged = (*self.defaults).clone();
        merged.extend(self.options.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }

    /// Reads option `name`, falling back to its declared default.
    pub fn option<T: DeserializeOwned>(&self, name: &str) -> ExtractResult<T> {
        let value = self
            .options
            .get(name)
            .or_else(|| self.defaults.get(name))
            .ok_or_else(|| ExtractError::MissingOption(name.to_string()))?;
        T::deserialize(value).map_err(|source| ExtractError::InvalidOption {
            name: name.to_string(),
            source,
        })
    }

    pub fn repository(&self, index: usize) -> ExtractResult<&RepositoryHandle> {
        self.typed(index, "repository", EventArg::as_repository)
    }

    pub fn merge_request(&self, index: usize) -> ExtractResult<&MergeRequest> {
        self.typed(index, "merge request", EventArg::as_merge_request)
    }

    pub fn issue(&self, index: usize) -> ExtractResult<&Issue> {
        self.typed(index, "issue", EventArg::as_issue)
    }

    pub fn comment(&self, index: usize) -> ExtractResult<&Comment> {
        self.typed(index, "comment", EventArg::as_comment)
    }

    pub fn commit(&self, index: usize) -> ExtractResult<&Commit> {
        self.typed(index, "commit", EventArg::as_commit)
    }

    fn typed<'a, T>(
        &'a self,
        index: usize,
        expected: &'static str,
        get: fn(&'a EventArg) -> Option<&'a T>,
    ) -> ExtractResult<&'a T> {
        get(self.arg(index)?).ok_or(ExtractError::ArgumentType { index, expected })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;
    use gitmate_core::Hoster;

    fn options(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    async fn greet(ctx: ResponderContext) -> Result<String, BoxError> {
        let greeting: String = ctx.option("greeting")?;
        let repo = ctx.repository(0)?;
        Ok(format!("{greeting}, {}", repo.full_name))
    }

    fn repo_arg() -> EventArg {
        RepositoryHandle::new(Hoster::GitHub, "gitmate/test", 1).into()
    }

    #[tokio::test]
    async fn test_handler_is_directly_callable() {
        let ctx = ResponderContext::new(vec![repo_arg()], options(json!({"greeting": "hello"})));
        assert_eq!(greet(ctx).await.unwrap(), "hello, gitmate/test");
    }

    #[tokio::test]
    async fn test_option_falls_back_to_declared_default() {
        let signature = Signature::new().arg("repo").option("greeting", "hi");
        let ctx = ResponderContext::new(vec![repo_arg()], Map::new()).with_signature(&signature);

        assert!(ctx.options().is_empty());
        assert_eq!(ctx.effective_options(), options(json!({"greeting": "hi"})));
        assert_eq!(greet(ctx).await.unwrap(), "hi, gitmate/test");
    }

    #[tokio::test]
    async fn test_service_serializes_return_value() {
        let svc = into_service(greet);
        let ctx = ResponderContext::new(vec![repo_arg()], options(json!({"greeting": "hey"})));
        let value = svc.oneshot(ctx).await.unwrap();
        assert_eq!(value, json!("hey, gitmate/test"));
    }

    #[test]
    fn test_extract_errors() {
        let ctx = ResponderContext::new(vec!["status/STALE".into()], options(json!({"n": "x"})));
        assert!(matches!(ctx.arg(3), Err(ExtractError::MissingArgument(3))));
        assert!(matches!(
            ctx.merge_request(0),
            Err(ExtractError::ArgumentType { index: 0, .. })
        ));
        assert!(matches!(
            ctx.option::<u32>("n"),
            Err(ExtractError::InvalidOption { .. })
        ));
        assert!(matches!(
            ctx.option::<u32>("missing"),
            Err(ExtractError::MissingOption(_))
        ));
    }
}
