//! Event dispatch.
//!
//! The [`Dispatcher`] is the single entry point for incoming domain events.
//! For each event it:
//!
//! 1. asks the [`LoopGuard`] whether the event was caused by the bot itself
//! 2. selects the eligible responders from the [`ResponderRegistry`]
//! 3. resolves each responder's options from its own plugin's settings
//! 4. submits one [`Invocation`] per responder to the [`ExecutionBackend`]
//!
//! and returns the handles of everything it submitted. A responder whose
//! submission fails is logged and skipped; its siblings are unaffected.
//!
//! ```rust,ignore
//! let dispatcher = Dispatcher::new(registry, backend);
//! let handles = dispatcher
//!     .respond(&MergeRequestAction::Opened.into(), vec![pr.into()], Some(&repo))
//!     .await;
//! ```

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{Instrument, Level, debug, error, span};

use gitmate_core::{EventArg, EventKind, RepositoryContext};

use crate::execution::{ExecutionBackend, Invocation, InvocationHandle};
use crate::loop_guard::LoopGuard;
use crate::plugin::SettingsResolver;
use crate::registry::{Registration, ResponderRegistry};

/// Routes events to responders and submits them for execution.
///
/// Holds no per-event state; `dispatch` can run concurrently from any number
/// of tasks.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ResponderRegistry>,
    resolver: SettingsResolver,
    guard: LoopGuard,
    backend: Arc<dyn ExecutionBackend>,
}

impl Dispatcher {
    /// Creates a dispatcher with the default loop guard.
    pub fn new(registry: Arc<ResponderRegistry>, backend: Arc<dyn ExecutionBackend>) -> Self {
        Self {
            resolver: SettingsResolver::new(Arc::clone(registry.plugins())),
            registry,
            guard: LoopGuard::default(),
            backend,
        }
    }

    pub fn with_loop_guard(mut self, guard: LoopGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn registry(&self) -> &Arc<ResponderRegistry> {
        &self.registry
    }

    pub fn loop_guard(&self) -> &LoopGuard {
        &self.guard
    }

    /// Dispatches an event for a repository, to the plugins it has enabled.
    pub async fn respond(
        &self,
        kind: &EventKind,
        args: Vec<EventArg>,
        repository: Option<&dyn RepositoryContext>,
    ) -> Vec<InvocationHandle> {
        self.dispatch(kind, args, repository, None).await
    }

    /// Dispatches an event to the responders of a single plugin.
    pub async fn respond_for_plugin(
        &self,
        kind: &EventKind,
        args: Vec<EventArg>,
        plugin: &str,
    ) -> Vec<InvocationHandle> {
        self.dispatch(kind, args, None, Some(plugin)).await
    }

    /// Dispatches an event.
    ///
    /// `plugin` restricts selection to one plugin; otherwise `repository`
    /// restricts it to the repository's enabled plugins. Options are only
    /// resolved for responders whose plugin is installed. A job kind
    /// dispatched with neither is scoped to the plugin its name starts with.
    pub async fn dispatch(
        &self,
        kind: &EventKind,
        args: Vec<EventArg>,
        repository: Option<&dyn RepositoryContext>,
        plugin: Option<&str>,
    ) -> Vec<InvocationHandle> {
        let span = span!(
            Level::DEBUG,
            "dispatch",
            kind = %kind,
            repository = repository.map(|r| r.full_name()).unwrap_or("-"),
        );
        self.dispatch_inner(kind, args, repository, plugin)
            .instrument(span)
            .await
    }

    async fn dispatch_inner(
        &self,
        kind: &EventKind,
        args: Vec<EventArg>,
        repository: Option<&dyn RepositoryContext>,
        plugin: Option<&str>,
    ) -> Vec<InvocationHandle> {
        if self.guard.vetoes(&args) {
            debug!("Event carries the bot signature, not dispatching");
            return Vec::new();
        }

        let scope = match (plugin, repository) {
            (Some(plugin), _) => Some(plugin),
            (None, None) => kind.job_plugin().filter(|p| self.registry.plugin(p).is_some()),
            (None, Some(_)) => None,
        };

        let selected = self.registry.select(kind, repository, scope);
        debug!(responders = selected.len(), "Responders selected");

        let mut handles = Vec::with_capacity(selected.len());
        for registration in selected {
            let options = self.options_for(registration, repository);
            let invocation = Invocation::new(registration, args.clone(), options.clone());
            let task_id = invocation.task_id;

            match self.backend.submit(invocation).await {
                Ok(handle) => {
                    debug!(responder = %registration.name(), task_id = %task_id, "Responder submitted");
                    handles.push(handle);
                }
                Err(e) => {
                    error!(
                        responder = %registration.name(),
                        args = ?args,
                        options = ?options,
                        error = %e,
                        "A responder failed to submit"
                    );
                }
            }
        }
        handles
    }

    /// `plugin settings ∩ declared options`, or nothing if the owning plugin
    /// is not installed.
    fn options_for(
        &self,
        registration: &Registration,
        repository: Option<&dyn RepositoryContext>,
    ) -> Map<String, Value> {
        if self.registry.plugin(registration.plugin()).is_none() {
            return Map::new();
        }
        let settings = self.resolver.resolve(registration.plugin(), repository);
        registration.signature().filter_options(&settings)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("guard", &self.guard)
            .finish_non_exhaustive()
    }
}
