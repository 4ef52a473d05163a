use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use gitmate_core::EventKind;

use crate::execution::TaskQueue;
use crate::handler::{Handler, ResponderService, into_service};
use crate::schedule::{JobTarget, Schedule};
use crate::signature::Signature;

// ─── Responder ────────────────────────────────────────────────────────────────

/// A responder declaration: a handler plus its declared signature and queue.
///
/// The task name of the resulting registration is `"<plugin>.<name>"`.
#[derive(Clone)]
pub struct Responder {
    name: String,
    service: ResponderService,
    signature: Arc<Signature>,
    queue: TaskQueue,
}

impl Responder {
    /// Declares a responder with an empty signature on the short queue.
    pub fn new<H: Handler>(name: impl Into<String>, handler: H) -> Self {
        Self {
            name: name.into(),
            service: into_service(handler),
            signature: Arc::new(Signature::new()),
            queue: TaskQueue::default(),
        }
    }

    pub fn signature(mut self, signature: Signature) -> Self {
        self.signature = Arc::new(signature);
        self
    }

    pub fn queue(mut self, queue: TaskQueue) -> Self {
        self.queue = queue;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared signature and queue, compared on re-registration.
    pub(crate) fn declaration(&self) -> (&Signature, TaskQueue) {
        (&self.signature, self.queue)
    }

    pub(crate) fn into_parts(self) -> (String, ResponderService, Arc<Signature>, TaskQueue) {
        (self.name, self.service, self.signature, self.queue)
    }
}

impl fmt::Debug for Responder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Responder")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

// ─── PluginInfo ───────────────────────────────────────────────────────────────

/// Catalog entry of an installed plugin.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginInfo {
    name: String,
    description: String,
    settings: Map<String, Value>,
}

impl PluginInfo {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// The declared settings schema: setting name to default value.
    pub fn settings(&self) -> &Map<String, Value> {
        &self.settings
    }
}

// ─── Plugin ───────────────────────────────────────────────────────────────────

pub(crate) struct ScheduledJob {
    pub(crate) name: String,
    pub(crate) schedule: Schedule,
    pub(crate) target: JobTarget,
}

/// A named bundle of responders plus a settings schema.
///
/// Activation is per repository; the plugin itself is installed once into a
/// [`RegistryBuilder`](crate::RegistryBuilder).
///
/// ```rust,ignore
/// let plugin = Plugin::new("pr_stale_reminder")
///     .description("Label merge requests nobody touched for a while")
///     .setting("stale_label", "status/STALE")
///     .setting("pr_expire_limit", 7)
///     .responder(
///         [MergeRequestAction::Synchronized, MergeRequestAction::Commented],
///         Responder::new("remove_stale_label", remove_stale_label)
///             .signature(Signature::new().arg("pr").option("stale_label", "status/STALE")),
///     )
///     .scheduled_responder(
///         Responder::new("add_stale_label", add_stale_label)
///             .signature(Signature::new().arg("repo").option("stale_label", "status/STALE")),
///         Schedule::cron("0 0 6,18 * * *"),
///     );
/// ```
pub struct Plugin {
    pub(crate) info: PluginInfo,
    pub(crate) responders: Vec<(Vec<EventKind>, Responder)>,
    pub(crate) jobs: Vec<(ScheduledJob, Responder)>,
}

impl Plugin {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            info: PluginInfo {
                name: name.into(),
                description: String::new(),
                settings: Map::new(),
            },
            responders: Vec::new(),
            jobs: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn info(&self) -> &PluginInfo {
        &self.info
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.info.description = description.into();
        self
    }

    /// Declares a setting and its default.
    pub fn setting(mut self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        self.info.settings.insert(name.into(), default.into());
        self
    }

    /// Registers `responder` for the given event kinds.
    pub fn responder<I, K>(mut self, kinds: I, responder: Responder) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<EventKind>,
    {
        self.responders
            .push((kinds.into_iter().map(Into::into).collect(), responder));
        self
    }

    /// Declares a bare periodic job. Each tick dispatches the job kind
    /// `"<plugin>.<name>"` with no arguments and no repository.
    pub fn schedule<H: Handler>(
        mut self,
        name: impl Into<String>,
        schedule: Schedule,
        handler: H,
    ) -> Self {
        let name = name.into();
        let responder = Responder::new(name.clone(), handler);
        self.jobs.push((
            ScheduledJob {
                name,
                schedule,
                target: JobTarget::Bare,
            },
            responder,
        ));
        self
    }

    /// Declares a responder that is run periodically for every active
    /// repository with this plugin enabled. It receives the repository handle
    /// as its only positional argument.
    pub fn scheduled_responder(self, responder: Responder, schedule: Schedule) -> Self {
        self.scheduled_responder_for(responder, schedule, true)
    }

    /// Like [`scheduled_responder`](Self::scheduled_responder), selecting
    /// repositories whose activation state equals `repo_active`.
    pub fn scheduled_responder_for(
        mut self,
        responder: Responder,
        schedule: Schedule,
        repo_active: bool,
    ) -> Self {
        self.jobs.push((
            ScheduledJob {
                name: responder.name().to_string(),
                schedule,
                target: JobTarget::Repositories { repo_active },
            },
            responder,
        ));
        self
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.info.name)
            .field("responders", &self.responders.len())
            .field("jobs", &self.jobs.len())
            .finish()
    }
}
