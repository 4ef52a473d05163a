//! The responder registry.
//!
//! Registration happens once at startup through a [`RegistryBuilder`]. The
//! builder is then frozen into a [`ResponderRegistry`], shared by `Arc` and
//! never mutated again, so lookups need no locking.
//!
//! ```rust,ignore
//! let mut builder = ResponderRegistry::builder();
//! builder.install(welcome_commenter::plugin())?;
//! builder.register(
//!     [IssueAction::Opened],
//!     "issue_labeller",
//!     Responder::new("label_issue", label_issue),
//! )?;
//! let registry = Arc::new(builder.build());
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use tower::ServiceExt;
use tracing::{debug, info};

use gitmate_core::{EventKind, RepositoryContext};

use crate::error::{BoxError, RegistryError, RegistryResult};
use crate::execution::TaskQueue;
use crate::handler::{ResponderContext, ResponderService};
use crate::plugin::{Plugin, PluginCatalog, PluginInfo, Responder};
use crate::schedule::ScheduleEntry;
use crate::signature::Signature;

// =============================================================================
// Registration
// =============================================================================

/// A registered responder.
#[derive(Clone)]
pub struct Registration {
    name: String,
    plugin: String,
    kinds: Vec<EventKind>,
    service: ResponderService,
    signature: Arc<Signature>,
    queue: TaskQueue,
}

impl Registration {
    /// Task name, `"<plugin>.<handler>"`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The plugin owning this responder.
    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    /// Event kinds this responder answers, in registration order.
    pub fn event_kinds(&self) -> &[EventKind] {
        &self.kinds
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn queue(&self) -> TaskQueue {
        self.queue
    }

    /// Calls the handler.
    pub fn call(&self, ctx: ResponderContext) -> BoxFuture<'static, Result<Value, BoxError>> {
        Box::pin(self.service.clone().oneshot(ctx))
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("name", &self.name)
            .field("plugin", &self.plugin)
            .field("kinds", &self.kinds)
            .field("signature", &self.signature)
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// RegistryBuilder
// =============================================================================

/// Append-only builder for a [`ResponderRegistry`].
#[derive(Default)]
pub struct RegistryBuilder {
    registrations: Vec<Registration>,
    by_name: HashMap<String, usize>,
    by_kind: HashMap<EventKind, Vec<usize>>,
    catalog: PluginCatalog,
    schedules: Vec<ScheduleEntry>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `responder` of `plugin` for `kinds`.
    ///
    /// Registering a responder whose task name already exists adds the new
    /// kinds to that registration; kinds it already answers are ignored. The
    /// repeated responder must declare the same signature and queue, and its
    /// handler is discarded in favour of the first one.
    pub fn register<I, K>(&mut self, kinds: I, plugin: &str, responder: Responder) -> RegistryResult<()>
    where
        I: IntoIterator<Item = K>,
        K: Into<EventKind>,
    {
        validate_plugin_name(plugin)?;
        let name = format!("{plugin}.{}", responder.name());

        let mut requested: Vec<EventKind> = Vec::new();
        for kind in kinds.into_iter().map(Into::into) {
            if requested.contains(&kind) {
                return Err(RegistryError::DuplicateEventKind {
                    responder: name,
                    kind,
                });
            }
            requested.push(kind);
        }
        if requested.is_empty() {
            return Err(RegistryError::EmptyEventKinds(name));
        }

        let index = match self.by_name.get(&name) {
            Some(&index) => {
                let existing = &self.registrations[index];
                if responder.declaration() != (&*existing.signature, existing.queue) {
                    return Err(RegistryError::ConflictingRegistration(name));
                }
                index
            }
            None => {
                let (_, service, signature, queue) = responder.into_parts();
                let index = self.registrations.len();
                self.registrations.push(Registration {
                    name: name.clone(),
                    plugin: plugin.to_string(),
                    kinds: Vec::new(),
                    service,
                    signature,
                    queue,
                });
                self.by_name.insert(name.clone(), index);
                index
            }
        };

        let registration = &mut self.registrations[index];
        for kind in requested {
            if registration.kinds.contains(&kind) {
                continue;
            }
            self.by_kind.entry(kind.clone()).or_default().push(index);
            registration.kinds.push(kind);
        }

        debug!(
            responder = %name,
            kinds = ?registration.kinds.iter().map(ToString::to_string).collect::<Vec<_>>(),
            queue = %registration.queue,
            "Responder registered"
        );
        Ok(())
    }

    /// Installs a plugin: records it in the catalog and registers all of its
    /// responders and scheduled jobs.
    pub fn install(&mut self, plugin: Plugin) -> RegistryResult<()> {
        let Plugin {
            info,
            responders,
            jobs,
        } = plugin;
        let name = info.name().to_string();
        validate_plugin_name(&name)?;
        if !self.catalog.insert(info) {
            return Err(RegistryError::DuplicatePlugin(name));
        }

        for (kinds, responder) in responders {
            self.register(kinds, &name, responder)?;
        }

        for (job, responder) in jobs {
            let job_name = format!("{name}.{}", job.name);
            let kind = EventKind::job(job_name.clone()).map_err(|source| {
                RegistryError::InvalidEventKind {
                    name: job_name,
                    source,
                }
            })?;
            self.register([kind.clone()], &name, responder)?;
            self.schedules.push(ScheduleEntry {
                plugin: name.clone(),
                kind,
                schedule: job.schedule,
                target: job.target,
            });
        }

        info!(plugin = %name, "Plugin installed");
        Ok(())
    }

    /// Freezes the table.
    pub fn build(self) -> ResponderRegistry {
        info!(
            plugins = self.catalog.len(),
            responders = self.registrations.len(),
            schedules = self.schedules.len(),
            "Responder registry built"
        );
        ResponderRegistry {
            registrations: self.registrations,
            by_name: self.by_name,
            by_kind: self.by_kind,
            catalog: Arc::new(self.catalog),
            schedules: self.schedules,
        }
    }
}

fn validate_plugin_name(name: &str) -> RegistryResult<()> {
    if name.is_empty() || name.contains('.') || name.chars().any(char::is_whitespace) {
        return Err(RegistryError::InvalidPluginName(name.to_string()));
    }
    Ok(())
}

// =============================================================================
// ResponderRegistry
// =============================================================================

/// Immutable table of responders, scheduled jobs and installed plugins.
pub struct ResponderRegistry {
    registrations: Vec<Registration>,
    by_name: HashMap<String, usize>,
    by_kind: HashMap<EventKind, Vec<usize>>,
    catalog: Arc<PluginCatalog>,
    schedules: Vec<ScheduleEntry>,
}

impl ResponderRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Selects the responders eligible for `kind`, in registration order.
    ///
    /// - `plugin` given: only responders owned by that plugin
    /// - else `repository` given: only responders whose plugin the repository
    ///   has enabled
    /// - else: every responder for `kind`
    ///
    /// Unknown kinds select nothing.
    pub fn select(
        &self,
        kind: &EventKind,
        repository: Option<&dyn RepositoryContext>,
        plugin: Option<&str>,
    ) -> Vec<&Registration> {
        let Some(indices) = self.by_kind.get(kind) else {
            return Vec::new();
        };

        indices
            .iter()
            .map(|&i| &self.registrations[i])
            .filter(|reg| match (plugin, repository) {
                (Some(plugin), _) => reg.plugin == plugin,
                (None, Some(repo)) => repo.has_plugin(&reg.plugin),
                (None, None) => true,
            })
            .collect()
    }

    /// Looks a responder up by task name.
    pub fn get(&self, name: &str) -> Option<&Registration> {
        self.by_name.get(name).map(|&i| &self.registrations[i])
    }

    pub fn registrations(&self) -> &[Registration] {
        &self.registrations
    }

    /// Periodic triggers declared by installed plugins.
    pub fn schedules(&self) -> &[ScheduleEntry] {
        &self.schedules
    }

    pub fn plugins(&self) -> &Arc<PluginCatalog> {
        &self.catalog
    }

    pub fn plugin(&self, name: &str) -> Option<&PluginInfo> {
        self.catalog.get(name)
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}

impl fmt::Debug for ResponderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponderRegistry")
            .field("responders", &self.registrations.len())
            .field("plugins", &self.catalog.len())
            .field("schedules", &self.schedules.len())
            .finish()
    }
}
