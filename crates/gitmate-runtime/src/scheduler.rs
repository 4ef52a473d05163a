//! Periodic jobs.
//!
//! Plugins declare two kinds of periodic work (see
//! [`JobTarget`](gitmate_framework::JobTarget)):
//!
//! - **bare jobs** dispatch their job kind once per tick, with no arguments
//!   and no repository;
//! - **scheduled responders** broadcast their job kind to every stored
//!   repository that has the plugin enabled, one dispatch per repository with
//!   the repository's handle as the only argument.
//!
//! Ticks go through the [`Dispatcher`] like any webhook event, so they are
//! queued, time limited and isolated the same way.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info, warn};

use gitmate_core::{EventKind, Repository, RepositoryContext, RepositoryError, RepositoryResult};
use gitmate_framework::{Dispatcher, InvocationHandle, JobTarget, Schedule, ScheduleEntry};

use crate::error::RuntimeResult;

// ============================================================================
// RepositoryStore
// ============================================================================

/// Lists stored repositories for broadcasts.
#[async_trait]
pub trait RepositoryStore: Send + Sync {
    /// Repositories that have `plugin` enabled and whose activation state
    /// equals `active`.
    async fn repositories(
        &self,
        plugin: &str,
        active: bool,
    ) -> RepositoryResult<Vec<Arc<dyn RepositoryContext>>>;
}

/// In-process [`RepositoryStore`], keyed by full name.
#[derive(Debug, Default)]
pub struct MemoryRepositoryStore {
    repositories: RwLock<BTreeMap<String, Arc<Repository>>>,
}

impl MemoryRepositoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `repository`, replacing any stored one with the same name.
    pub fn insert(&self, repository: Repository) {
        self.repositories
            .write()
            .insert(repository.full_name().to_string(), Arc::new(repository));
    }

    pub fn get(&self, full_name: &str) -> Option<Arc<Repository>> {
        self.repositories.read().get(full_name).cloned()
    }

    /// Applies `f` to the stored repository. Fails if it does not exist.
    pub fn update<F>(&self, full_name: &str, f: F) -> RepositoryResult<()>
    where
        F: FnOnce(&mut Repository),
    {
        let mut repositories = self.repositories.write();
        let repository = repositories
            .get_mut(full_name)
            .ok_or_else(|| RepositoryError::NotFound(full_name.to_string()))?;
        f(Arc::make_mut(repository));
        Ok(())
    }

    pub fn remove(&self, full_name: &str) -> Option<Arc<Repository>> {
        self.repositories.write().remove(full_name)
    }

    pub fn len(&self) -> usize {
        self.repositories.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<Repository> for MemoryRepositoryStore {
    fn from_iter<I: IntoIterator<Item = Repository>>(iter: I) -> Self {
        let store = Self::new();
        for repository in iter {
            store.insert(repository);
        }
        store
    }
}

#[async_trait]
impl RepositoryStore for MemoryRepositoryStore {
    async fn repositories(
        &self,
        plugin: &str,
        active: bool,
    ) -> RepositoryResult<Vec<Arc<dyn RepositoryContext>>> {
        Ok(self
            .repositories
            .read()
            .values()
            .filter(|repo| repo.is_active() == active && repo.has_plugin(plugin))
            .map(|repo| Arc::clone(repo) as Arc<dyn RepositoryContext>)
            .collect())
    }
}

// ============================================================================
// Ticks
// ============================================================================

/// Dispatches `kind` for every repository with `plugin` enabled whose
/// activation state equals `repo_active`.
///
/// Each repository is handled on its own: one whose handle cannot be built is
/// logged and skipped.
pub async fn broadcast(
    dispatcher: &Dispatcher,
    store: &dyn RepositoryStore,
    plugin: &str,
    kind: &EventKind,
    repo_active: bool,
) -> Vec<InvocationHandle> {
    let repositories = match store.repositories(plugin, repo_active).await {
        Ok(repositories) => repositories,
        Err(e) => {
            error!(plugin = %plugin, kind = %kind, error = %e, "Failed to list repositories");
            return Vec::new();
        }
    };

    let mut handles = Vec::new();
    for repository in &repositories {
        let handle = match repository.handle() {
            Ok(handle) => handle,
            Err(e) => {
                warn!(
                    plugin = %plugin,
                    repository = %repository.full_name(),
                    error = %e,
                    "Skipping repository"
                );
                continue;
            }
        };
        let submitted = dispatcher
            .dispatch(kind, vec![handle.into()], Some(repository.as_ref()), Some(plugin))
            .await;
        handles.extend(submitted);
    }

    debug!(
        plugin = %plugin,
        kind = %kind,
        repositories = repositories.len(),
        invocations = handles.len(),
        "Broadcast finished"
    );
    handles
}

/// Runs one tick of a scheduled job.
pub async fn tick(
    dispatcher: &Dispatcher,
    store: &dyn RepositoryStore,
    entry: &ScheduleEntry,
) -> Vec<InvocationHandle> {
    match entry.target {
        JobTarget::Bare => {
            dispatcher
                .dispatch(&entry.kind, Vec::new(), None, Some(entry.plugin.as_str()))
                .await
        }
        JobTarget::Repositories { repo_active } => {
            broadcast(dispatcher, store, &entry.plugin, &entry.kind, repo_active).await
        }
    }
}

// ============================================================================
// Scheduler
// ============================================================================

struct Tick {
    dispatcher: Dispatcher,
    store: Arc<dyn RepositoryStore>,
    entry: ScheduleEntry,
}

impl Tick {
    async fn run(&self) {
        debug!(job = %self.entry.kind, "Scheduled job fired");
        tick(&self.dispatcher, self.store.as_ref(), &self.entry).await;
    }
}

/// Drives the registry's scheduled jobs with `tokio-cron-scheduler`.
pub struct Scheduler {
    dispatcher: Dispatcher,
    store: Arc<dyn RepositoryStore>,
    jobs: JobScheduler,
}

impl Scheduler {
    pub async fn new(
        dispatcher: Dispatcher,
        store: Arc<dyn RepositoryStore>,
    ) -> RuntimeResult<Self> {
        let jobs = JobScheduler::new().await?;
        Ok(Self {
            dispatcher,
            store,
            jobs,
        })
    }

    /// Adds every job collected by the dispatcher's registry. Returns how many
    /// were added.
    pub async fn register_all(&self) -> RuntimeResult<usize> {
        let entries = self.dispatcher.registry().schedules().to_vec();
        let count = entries.len();
        for entry in entries {
            self.register(entry).await?;
        }
        info!(jobs = count, "All scheduled jobs registered");
        Ok(count)
    }

    /// Adds one job.
    pub async fn register(&self, entry: ScheduleEntry) -> RuntimeResult<()> {
        let schedule = entry.schedule.clone();
        let kind = entry.kind.clone();
        let tick = Arc::new(Tick {
            dispatcher: self.dispatcher.clone(),
            store: Arc::clone(&self.store),
            entry,
        });

        let job = match &schedule {
            Schedule::Every(interval) => Job::new_repeated_async(*interval, move |_uuid, _lock| {
                let tick = Arc::clone(&tick);
                Box::pin(async move { tick.run().await })
            })?,
            Schedule::Cron(expression) => Job::new_async(expression.as_str(), move |_uuid, _lock| {
                let tick = Arc::clone(&tick);
                Box::pin(async move { tick.run().await })
            })?,
        };
        self.jobs.add(job).await?;

        info!(job = %kind, schedule = %schedule, "Registered scheduled job");
        Ok(())
    }

    pub async fn start(&self) -> RuntimeResult<()> {
        self.jobs.start().await?;
        info!("Scheduler started");
        Ok(())
    }

    pub async fn shutdown(&self) -> RuntimeResult<()> {
        let mut jobs = self.jobs.clone();
        jobs.shutdown().await?;
        info!("Scheduler shut down");
        Ok(())
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler").finish_non_exhaustive()
    }
}
