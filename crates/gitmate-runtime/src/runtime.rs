//! Runtime orchestration.
//!
//! [`GitmateRuntime`] wires a frozen [`ResponderRegistry`] to the queue-backed
//! execution path and the scheduler:
//!
//! ```text
//! webhook ──▶ Dispatcher ──▶ QueueBackend ──▶ MemoryQueue ──▶ WorkerPool ──▶ Executor
//!                 ▲
//! Scheduler ──────┘ (bare jobs and repository broadcasts)
//! ```
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use gitmate_runtime::GitmateRuntime;
//!
//! let mut registry = ResponderRegistry::builder();
//! registry.install(welcome_commenter::plugin())?;
//!
//! let runtime = GitmateRuntime::builder()
//!     .config_file("deploy/gitmate.toml")
//!     .registry(registry.build())
//!     .repositories(store)
//!     .build()?;
//!
//! runtime.run().await?;
//! ```

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use tokio::signal;
use tokio::sync::Mutex;
use tracing::{info, warn};

use gitmate_framework::{Dispatcher, Executor, LoopGuard, ResponderRegistry};

use crate::config::{ConfigLoader, GitmateConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;
use crate::queue::MemoryQueue;
use crate::scheduler::{MemoryRepositoryStore, RepositoryStore, Scheduler};
use crate::worker::{QueueBackend, WorkerPool};

/// The GitMate runtime: dispatcher, work queue, workers and scheduler.
pub struct GitmateRuntime {
    config: GitmateConfig,
    dispatcher: Dispatcher,
    queue: Arc<MemoryQueue>,
    backend: QueueBackend,
    workers: WorkerPool,
    store: Arc<dyn RepositoryStore>,
    /// Present while running with scheduling enabled.
    scheduler: Mutex<Option<Scheduler>>,
    running: Mutex<bool>,
}

impl GitmateRuntime {
    /// Creates a runtime builder.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from an already loaded configuration.
    ///
    /// Initializes logging from the configuration unless a subscriber is
    /// already installed.
    pub fn from_config(
        config: &GitmateConfig,
        registry: Arc<ResponderRegistry>,
        store: Arc<dyn RepositoryStore>,
    ) -> RuntimeResult<Self> {
        validate_config(config)?;
        logging::init_from_config(&config.logging);

        let execution = &config.execution;
        let queue = Arc::new(MemoryQueue::new(
            execution.queue_capacity,
            execution.enqueue_timeout(),
        ));
        let backend = QueueBackend::new(Arc::clone(&registry), queue.clone());
        let executor = Executor::new(Arc::clone(&registry)).with_time_limit(execution.time_limit());
        let workers = WorkerPool::new(&backend, executor, execution.workers.clone());
        let dispatcher = Dispatcher::new(Arc::clone(&registry), Arc::new(backend.clone()))
            .with_loop_guard(LoopGuard::new(config.bot.signature.clone()));

        info!(
            log_level = %config.logging.level,
            responders = registry.len(),
            schedules = registry.schedules().len(),
            time_limit_secs = execution.time_limit_secs,
            "Runtime initialized from configuration"
        );

        Ok(Self {
            config: config.clone(),
            dispatcher,
            queue,
            backend,
            workers,
            store,
            scheduler: Mutex::new(None),
            running: Mutex::new(false),
        })
    }

    pub fn config(&self) -> &GitmateConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ResponderRegistry> {
        self.dispatcher.registry()
    }

    /// Entry point for webhook ingestion.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn queue(&self) -> &Arc<MemoryQueue> {
        &self.queue
    }

    pub fn backend(&self) -> &QueueBackend {
        &self.backend
    }

    pub fn repositories(&self) -> &Arc<dyn RepositoryStore> {
        &self.store
    }

    pub async fn is_running(&self) -> bool {
        *self.running.lock().await
    }

    /// Starts the workers and, if enabled, the scheduler.
    pub async fn start(&self) -> RuntimeResult<()> {
        let mut running = self.running.lock().await;
        if *running {
            warn!("Runtime is already running");
            return Ok(());
        }

        info!("Starting GitMate runtime");
        self.workers.start();

        if self.config.scheduler.enabled {
            let scheduler = Scheduler::new(self.dispatcher.clone(), Arc::clone(&self.store)).await?;
            scheduler.register_all().await?;
            scheduler.start().await?;
            *self.scheduler.lock().await = Some(scheduler);
        } else {
            info!("Scheduler disabled by configuration");
        }

        *running = true;
        info!("Runtime started");
        Ok(())
    }

    /// Stops the scheduler, then lets the workers finish what they hold.
    pub async fn stop(&self) -> RuntimeResult<()> {
        let mut running = self.running.lock().await;
        if !*running {
            warn!("Runtime is not running");
            return Ok(());
        }

        info!("Stopping GitMate runtime");
        if let Some(scheduler) = self.scheduler.lock().await.take() {
            scheduler.shutdown().await?;
        }
        self.workers.shutdown().await;

        *running = false;
        info!("Runtime stopped");
        Ok(())
    }

    /// Runs the runtime until Ctrl+C or SIGTERM.
    pub async fn run(&self) -> RuntimeResult<()> {
        self.start().await?;
        info!("GitMate runtime is now running. Press Ctrl+C to stop.");

        let waited = wait_for_shutdown().await;
        self.stop().await?;
        waited
    }

    /// Runs the runtime until `shutdown` completes.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;
        shutdown.await;
        self.stop().await
    }
}

impl Drop for GitmateRuntime {
    fn drop(&mut self) {
        self.backend.close();
    }
}

impl std::fmt::Debug for GitmateRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitmateRuntime")
            .field("config", &self.config)
            .field("dispatcher", &self.dispatcher)
            .field("queue", &self.queue)
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}

/// Waits for Ctrl+C or, on unix, SIGTERM.
async fn wait_for_shutdown() -> RuntimeResult<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = signal::ctrl_c() => {
                result?;
                info!("Received Ctrl+C, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        info!("Received Ctrl+C, shutting down");
    }

    Ok(())
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for a [`GitmateRuntime`].
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    config: Option<GitmateConfig>,
    registry: Option<Arc<ResponderRegistry>>,
    store: Option<Arc<dyn RepositoryStore>>,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
            config: None,
            registry: None,
            store: None,
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g., "development", "production").
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Enables loading environment variables (enabled by default).
    pub fn with_env(mut self) -> Self {
        self.config_loader = self.config_loader.with_env();
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges additional configuration programmatically.
    pub fn merge(mut self, config: GitmateConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Uses `config` as is, skipping files and environment.
    pub fn config(mut self, config: GitmateConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the responder registry. Required.
    pub fn registry(mut self, registry: impl Into<Arc<ResponderRegistry>>) -> Self {
        self.registry = Some(registry.into());
        self
    }

    /// Sets the repository store scheduled broadcasts read from. Defaults to
    /// an empty [`MemoryRepositoryStore`].
    pub fn repositories(mut self, store: Arc<dyn RepositoryStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Builds the runtime.
    pub fn build(self) -> RuntimeResult<GitmateRuntime> {
        let registry = self.registry.ok_or(RuntimeError::MissingRegistry)?;
        let config = match self.config {
            Some(config) => config,
            None => self.config_loader.load()?,
        };
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryRepositoryStore::new()));
        GitmateRuntime::from_config(&config, registry, store)
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::ConfigError;
    use gitmate_core::{EventKind, IssueAction};
    use gitmate_framework::{BoxError, Responder, ResponderContext};

    fn registry() -> ResponderRegistry {
        let mut builder = ResponderRegistry::builder();
        builder
            .register(
                [IssueAction::Opened],
                "greeter",
                Responder::new("greet", |_ctx: ResponderContext| async move {
                    Ok::<_, BoxError>("hello")
                }),
            )
            .unwrap();
        builder.build()
    }

    fn quiet_config() -> GitmateConfig {
        let mut config = GitmateConfig::default();
        config.scheduler.enabled = false;
        config
    }

    #[test]
    fn test_build_requires_registry() {
        let result = GitmateRuntime::builder().config(quiet_config()).build();
        assert!(matches!(result, Err(RuntimeError::MissingRegistry)));
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let mut config = quiet_config();
        config.execution.workers.short = 0;
        let result = GitmateRuntime::builder()
            .config(config)
            .registry(registry())
            .build();
        assert!(matches!(
            result,
            Err(RuntimeError::Config(ConfigError::Invalid(_)))
        ));
    }

    #[tokio::test]
    async fn test_runtime_executes_dispatched_events() {
        let runtime = GitmateRuntime::builder()
            .config(quiet_config())
            .registry(registry())
            .build()
            .unwrap();
        runtime.start().await.unwrap();
        assert!(runtime.is_running().await);

        let kind = EventKind::from(IssueAction::Opened);
        let handles = runtime.dispatcher().respond_for_plugin(&kind, Vec::new(), "greeter").await;
        assert_eq!(handles.len(), 1);
        for handle in handles {
            let result = handle.get(Some(Duration::from_secs(5))).await;
            assert_eq!(result, Ok(serde_json::json!("hello")));
        }

        runtime.stop().await.unwrap();
        assert!(!runtime.is_running().await);
    }

    #[tokio::test]
    async fn test_drop_resolves_outstanding_handles() {
        let runtime = GitmateRuntime::builder()
            .config(quiet_config())
            .registry(registry())
            .build()
            .unwrap();
        let queue = Arc::clone(runtime.queue());

        // Never started, so nothing consumes the queue.
        let kind = EventKind::from(IssueAction::Opened);
        let handles = runtime.dispatcher().respond_for_plugin(&kind, Vec::new(), "greeter").await;
        assert_eq!(handles.len(), 1);
        drop(runtime);

        assert!(queue.is_closed());
        for handle in handles {
            let result = handle.get(Some(Duration::from_secs(5))).await;
            assert_eq!(result, Err(gitmate_framework::InvocationError::Lost));
        }
    }

    #[tokio::test]
    async fn test_run_until_stops_on_signal() {
        let runtime = GitmateRuntime::builder()
            .config(quiet_config())
            .registry(registry())
            .build()
            .unwrap();
        runtime.run_until(async {}).await.unwrap();
        assert!(!runtime.is_running().await);
    }
}
