//! Microcks dev service lifecycle.
//!
//! `DevServiceManager::ensure_running` is called on every build/test cycle.
//! It keeps at most one set of running containers per process, reuses it while
//! the configuration is unchanged, restarts it on configuration drift, and
//! registers a single shutdown hook that tears down what this process owns.

pub mod error;
pub mod exposed;
pub mod phase;
pub mod shutdown;

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::artifacts::{import_artifacts, ImporterFactory};
use crate::config::{DevServiceConfig, LaunchContext, LaunchMode};
use crate::docker::{ContainerRuntime, Readiness, StartRequest, DEFAULT_STARTUP_TIMEOUT};
use crate::locator::{Discovery, InstanceLocator, DEV_SERVICE_LABEL};
use crate::microcks::{Protocol, HEALTH_PATH, MICROCKS_GRPC_PORT, MICROCKS_HTTP_PORT};

pub use error::DevServiceError;
pub use exposed::{export_config, url_key, ExposedConfig};
pub use phase::{LifecyclePhase, PhaseMachine, TransitionError};
pub use shutdown::{BackgroundTasks, ShutdownHooks};

// ─── Release handles ─────────────────────────────────────────

/// Teardown of one running instance.
#[async_trait]
pub trait Release: Send + Sync {
    async fn release(&self) -> anyhow::Result<()>;

    /// Whether releasing actually stops something this process owns.
    fn owns_instance(&self) -> bool {
        true
    }
}

/// Release of an instance owned by another process: nothing to do.
struct NoopRelease;

#[async_trait]
impl Release for NoopRelease {
    async fn release(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn owns_instance(&self) -> bool {
        false
    }
}

struct ContainerRelease {
    runtime: Arc<dyn ContainerRuntime>,
    container_id: String,
}

#[async_trait]
impl Release for ContainerRelease {
    async fn release(&self) -> anyhow::Result<()> {
        self.runtime.stop(&self.container_id).await?;
        Ok(())
    }
}

/// Idempotent close capability; clones share the closed flag.
#[derive(Clone)]
pub struct ReleaseHandle {
    inner: Arc<dyn Release>,
    closed: Arc<AtomicBool>,
}

impl ReleaseHandle {
    pub fn new(release: impl Release + 'static) -> Self {
        Self {
            inner: Arc::new(release),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for a located instance that this process must not stop.
    pub fn noop() -> Self {
        Self::new(NoopRelease)
    }

    /// Handle that stops `container_id` through `runtime`.
    pub fn owned(runtime: Arc<dyn ContainerRuntime>, container_id: String) -> Self {
        Self::new(ContainerRelease {
            runtime,
            container_id,
        })
    }

    /// Releases on the first call only; later calls return `Ok(())`.
    pub async fn close(&self) -> anyhow::Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.release().await
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn owns_instance(&self) -> bool {
        self.inner.owns_instance()
    }
}

impl std::fmt::Debug for ReleaseHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReleaseHandle")
            .field("owned", &self.owns_instance())
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ─── Running services ────────────────────────────────────────

/// A Microcks instance in use by this process, started or located.
#[derive(Debug, Clone)]
pub struct RunningDevService {
    pub name: String,
    pub container_id: String,
    pub config: ExposedConfig,
    release: ReleaseHandle,
}

/// Serializable view of a `RunningDevService`.
#[derive(Debug, Clone, Serialize)]
pub struct DevServiceDescriptor {
    pub name: String,
    pub container_id: String,
    pub owned: bool,
    pub config: ExposedConfig,
}

impl RunningDevService {
    pub fn new(name: &str, container_id: &str, release: ReleaseHandle, config: ExposedConfig) -> Self {
        Self {
            name: name.to_string(),
            container_id: container_id.to_string(),
            config,
            release,
        }
    }

    pub async fn close(&self) -> anyhow::Result<()> {
        self.release.close().await
    }

    pub fn is_closed(&self) -> bool {
        self.release.is_closed()
    }

    pub fn owns_instance(&self) -> bool {
        self.release.owns_instance()
    }

    /// Composed URL of `protocol`, when exported.
    pub fn url(&self, protocol: Protocol) -> Option<&str> {
        self.config.get(&url_key(&self.name, protocol)).map(String::as_str)
    }

    pub fn descriptor(&self) -> DevServiceDescriptor {
        DevServiceDescriptor {
            name: self.name.clone(),
            container_id: self.container_id.clone(),
            owned: self.owns_instance(),
            config: self.config.clone(),
        }
    }
}

// ─── Managed state ───────────────────────────────────────────

/// Directories scanned for artifacts when none are configured explicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectLayout {
    pub resource_dirs: Vec<PathBuf>,
}

impl ProjectLayout {
    pub fn new(resource_dirs: Vec<PathBuf>) -> Self {
        Self { resource_dirs }
    }
}

/// Running services together with the configuration that produced them.
#[derive(Debug)]
struct Managed {
    config: DevServiceConfig,
    services: Vec<RunningDevService>,
}

/// Process-wide lifecycle state, shared between the manager and its
/// shutdown hook.
#[derive(Debug, Default)]
pub struct ManagedState {
    managed: Option<Managed>,
    hook_registered: bool,
    phase: PhaseMachine,
}

pub type SharedState = Arc<Mutex<ManagedState>>;

impl ManagedState {
    pub fn shared() -> SharedState {
        Arc::new(Mutex::new(Self::default()))
    }

    pub fn is_present(&self) -> bool {
        self.managed.is_some()
    }

    pub fn captured_config(&self) -> Option<&DevServiceConfig> {
        self.managed.as_ref().map(|m| &m.config)
    }

    pub fn services(&self) -> &[RunningDevService] {
        self.managed.as_ref().map(|m| m.services.as_slice()).unwrap_or(&[])
    }

    pub fn hook_registered(&self) -> bool {
        self.hook_registered
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.phase.phase()
    }

    /// Drop the managed set, closing every service. Close failures are
    /// logged and do not stop the remaining closes.
    async fn close_all(&mut self) {
        let Some(managed) = self.managed.take() else {
            return;
        };
        for service in &managed.services {
            if let Err(e) = service.close().await {
                tracing::error!(
                    "Failed to stop microcks container {}: {:#}",
                    service.container_id,
                    e
                );
            }
        }
    }

    /// Shutdown hook body: close everything, go back to absent and allow a
    /// later start to register a new hook.
    async fn shutdown(&mut self) {
        if self.phase() == LifecyclePhase::Running {
            self.phase.advance(LifecyclePhase::Stopping);
            self.close_all().await;
            self.phase.advance(LifecyclePhase::Absent);
        } else {
            self.close_all().await;
        }
        self.hook_registered = false;
    }
}

// ─── Manager ─────────────────────────────────────────────────

pub struct DevServiceManager {
    runtime: Arc<dyn ContainerRuntime>,
    locator: InstanceLocator,
    importers: Arc<dyn ImporterFactory>,
    layout: ProjectLayout,
    state: SharedState,
    hooks: Arc<ShutdownHooks>,
}

impl DevServiceManager {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        discovery: Arc<dyn Discovery>,
        importers: Arc<dyn ImporterFactory>,
        layout: ProjectLayout,
        state: SharedState,
        hooks: Arc<ShutdownHooks>,
    ) -> Self {
        Self {
            runtime,
            locator: InstanceLocator::new(discovery),
            importers,
            layout,
            state,
            hooks,
        }
    }

    /// Make sure the dev service described by `config` is running and return it.
    ///
    /// Unchanged configuration returns the current services without touching
    /// the runtime. Changed configuration stops the current services before
    /// anything new is started. Disabled config or a missing container runtime
    /// yields an empty list; only a failed start is an error.
    pub async fn ensure_running(
        &self,
        config: &DevServiceConfig,
        ctx: &LaunchContext,
    ) -> Result<Vec<RunningDevService>, DevServiceError> {
        if ctx.mode == LaunchMode::Normal {
            tracing::debug!("Microcks dev services are not managed in normal launch mode");
            return Ok(Vec::new());
        }

        let mut state = self.state.lock().await;

        let unchanged = state.captured_config().map(|captured| captured == config);
        if unchanged == Some(true) {
            return Ok(state.services().to_vec());
        }
        if unchanged == Some(false) {
            tracing::info!(
                "Configuration of microcks dev service '{}' changed, restarting",
                config.service_name
            );
            state.phase.advance(LifecyclePhase::Restarting);
            state.close_all().await;
        }
        state.phase.advance(LifecyclePhase::Starting);

        let prefix = if ctx.mode.is_test() { "(test) " } else { "" };
        tracing::info!("{}Microcks Dev Services Starting: '{}'", prefix, config.service_name);

        let started = match self.start_service(config, ctx).await {
            Ok(started) => started,
            Err(e) => {
                tracing::error!("{}Microcks Dev Services failed to start: {}", prefix, e);
                state.phase.advance(LifecyclePhase::Absent);
                return Err(e);
            }
        };

        let services: Vec<RunningDevService> = started.into_iter().collect();
        for service in &services {
            tracing::info!(
                "The '{}' microcks container is ready on {}",
                service.name,
                service.url(Protocol::Http).unwrap_or("<unknown>")
            );
        }

        state.managed = Some(Managed {
            config: config.clone(),
            services: services.clone(),
        });
        state.phase.advance(LifecyclePhase::Running);

        if !state.hook_registered {
            state.hook_registered = true;
            self.register_shutdown_hook();
        }

        Ok(services)
    }

    /// Services currently tracked, empty when absent.
    pub async fn running_services(&self) -> Vec<RunningDevService> {
        self.state.lock().await.services().to_vec()
    }

    pub async fn phase(&self) -> LifecyclePhase {
        self.state.lock().await.phase()
    }

    pub async fn captured_config(&self) -> Option<DevServiceConfig> {
        self.state.lock().await.captured_config().cloned()
    }

    /// Close tracked services now, as the shutdown hook would, but keep the
    /// registered hook in place.
    pub async fn stop_all(&self) {
        let mut state = self.state.lock().await;
        let registered = state.hook_registered;
        state.shutdown().await;
        state.hook_registered = registered;
    }

    fn register_shutdown_hook(&self) {
        let state = self.state.clone();
        self.hooks.add_close_task(move || async move {
            state.lock().await.shutdown().await;
        });
        tracing::debug!("Registered microcks dev service shutdown hook");
    }

    async fn start_service(
        &self,
        config: &DevServiceConfig,
        ctx: &LaunchContext,
    ) -> Result<Option<RunningDevService>, DevServiceError> {
        if !config.enabled {
            tracing::debug!("Not starting devservices for Microcks as it has been disabled in the config");
            return Ok(None);
        }

        if !self.runtime.is_available().await {
            tracing::warn!("Please get a working docker instance to start the Microcks dev service");
            return Ok(None);
        }

        let service_name = config.service_name.as_str();

        if let Some(address) = self.locator.locate(service_name, config.shared, ctx.mode).await {
            let ports = BTreeMap::from([
                (Protocol::Http, address.http_port),
                (Protocol::Grpc, address.grpc_port),
            ]);
            return Ok(Some(RunningDevService::new(
                service_name,
                &address.id,
                ReleaseHandle::noop(),
                export_config(service_name, &address.host, &ports),
            )));
        }

        let request = self.start_request(config, ctx);
        let started = self
            .runtime
            .start(&request)
            .await
            .map_err(|e| DevServiceError::from_runtime(service_name, e))?;
        let release = ReleaseHandle::owned(self.runtime.clone(), started.id.clone());

        let (http_port, grpc_port) = match (
            started.mapped_port(MICROCKS_HTTP_PORT),
            started.mapped_port(MICROCKS_GRPC_PORT),
        ) {
            (Some(http), Some(grpc)) => (http, grpc),
            (http, _) => {
                if let Err(e) = release.close().await {
                    tracing::error!("Failed to stop microcks container {}: {:#}", started.id, e);
                }
                let protocol = if http.is_none() { Protocol::Http } else { Protocol::Grpc };
                return Err(DevServiceError::MissingPort {
                    service: service_name.to_string(),
                    protocol: protocol.name(),
                });
            }
        };

        let importer = self.importers.connect(&started.host, http_port);
        import_artifacts(importer.as_ref(), config.artifacts.as_ref(), &self.layout.resource_dirs).await;

        let visible_host = request.network_alias.as_deref().unwrap_or(&started.host);
        let ports = BTreeMap::from([(Protocol::Http, http_port), (Protocol::Grpc, grpc_port)]);
        Ok(Some(RunningDevService::new(
            service_name,
            &started.id,
            release,
            export_config(service_name, visible_host, &ports),
        )))
    }

    fn start_request(&self, config: &DevServiceConfig, ctx: &LaunchContext) -> StartRequest {
        let mut labels = BTreeMap::new();
        if ctx.mode == LaunchMode::Development {
            labels.insert(DEV_SERVICE_LABEL.to_string(), config.service_name.clone());
        }

        StartRequest {
            image: config.image().to_string(),
            env: config.container_env.clone(),
            labels,
            exposed_ports: vec![MICROCKS_HTTP_PORT, MICROCKS_GRPC_PORT],
            network: ctx.shared_network.clone(),
            network_alias: ctx
                .shared_network
                .as_ref()
                .map(|_| shared_network_alias(&config.service_name)),
            host_access_port: ctx.host_test_port,
            readiness: Some(Readiness {
                container_port: MICROCKS_HTTP_PORT,
                path: HEALTH_PATH.to_string(),
            }),
            timeout: config.startup_timeout().unwrap_or(DEFAULT_STARTUP_TIMEOUT),
        }
    }
}

/// Hostname other containers on the shared network use for this service.
fn shared_network_alias(service_name: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", service_name, &suffix[..8])
}
