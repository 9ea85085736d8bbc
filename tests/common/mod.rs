//! In-memory collaborators for driving `DevServiceManager` without docker.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use microcks_devservice::artifacts::{ArtifactImporter, ArtifactKind, ImporterFactory};
use microcks_devservice::config::{DevServiceConfig, LaunchContext, LaunchMode};
use microcks_devservice::devservice::ProjectLayout;
use microcks_devservice::docker::{ContainerRuntime, RuntimeError, StartRequest, StartedContainer};
use microcks_devservice::locator::{ContainerAddress, Discovery};
use microcks_devservice::{DevServiceManager, ManagedState, ShutdownHooks};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Start(String),
    Stop(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartFailure {
    Command,
    Timeout,
}

#[derive(Default)]
pub struct FakeRuntime {
    unavailable: AtomicBool,
    started: AtomicUsize,
    events: Mutex<Vec<Event>>,
    requests: Mutex<Vec<StartRequest>>,
    start_failure: Mutex<Option<StartFailure>>,
    stop_fails: AtomicBool,
    omit_grpc: AtomicBool,
}

impl FakeRuntime {
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    pub fn fail_next_start(&self, failure: StartFailure) {
        *self.start_failure.lock().unwrap() = Some(failure);
    }

    pub fn fail_stops(&self) {
        self.stop_fails.store(true, Ordering::SeqCst);
    }

    pub fn omit_grpc_port(&self) {
        self.omit_grpc.store(true, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn starts(&self) -> usize {
        self.events().iter().filter(|e| matches!(e, Event::Start(_))).count()
    }

    pub fn stops(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Stop(id) => Some(id),
                Event::Start(_) => None,
            })
            .collect()
    }

    pub fn requests(&self) -> Vec<StartRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn is_available(&self) -> bool {
        !self.unavailable.load(Ordering::SeqCst)
    }

    async fn start(&self, request: &StartRequest) -> Result<StartedContainer, RuntimeError> {
        self.requests.lock().unwrap().push(request.clone());

        if let Some(failure) = self.start_failure.lock().unwrap().take() {
            return Err(match failure {
                StartFailure::Command => RuntimeError::Command {
                    command: "run".to_string(),
                    message: "manifest unknown".to_string(),
                },
                StartFailure::Timeout => RuntimeError::Timeout {
                    timeout: request.timeout,
                },
            });
        }

        let n = self.started.fetch_add(1, Ordering::SeqCst) as u16 + 1;
        let id = format!("container-{}", n);
        self.events.lock().unwrap().push(Event::Start(id.clone()));

        let mut ports = BTreeMap::from([(8080, 40000 + n * 10)]);
        if !self.omit_grpc.load(Ordering::SeqCst) {
            ports.insert(9090, 40001 + n * 10);
        }
        Ok(StartedContainer {
            id,
            host: "localhost".to_string(),
            ports,
        })
    }

    async fn stop(&self, container_id: &str) -> Result<(), RuntimeError> {
        self.events
            .lock()
            .unwrap()
            .push(Event::Stop(container_id.to_string()));
        if self.stop_fails.load(Ordering::SeqCst) {
            return Err(RuntimeError::Command {
                command: "rm".to_string(),
                message: "daemon went away".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeDiscovery {
    by_port: Mutex<HashMap<u16, ContainerAddress>>,
    queries: AtomicUsize,
}

impl FakeDiscovery {
    /// Pretend a shared container publishes `container_port` on `host_port`.
    pub fn publish(&self, id: &str, container_port: u16, host_port: u16) {
        self.by_port.lock().unwrap().insert(
            container_port,
            ContainerAddress {
                id: id.to_string(),
                host: "localhost".to_string(),
                port: host_port,
            },
        );
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Discovery for FakeDiscovery {
    async fn find(
        &self,
        _label: &str,
        _value: &str,
        container_port: u16,
    ) -> anyhow::Result<Option<ContainerAddress>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.by_port.lock().unwrap().get(&container_port).cloned())
    }
}

type ImportLog = Arc<Mutex<Vec<(ArtifactKind, PathBuf)>>>;

pub struct FakeImporter {
    log: ImportLog,
    failing: Vec<String>,
}

impl FakeImporter {
    fn record(&self, kind: ArtifactKind, path: &Path) -> anyhow::Result<()> {
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        if self.failing.contains(&name) {
            anyhow::bail!("instance rejected {}", name);
        }
        self.log.lock().unwrap().push((kind, path.to_path_buf()));
        Ok(())
    }
}

#[async_trait]
impl ArtifactImporter for FakeImporter {
    async fn import_main(&self, path: &Path) -> anyhow::Result<()> {
        self.record(ArtifactKind::Primary, path)
    }

    async fn import_secondary(&self, path: &Path) -> anyhow::Result<()> {
        self.record(ArtifactKind::Secondary, path)
    }
}

#[derive(Default)]
pub struct FakeImporterFactory {
    log: ImportLog,
    connections: Mutex<Vec<(String, u16)>>,
    failing: Mutex<Vec<String>>,
}

impl FakeImporterFactory {
    /// Make imports of files named `file_name` fail.
    pub fn fail_on(&self, file_name: &str) {
        self.failing.lock().unwrap().push(file_name.to_string());
    }

    /// Successful imports, in order.
    pub fn imports(&self) -> Vec<(ArtifactKind, PathBuf)> {
        self.log.lock().unwrap().clone()
    }

    pub fn connections(&self) -> Vec<(String, u16)> {
        self.connections.lock().unwrap().clone()
    }
}

impl ImporterFactory for FakeImporterFactory {
    fn connect(&self, host: &str, http_port: u16) -> Arc<dyn ArtifactImporter> {
        self.connections
            .lock()
            .unwrap()
            .push((host.to_string(), http_port));
        Arc::new(FakeImporter {
            log: self.log.clone(),
            failing: self.failing.lock().unwrap().clone(),
        })
    }
}

pub struct Harness {
    pub runtime: Arc<FakeRuntime>,
    pub discovery: Arc<FakeDiscovery>,
    pub importers: Arc<FakeImporterFactory>,
    pub hooks: Arc<ShutdownHooks>,
    pub manager: Arc<DevServiceManager>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_resource_dirs(Vec::new())
    }

    pub fn with_resource_dirs(resource_dirs: Vec<PathBuf>) -> Self {
        let runtime = Arc::new(FakeRuntime::default());
        let discovery = Arc::new(FakeDiscovery::default());
        let importers = Arc::new(FakeImporterFactory::default());
        let hooks = Arc::new(ShutdownHooks::new());
        let manager = Arc::new(DevServiceManager::new(
            runtime.clone(),
            discovery.clone(),
            importers.clone(),
            ProjectLayout::new(resource_dirs),
            ManagedState::shared(),
            hooks.clone(),
        ));
        Self {
            runtime,
            discovery,
            importers,
            hooks,
            manager,
        }
    }
}

pub fn dev_ctx() -> LaunchContext {
    LaunchContext {
        mode: LaunchMode::Development,
        shared_network: None,
        host_test_port: None,
    }
}

pub fn test_ctx() -> LaunchContext {
    LaunchContext {
        mode: LaunchMode::Test,
        ..dev_ctx()
    }
}

pub fn config() -> DevServiceConfig {
    DevServiceConfig {
        startup_timeout_secs: Some(5),
        ..DevServiceConfig::default()
    }
}

pub fn timeout_of(config: &DevServiceConfig) -> Duration {
    config.startup_timeout().unwrap_or(Duration::from_secs(60))
}

pub fn touch(path: &Path) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, "x").unwrap();
}
