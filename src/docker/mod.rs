//! Container runtime backed by the `docker` CLI.
//!
//! The lifecycle manager only sees the `ContainerRuntime` trait; `DockerRuntime`
//! shells out to `docker run / port / rm / ps` and also serves label-based
//! discovery of shared containers.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use crate::locator::{ContainerAddress, Discovery};
use crate::utils::{docker_cli_path, docker_command, docker_host};

/// Startup budget when the configuration does not set one.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(60);

/// Host alias containers use to reach the application on the host.
pub const HOST_GATEWAY_ALIAS: &str = "host.docker.internal";

const READINESS_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("docker {command} failed: {message}")]
    Command { command: String, message: String },

    #[error("container did not start within {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("container {id} does not publish port {port}")]
    PortNotMapped { id: String, port: u16 },

    #[error("failed to run docker: {0}")]
    Io(#[from] std::io::Error),
}

/// HTTP endpoint that must answer 2xx before the container counts as started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Readiness {
    pub container_port: u16,
    pub path: String,
}

/// Everything needed to run one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartRequest {
    pub image: String,
    pub env: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    /// Container ports published on random host ports.
    pub exposed_ports: Vec<u16>,
    pub network: Option<String>,
    pub network_alias: Option<String>,
    /// Host port the container must be able to reach.
    pub host_access_port: Option<u16>,
    pub readiness: Option<Readiness>,
    pub timeout: Duration,
}

/// A container this process started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedContainer {
    pub id: String,
    pub host: String,
    /// container port -> host port
    pub ports: BTreeMap<u16, u16>,
}

impl StartedContainer {
    pub fn mapped_port(&self, container_port: u16) -> Option<u16> {
        self.ports.get(&container_port).copied()
    }
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn is_available(&self) -> bool;

    /// Run the container and wait until it is ready. `request.timeout` covers
    /// run and readiness, not the image pull. On failure nothing is left
    /// running.
    async fn start(&self, request: &StartRequest) -> Result<StartedContainer, RuntimeError>;

    async fn stop(&self, container_id: &str) -> Result<(), RuntimeError>;
}

/// `ContainerRuntime` and `Discovery` over the local docker CLI.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    program: PathBuf,
    host: String,
    http: reqwest::Client,
}

impl Default for DockerRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerRuntime {
    pub fn new() -> Self {
        Self::with_host(docker_host())
    }

    pub fn with_host(host: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap_or_default();
        Self {
            program: docker_cli_path(),
            host: host.into(),
            http,
        }
    }

    /// Use the docker CLI at `program` instead of the default one.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Run `docker <args>` and return its trimmed stdout.
    async fn docker(&self, args: &[String]) -> Result<String, RuntimeError> {
        let mut cmd = docker_command(&self.program, args);
        cmd.kill_on_drop(true);
        let output = cmd.output().await?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if output.status.success() {
            Ok(stdout)
        } else {
            Err(RuntimeError::Command {
                command: args.first().cloned().unwrap_or_default(),
                message: if stderr.is_empty() { stdout } else { stderr },
            })
        }
    }

    async fn ensure_network(&self, network: &str) -> Result<(), RuntimeError> {
        let inspect = vec!["network".to_string(), "inspect".to_string(), network.to_string()];
        if self.docker(&inspect).await.is_ok() {
            return Ok(());
        }
        tracing::info!("Creating docker network '{}'", network);
        let create = vec!["network".to_string(), "create".to_string(), network.to_string()];
        self.docker(&create).await.map(|_| ())
    }

    /// Pull `image` unless it is already present locally.
    async fn ensure_image(&self, image: &str) -> Result<(), RuntimeError> {
        if self.docker(&image_inspect_args(image)).await.is_ok() {
            return Ok(());
        }
        tracing::info!("Pulling image {}", image);
        self.docker(&pull_args(image)).await.map(|_| ())
    }

    async fn mapped_port(&self, id: &str, container_port: u16) -> Result<Option<u16>, RuntimeError> {
        let args = vec![
            "port".to_string(),
            id.to_string(),
            format!("{}/tcp", container_port),
        ];
        match self.docker(&args).await {
            Ok(out) => Ok(parse_port_output(&out)),
            // "no public port '9090/tcp' published"
            Err(RuntimeError::Command { message, .. }) if message.contains("no public port") => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn remove(&self, id: &str) -> Result<(), RuntimeError> {
        let args = vec!["rm".to_string(), "-f".to_string(), "-v".to_string(), id.to_string()];
        self.docker(&args).await.map(|_| ())
    }

    async fn launch(&self, name: &str, request: &StartRequest) -> Result<StartedContainer, RuntimeError> {
        if let Some(network) = &request.network {
            self.ensure_network(network).await?;
        }

        tracing::info!("Starting container {} from {}", name, request.image);
        if let Some(port) = request.host_access_port {
            tracing::debug!("Host port {} is reachable from {} as {}", port, name, HOST_GATEWAY_ALIAS);
        }
        let id = self.docker(&run_args(name, request)).await?;

        let mut ports = BTreeMap::new();
        for port in &request.exposed_ports {
            let public = self
                .mapped_port(&id, *port)
                .await?
                .ok_or_else(|| RuntimeError::PortNotMapped {
                    id: id.clone(),
                    port: *port,
                })?;
            ports.insert(*port, public);
        }

        let started = StartedContainer {
            id,
            host: self.host.clone(),
            ports,
        };

        if let Some(readiness) = &request.readiness {
            self.wait_ready(&started, readiness).await?;
        }
        Ok(started)
    }

    async fn wait_ready(&self, started: &StartedContainer, readiness: &Readiness) -> Result<(), RuntimeError> {
        let port = started
            .mapped_port(readiness.container_port)
            .ok_or_else(|| RuntimeError::PortNotMapped {
                id: started.id.clone(),
                port: readiness.container_port,
            })?;
        let url = format!("http://{}:{}{}", started.host, port, readiness.path);

        loop {
            match self.http.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    tracing::debug!("{} is ready", url);
                    return Ok(());
                }
                Ok(resp) => tracing::trace!("{} answered {}", url, resp.status()),
                Err(e) => tracing::trace!("{} not reachable yet: {}", url, e),
            }
            tokio::time::sleep(READINESS_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn is_available(&self) -> bool {
        let args = vec!["info".to_string(), "--format".to_string(), "{{.ServerVersion}}".to_string()];
        match self.docker(&args).await {
            Ok(version) => {
                tracing::debug!("Docker daemon {} is available", version);
                true
            }
            Err(e) => {
                tracing::debug!("Docker is not available: {}", e);
                false
            }
        }
    }

    async fn start(&self, request: &StartRequest) -> Result<StartedContainer, RuntimeError> {
        self.ensure_image(&request.image).await?;

        let name = format!("microcks-devservice-{}", uuid::Uuid::new_v4().simple());
        let deadline = Instant::now() + request.timeout;

        let outcome = tokio::time::timeout_at(deadline, self.launch(&name, request)).await;
        let err = match outcome {
            Ok(Ok(started)) => return Ok(started),
            Ok(Err(e)) => e,
            Err(_) => RuntimeError::Timeout {
                timeout: request.timeout,
            },
        };

        // the container may exist even though docker run did not report it
        if let Err(cleanup) = self.remove(&name).await {
            tracing::debug!("Cleanup of {} after failed start: {}", name, cleanup);
        }
        Err(err)
    }

    async fn stop(&self, container_id: &str) -> Result<(), RuntimeError> {
        tracing::info!("Removing container {}", container_id);
        self.remove(container_id).await
    }
}

#[async_trait]
impl Discovery for DockerRuntime {
    async fn find(
        &self,
        label: &str,
        value: &str,
        container_port: u16,
    ) -> anyhow::Result<Option<ContainerAddress>> {
        let args = vec![
            "ps".to_string(),
            "-q".to_string(),
            "--filter".to_string(),
            format!("label={}={}", label, value),
            "--filter".to_string(),
            "status=running".to_string(),
        ];
        let out = self.docker(&args).await?;

        for id in out.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if let Some(port) = self.mapped_port(id, container_port).await? {
                return Ok(Some(ContainerAddress {
                    id: id.to_string(),
                    host: self.host.clone(),
                    port,
                }));
            }
        }
        Ok(None)
    }
}

/// Arguments of `docker run` for `request`.
pub(crate) fn run_args(name: &str, request: &StartRequest) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "-d".to_string(),
        "--name".to_string(),
        name.to_string(),
    ];

    for (key, value) in &request.labels {
        args.push("--label".to_string());
        args.push(format!("{}={}", key, value));
    }
    for (key, value) in &request.env {
        args.push("-e".to_string());
        args.push(format!("{}={}", key, value));
    }
    for port in &request.exposed_ports {
        args.push("-p".to_string());
        args.push(port.to_string());
    }
    if let Some(network) = &request.network {
        args.push("--network".to_string());
        args.push(network.clone());
        if let Some(alias) = &request.network_alias {
            args.push("--network-alias".to_string());
            args.push(alias.clone());
        }
    }
    if request.host_access_port.is_some() {
        args.push("--add-host".to_string());
        args.push(format!("{}:host-gateway", HOST_GATEWAY_ALIAS));
    }

    args.push(request.image.clone());
    args
}

fn image_inspect_args(image: &str) -> Vec<String> {
    vec!["image".to_string(), "inspect".to_string(), image.to_string()]
}

fn pull_args(image: &str) -> Vec<String> {
    vec!["pull".to_string(), image.to_string()]
}

/// First host port in `docker port` output such as `0.0.0.0:49153\n[::]:49153`.
pub(crate) fn parse_port_output(output: &str) -> Option<u16> {
    output
        .lines()
        .filter_map(|line| line.trim().rsplit_once(':'))
        .find_map(|(_, port)| port.parse().ok())
}
