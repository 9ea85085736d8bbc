//! Talking to a running Microcks instance over HTTP.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::artifacts::{ArtifactImporter, ImporterFactory};

/// Container port of the Microcks HTTP API and UI.
pub const MICROCKS_HTTP_PORT: u16 = 8080;
/// Container port of the Microcks gRPC mock server.
pub const MICROCKS_GRPC_PORT: u16 = 9090;

/// Path polled to decide the instance is ready.
pub const HEALTH_PATH: &str = "/api/health";

const UPLOAD_PATH: &str = "/api/artifact/upload";

/// Protocols exposed by a Microcks instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Protocol {
    Http,
    Grpc,
}

impl Protocol {
    pub const ALL: [Protocol; 2] = [Protocol::Http, Protocol::Grpc];

    pub fn name(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Grpc => "grpc",
        }
    }

    pub fn container_port(&self) -> u16 {
        match self {
            Protocol::Http => MICROCKS_HTTP_PORT,
            Protocol::Grpc => MICROCKS_GRPC_PORT,
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Microcks REST client used to upload artifacts.
#[derive(Debug, Clone)]
pub struct MicrocksClient {
    base_url: String,
    http: reqwest::Client,
}

impl MicrocksClient {
    pub fn new(host: &str, http_port: u16) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            base_url: format!("http://{}:{}", host, http_port),
            http,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn upload_url(&self, main_artifact: bool) -> String {
        format!("{}{}?mainArtifact={}", self.base_url, UPLOAD_PATH, main_artifact)
    }

    /// `POST /api/artifact/upload` with the file as multipart `file` part.
    async fn upload(&self, path: &Path, main_artifact: bool) -> Result<()> {
        let content = tokio::fs::read(path)
            .await
            .with_context(|| format!("cannot read artifact {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "artifact".to_string());

        let part = reqwest::multipart::Part::bytes(content).file_name(file_name);
        let form = reqwest::multipart::Form::new().part("file", part);

        let url = self.upload_url(main_artifact);
        tracing::debug!("POST {}", url);
        let resp = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .with_context(|| format!("upload of {} failed", path.display()))?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(anyhow::anyhow!(
                "Artifact {} has not been imported ({}): {}",
                path.display(),
                status,
                body.trim()
            ))
        }
    }
}

#[async_trait]
impl ArtifactImporter for MicrocksClient {
    async fn import_main(&self, path: &Path) -> Result<()> {
        self.upload(path, true).await
    }

    async fn import_secondary(&self, path: &Path) -> Result<()> {
        self.upload(path, false).await
    }
}

/// Builds a `MicrocksClient` for each started instance.
#[derive(Debug, Default, Clone)]
pub struct MicrocksClientFactory;

impl ImporterFactory for MicrocksClientFactory {
    fn connect(&self, host: &str, http_port: u16) -> Arc<dyn ArtifactImporter> {
        Arc::new(MicrocksClient::new(host, http_port))
    }
}
