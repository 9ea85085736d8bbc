//! Seeding a freshly started instance with project artifacts.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::scanner::{scan, ScanError, MAX_SCAN_DEPTH};
use super::{ArtifactKind, PRIMARY_SUFFIXES, SECONDARY_SUFFIXES};
use crate::config::ArtifactsConfig;

/// Instance-side import operations.
#[async_trait]
pub trait ArtifactImporter: Send + Sync {
    /// Import a file as a main artifact (contract definition).
    async fn import_main(&self, path: &Path) -> anyhow::Result<()>;
    /// Import a file as a secondary artifact (examples, metadata, ...).
    async fn import_secondary(&self, path: &Path) -> anyhow::Result<()>;
}

/// Opens an importer against a started instance's HTTP endpoint.
pub trait ImporterFactory: Send + Sync {
    fn connect(&self, host: &str, http_port: u16) -> Arc<dyn ArtifactImporter>;
}

#[derive(Debug)]
pub struct ImportFailure {
    pub path: PathBuf,
    pub kind: ArtifactKind,
    pub error: anyhow::Error,
}

/// Outcome of one import run.
#[derive(Debug, Default)]
pub struct ImportReport {
    pub imported: Vec<(ArtifactKind, PathBuf)>,
    pub failures: Vec<ImportFailure>,
    /// Set when scanning aborted the run.
    pub scan_error: Option<ScanError>,
}

impl ImportReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.scan_error.is_none()
    }

    pub fn count(&self, kind: ArtifactKind) -> usize {
        self.imported.iter().filter(|(k, _)| *k == kind).count()
    }

    fn summarize(&self) {
        if let Some(err) = &self.scan_error {
            tracing::error!("Failed to load Artifacts in microcks: {}", err);
        }
        if self.is_clean() {
            tracing::debug!(
                "Imported {} primary and {} secondary artifacts",
                self.count(ArtifactKind::Primary),
                self.count(ArtifactKind::Secondary)
            );
        } else if !self.failures.is_empty() {
            tracing::warn!(
                "{} artifact(s) failed to import, {} imported",
                self.failures.len(),
                self.imported.len()
            );
        }
    }

    async fn import_one(&mut self, importer: &dyn ArtifactImporter, kind: ArtifactKind, path: &Path) {
        tracing::info!("Load '{}' as {} artifact", path.display(), kind);
        let result = match kind {
            ArtifactKind::Primary => importer.import_main(path).await,
            ArtifactKind::Secondary => importer.import_secondary(path).await,
        };
        match result {
            Ok(()) => self.imported.push((kind, path.to_path_buf())),
            Err(error) => {
                tracing::error!("Failed to load '{}' as {} artifact: {:#}", path.display(), kind, error);
                self.failures.push(ImportFailure {
                    path: path.to_path_buf(),
                    kind,
                    error,
                });
            }
        }
    }
}

/// Import the explicitly configured artifacts, or scan `resource_dirs` when
/// none are configured.
///
/// Each file is imported independently; a failure is recorded and the run
/// continues. When scanning, secondary artifacts are only looked for if at
/// least one primary artifact was found.
pub async fn import_artifacts(
    importer: &dyn ArtifactImporter,
    explicit: Option<&ArtifactsConfig>,
    resource_dirs: &[PathBuf],
) -> ImportReport {
    let mut report = ImportReport::default();

    match explicit {
        Some(artifacts) => {
            for path in &artifacts.primaries {
                report.import_one(importer, ArtifactKind::Primary, path).await;
            }
            for path in artifacts.secondaries.iter().flatten() {
                report.import_one(importer, ArtifactKind::Secondary, path).await;
            }
        }
        None => {
            if let Err(err) = scan_and_import(importer, resource_dirs, &mut report).await {
                report.scan_error = Some(err);
            }
        }
    }

    report.summarize();
    report
}

async fn scan_and_import(
    importer: &dyn ArtifactImporter,
    resource_dirs: &[PathBuf],
    report: &mut ImportReport,
) -> Result<(), ScanError> {
    let primaries = scan(resource_dirs, PRIMARY_SUFFIXES, MAX_SCAN_DEPTH)?;
    for path in &primaries {
        report.import_one(importer, ArtifactKind::Primary, path).await;
    }

    if primaries.is_empty() {
        tracing::debug!("No primary artifact found, skipping secondary artifacts scan");
        return Ok(());
    }

    let secondaries = scan(resource_dirs, SECONDARY_SUFFIXES, MAX_SCAN_DEPTH)?;
    for path in &secondaries {
        report.import_one(importer, ArtifactKind::Secondary, path).await;
    }
    Ok(())
}
