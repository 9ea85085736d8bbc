//! Artifact discovery and import.
//!
//! Files are recognised by filename suffix: contracts (OpenAPI, AsyncAPI,
//! gRPC, GraphQL, SoapUI) are primary artifacts, while Postman collections,
//! metadata files and HAR recordings are secondary ones layered on top.

pub mod importer;
pub mod scanner;

use std::path::Path;

pub use importer::{import_artifacts, ArtifactImporter, ImportFailure, ImportReport, ImporterFactory};
pub use scanner::{scan, ScanError, MAX_SCAN_DEPTH};

/// Suffixes of files imported as primary artifacts.
pub const PRIMARY_SUFFIXES: &[&str] = &[
    "-openapi.yml",
    "-openapi.yaml",
    "-openapi.json",
    ".proto",
    ".graphql",
    "-asyncapi.yml",
    "-asyncapi.yaml",
    "-asyncapi.json",
    "-soapui-project.xml",
];

/// Suffixes of files imported as secondary artifacts.
pub const SECONDARY_SUFFIXES: &[&str] = &[
    "postman-collection.json",
    "postman_collection.json",
    "-metadata.yml",
    "-metadata.yaml",
    ".har",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Primary,
    Secondary,
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactKind::Primary => f.write_str("primary"),
            ArtifactKind::Secondary => f.write_str("secondary"),
        }
    }
}

/// Case-sensitive suffix match against the full path. Primary suffixes are
/// checked first; `None` when nothing matches.
pub fn classify<S: AsRef<str>>(
    path: &Path,
    primary_suffixes: &[S],
    secondary_suffixes: &[S],
) -> Option<ArtifactKind> {
    let candidate = path.to_string_lossy();
    if ends_with_one_of(&candidate, primary_suffixes) {
        Some(ArtifactKind::Primary)
    } else if ends_with_one_of(&candidate, secondary_suffixes) {
        Some(ArtifactKind::Secondary)
    } else {
        None
    }
}

/// `classify` with the built-in suffix tables.
pub fn classify_default(path: &Path) -> Option<ArtifactKind> {
    classify(path, PRIMARY_SUFFIXES, SECONDARY_SUFFIXES)
}

pub(crate) fn ends_with_one_of<S: AsRef<str>>(candidate: &str, suffixes: &[S]) -> bool {
    suffixes.iter().any(|suffix| candidate.ends_with(suffix.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_classify_primary() {
        for name in [
            "api/petstore-openapi.yaml",
            "proto/hello.proto",
            "films.graphql",
            "events-asyncapi.json",
            "legacy-soapui-project.xml",
        ] {
            assert_eq!(classify_default(Path::new(name)), Some(ArtifactKind::Primary), "{name}");
        }
    }

    #[test]
    fn test_classify_secondary() {
        for name in [
            "petstore-postman-collection.json",
            "petstore.postman_collection.json",
            "api-metadata.yml",
            "capture.har",
        ] {
            assert_eq!(classify_default(Path::new(name)), Some(ArtifactKind::Secondary), "{name}");
        }
    }

    #[test]
    fn test_classify_none() {
        assert_eq!(classify_default(Path::new("README.md")), None);
        assert_eq!(classify_default(Path::new("openapi.yaml")), None);
        // suffix match is case-sensitive
        assert_eq!(classify_default(Path::new("hello.PROTO")), None);
    }

    #[test]
    fn test_primary_wins_over_secondary() {
        let primary = ["-collection.json"];
        let secondary = ["postman-collection.json"];
        let path = PathBuf::from("orders-postman-collection.json");
        assert_eq!(classify(&path, &primary, &secondary), Some(ArtifactKind::Primary));
    }

    #[test]
    fn test_classify_custom_tables() {
        let primary: Vec<String> = vec![".wsdl".to_string()];
        let secondary: Vec<String> = vec![];
        assert_eq!(classify(Path::new("svc.wsdl"), &primary, &secondary), Some(ArtifactKind::Primary));
        assert_eq!(classify(Path::new("svc.xml"), &primary, &secondary), None);
    }
}
