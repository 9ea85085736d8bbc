//! Finding a shared Microcks container started by another process.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

use crate::config::LaunchMode;
use crate::microcks::Protocol;

/// Label put on shared dev service containers; its value is the service name.
pub const DEV_SERVICE_LABEL: &str = "quarkus-dev-service-microcks";

/// Where a container publishes one of its ports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerAddress {
    pub id: String,
    pub host: String,
    pub port: u16,
}

/// Lookup of running containers by label.
#[async_trait]
pub trait Discovery: Send + Sync {
    /// First running container labelled `label=value` that publishes
    /// `container_port`, with the host port it is mapped to.
    async fn find(
        &self,
        label: &str,
        value: &str,
        container_port: u16,
    ) -> anyhow::Result<Option<ContainerAddress>>;
}

/// A reusable instance with both protocol ports resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceAddress {
    pub id: String,
    pub host: String,
    pub http_port: u16,
    pub grpc_port: u16,
}

pub struct InstanceLocator {
    discovery: Arc<dyn Discovery>,
}

impl InstanceLocator {
    pub fn new(discovery: Arc<dyn Discovery>) -> Self {
        Self { discovery }
    }

    /// Look for a shared instance of `service_name`.
    ///
    /// Only development launches look: test runs must never bind to a
    /// dev-loop container. Both the HTTP and the gRPC port have to resolve,
    /// otherwise the instance is treated as foreign and `None` is returned.
    pub async fn locate(
        &self,
        service_name: &str,
        shared: bool,
        mode: LaunchMode,
    ) -> Option<InstanceAddress> {
        if !shared || mode != LaunchMode::Development {
            return None;
        }

        let http = self.find_port(service_name, Protocol::Http).await?;
        let grpc = self.find_port(service_name, Protocol::Grpc).await?;

        if http.id != grpc.id {
            tracing::debug!(
                "Shared '{}' ports resolved on different containers ({} / {})",
                service_name,
                http.id,
                grpc.id
            );
        }

        tracing::info!(
            "Found shared microcks container {} for '{}' on {}:{}",
            http.id,
            service_name,
            http.host,
            http.port
        );
        Some(InstanceAddress {
            id: http.id,
            host: http.host,
            http_port: http.port,
            grpc_port: grpc.port,
        })
    }

    async fn find_port(&self, service_name: &str, protocol: Protocol) -> Option<ContainerAddress> {
        match self
            .discovery
            .find(DEV_SERVICE_LABEL, service_name, protocol.container_port())
            .await
        {
            Ok(found) => {
                if found.is_none() {
                    tracing::debug!(
                        "No shared '{}' container publishing {} port {}",
                        service_name,
                        protocol,
                        protocol.container_port()
                    );
                }
                found
            }
            Err(e) => {
                tracing::warn!("Shared container lookup for '{}' failed: {:#}", service_name, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct StaticDiscovery {
        by_port: HashMap<u16, ContainerAddress>,
        queries: Mutex<Vec<(String, String, u16)>>,
        fail: bool,
    }

    impl StaticDiscovery {
        fn with(ports: &[(u16, u16)]) -> Self {
            let by_port = ports
                .iter()
                .map(|(private, public)| {
                    (
                        *private,
                        ContainerAddress {
                            id: "abc123".to_string(),
                            host: "localhost".to_string(),
                            port: *public,
                        },
                    )
                })
                .collect();
            Self {
                by_port,
                ..Default::default()
            }
        }

        fn query_count(&self) -> usize {
            self.queries.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Discovery for StaticDiscovery {
        async fn find(
            &self,
            label: &str,
            value: &str,
            container_port: u16,
        ) -> anyhow::Result<Option<ContainerAddress>> {
            self.queries
                .lock()
                .unwrap()
                .push((label.to_string(), value.to_string(), container_port));
            if self.fail {
                anyhow::bail!("docker ps failed");
            }
            Ok(self.by_port.get(&container_port).cloned())
        }
    }

    #[tokio::test]
    async fn test_locate_both_ports() {
        let discovery = Arc::new(StaticDiscovery::with(&[(8080, 49001), (9090, 49002)]));
        let locator = InstanceLocator::new(discovery.clone());

        let found = locator.locate("default", true, LaunchMode::Development).await;
        assert_eq!(
            found,
            Some(InstanceAddress {
                id: "abc123".to_string(),
                host: "localhost".to_string(),
                http_port: 49001,
                grpc_port: 49002,
            })
        );
        let queries = discovery.queries.lock().unwrap().clone();
        assert_eq!(
            queries,
            vec![
                (DEV_SERVICE_LABEL.to_string(), "default".to_string(), 8080),
                (DEV_SERVICE_LABEL.to_string(), "default".to_string(), 9090),
            ]
        );
    }

    #[tokio::test]
    async fn test_partial_match_is_a_miss() {
        let discovery = Arc::new(StaticDiscovery::with(&[(8080, 49001)]));
        let locator = InstanceLocator::new(discovery);
        assert!(locator.locate("default", true, LaunchMode::Development).await.is_none());
    }

    #[tokio::test]
    async fn test_not_shared_never_queries() {
        let discovery = Arc::new(StaticDiscovery::with(&[(8080, 49001), (9090, 49002)]));
        let locator = InstanceLocator::new(discovery.clone());
        assert!(locator.locate("default", false, LaunchMode::Development).await.is_none());
        assert_eq!(discovery.query_count(), 0);
    }

    #[tokio::test]
    async fn test_test_mode_never_queries() {
        let discovery = Arc::new(StaticDiscovery::with(&[(8080, 49001), (9090, 49002)]));
        let locator = InstanceLocator::new(discovery.clone());
        assert!(locator.locate("default", true, LaunchMode::Test).await.is_none());
        assert_eq!(discovery.query_count(), 0);
    }

    #[tokio::test]
    async fn test_discovery_error_is_a_miss() {
        let discovery = Arc::new(StaticDiscovery {
            fail: true,
            ..Default::default()
        });
        let locator = InstanceLocator::new(discovery.clone());
        assert!(locator.locate("default", true, LaunchMode::Development).await.is_none());
        // the grpc query is not attempted once http failed
        assert_eq!(discovery.query_count(), 1);
    }
}
