//! Configuration published for applications connecting to the dev service.

use std::collections::BTreeMap;

use crate::microcks::Protocol;

pub const CONFIG_PREFIX: &str = "quarkus.microcks.";
pub const SCHEME: &str = "http://";

/// Namespaced key -> value, e.g. `quarkus.microcks.default.http.port = "8080"`.
pub type ExposedConfig = BTreeMap<String, String>;

pub fn config_prefix(service_name: &str) -> String {
    format!("{}{}", CONFIG_PREFIX, service_name)
}

/// Key holding the composed URL of `protocol` for `service_name`.
pub fn url_key(service_name: &str, protocol: Protocol) -> String {
    format!("{}.{}", config_prefix(service_name), protocol.name())
}

/// URL, host and port keys for every protocol in `ports`.
pub fn export_config(
    service_name: &str,
    visible_host: &str,
    ports: &BTreeMap<Protocol, u16>,
) -> ExposedConfig {
    let mut config = ExposedConfig::new();
    for (protocol, port) in ports {
        let key = url_key(service_name, *protocol);
        config.insert(format!("{}.host", key), visible_host.to_string());
        config.insert(format!("{}.port", key), port.to_string());
        config.insert(key, format!("{}{}:{}", SCHEME, visible_host, port));
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_http_and_grpc() {
        let ports = BTreeMap::from([(Protocol::Http, 8080), (Protocol::Grpc, 9090)]);
        let config = export_config("default", "localhost", &ports);

        let expected: ExposedConfig = [
            ("quarkus.microcks.default.http", "http://localhost:8080"),
            ("quarkus.microcks.default.http.host", "localhost"),
            ("quarkus.microcks.default.http.port", "8080"),
            ("quarkus.microcks.default.grpc", "http://localhost:9090"),
            ("quarkus.microcks.default.grpc.host", "localhost"),
            ("quarkus.microcks.default.grpc.port", "9090"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        assert_eq!(config, expected);
    }

    #[test]
    fn test_export_uses_service_name() {
        let ports = BTreeMap::from([(Protocol::Http, 41000)]);
        let config = export_config("orders", "orders-1a2b3c4d", &ports);
        assert_eq!(config.len(), 3);
        assert_eq!(
            config.get(&url_key("orders", Protocol::Http)).map(String::as_str),
            Some("http://orders-1a2b3c4d:41000")
        );
    }
}
