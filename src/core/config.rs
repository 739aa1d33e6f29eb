//! Configuration management for the exporter.
//!
//! Sources, lowest to highest precedence:
//! - Defaults
//! - YAML file
//! - `OTEL_*` environment variables
//! - CLI argument overrides
//!
//! [`ExporterConfig::validate`] runs when building, so an exporter is never
//! constructed from an endpoint it cannot use.

use crate::core::resource::ResourceConfig;
use crate::core::{ExporterError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tonic::transport::Uri;

/// Default endpoint for OTLP/gRPC
pub const DEFAULT_GRPC_ENDPOINT: &str = "http://localhost:4317";
/// Default endpoint for OTLP/HTTP
pub const DEFAULT_HTTP_ENDPOINT: &str = "http://localhost:4318";

/// Environment variable names read by [`ConfigBuilder::from_env`].
pub mod env {
    pub const OTLP_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
    pub const OTLP_TRACES_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_TRACES_ENDPOINT";
    pub const OTLP_HEADERS: &str = "OTEL_EXPORTER_OTLP_HEADERS";
    pub const OTLP_TRACES_HEADERS: &str = "OTEL_EXPORTER_OTLP_TRACES_HEADERS";
    pub const OTLP_PROTOCOL: &str = "OTEL_EXPORTER_OTLP_PROTOCOL";
    pub const OTLP_TRACES_PROTOCOL: &str = "OTEL_EXPORTER_OTLP_TRACES_PROTOCOL";
    pub const OTLP_TIMEOUT: &str = "OTEL_EXPORTER_OTLP_TIMEOUT";
    pub const OTLP_TRACES_TIMEOUT: &str = "OTEL_EXPORTER_OTLP_TRACES_TIMEOUT";
    pub const SERVICE_NAME: &str = "OTEL_SERVICE_NAME";
    pub const RESOURCE_ATTRIBUTES: &str = "OTEL_RESOURCE_ATTRIBUTES";
}

/// Complete configuration for a trace exporter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    /// Collector endpoint; defaults depend on `protocol`
    pub endpoint: Option<String>,
    /// Wire protocol
    pub protocol: Protocol,
    /// Raw `name=value,...` header string
    pub headers: Option<String>,
    /// Per-call timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Upper bound for `shutdown`
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
    /// Resource attributes
    pub resource: ResourceConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// OTLP transport protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Protocol {
    /// Unary gRPC call on a persistent channel
    #[default]
    #[serde(rename = "grpc")]
    Grpc,
    /// HTTP POST with a binary protobuf body
    #[serde(rename = "http/protobuf")]
    HttpProtobuf,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: LogLevel,
    /// Include targets, thread ids and line numbers
    pub structured: bool,
}

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        ExporterConfig {
            endpoint: None,
            protocol: Protocol::default(),
            headers: None,
            timeout: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(5),
            resource: ResourceConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: LogLevel::Info,
            structured: false,
        }
    }
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Grpc => "grpc",
            Protocol::HttpProtobuf => "http/protobuf",
        }
    }

    pub fn default_endpoint(&self) -> &'static str {
        match self {
            Protocol::Grpc => DEFAULT_GRPC_ENDPOINT,
            Protocol::HttpProtobuf => DEFAULT_HTTP_ENDPOINT,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = ExporterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "grpc" => Ok(Protocol::Grpc),
            "http/protobuf" | "http" => Ok(Protocol::HttpProtobuf),
            other => Err(ExporterError::config(format!(
                "Unsupported OTLP protocol '{other}', expected 'grpc' or 'http/protobuf'"
            ))),
        }
    }
}

impl LogLevel {
    /// Convert to tracing filter string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl ExporterConfig {
    /// The configured endpoint, or the protocol's default.
    pub fn endpoint(&self) -> &str {
        self.endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| self.protocol.default_endpoint())
    }

    /// Parses the endpoint and checks it is an absolute http(s) URI.
    pub fn endpoint_uri(&self) -> Result<Uri> {
        let raw = self.endpoint();
        let uri: Uri = raw
            .parse()
            .map_err(|e| ExporterError::config(format!("Invalid endpoint '{raw}': {e}")))?;

        match uri.scheme_str() {
            Some("http") | Some("https") => {},
            Some(other) => {
                return Err(ExporterError::config(format!(
                    "Unsupported endpoint scheme '{other}' in '{raw}', expected http or https"
                )))
            },
            None => {
                return Err(ExporterError::config(format!(
                    "Endpoint '{raw}' must include an http or https scheme"
                )))
            },
        }

        if uri.authority().is_none() {
            return Err(ExporterError::config(format!("Endpoint '{raw}' has no host")));
        }

        Ok(uri)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.endpoint_uri()?;

        if self.timeout.is_zero() {
            return Err(ExporterError::config("timeout must be greater than 0"));
        }

        if self.shutdown_timeout.is_zero() {
            return Err(ExporterError::config("shutdown_timeout must be greater than 0"));
        }

        Ok(())
    }
}

/// Configuration builder for programmatic construction
#[derive(Default)]
pub struct ConfigBuilder {
    config: ExporterConfig,
}

impl ConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        ConfigBuilder {
            config: ExporterConfig::default(),
        }
    }

    /// Load configuration from YAML string
    pub fn from_yaml(mut self, yaml: &str) -> Result<Self> {
        self.config = serde_yaml::from_str(yaml)
            .map_err(|e| ExporterError::config(format!("Failed to parse YAML config: {}", e)))?;
        Ok(self)
    }

    /// Apply `OTEL_*` variables from the process environment
    pub fn from_env(self) -> Result<Self> {
        self.from_env_with(|key| std::env::var(key).ok())
    }

    /// Apply `OTEL_*` variables using `lookup`.
    ///
    /// Trace-specific variables win over the generic `OTEL_EXPORTER_OTLP_*`
    /// ones. Empty values are ignored.
    pub fn from_env_with<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |specific: &str, generic: Option<&str>| {
            lookup(specific)
                .filter(|v| !v.trim().is_empty())
                .or_else(|| generic.and_then(&lookup).filter(|v| !v.trim().is_empty()))
        };

        if let Some(protocol) = get(env::OTLP_TRACES_PROTOCOL, Some(env::OTLP_PROTOCOL)) {
            self.config.protocol = protocol.parse()?;
        }
        if let Some(endpoint) = get(env::OTLP_TRACES_ENDPOINT, Some(env::OTLP_ENDPOINT)) {
            self.config.endpoint = Some(endpoint);
        }
        if let Some(headers) = get(env::OTLP_TRACES_HEADERS, Some(env::OTLP_HEADERS)) {
            self.config.headers = Some(headers);
        }
        if let Some(timeout) = get(env::OTLP_TRACES_TIMEOUT, Some(env::OTLP_TIMEOUT)) {
            let millis: u64 = timeout.trim().parse().map_err(|_| {
                ExporterError::config(format!("Invalid timeout '{timeout}', expected milliseconds"))
            })?;
            self.config.timeout = Duration::from_millis(millis);
        }
        if let Some(name) = get(env::SERVICE_NAME, None) {
            self.config.resource.service_name = Some(name);
        }
        if let Some(attributes) = get(env::RESOURCE_ATTRIBUTES, None) {
            self.config.resource.attributes = Some(attributes);
        }

        Ok(self)
    }

    /// Set the collector endpoint
    pub fn endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.config.endpoint = Some(endpoint.into());
        self
    }

    /// Set the wire protocol
    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.config.protocol = protocol;
        self
    }

    /// Set the raw header string
    pub fn headers<S: Into<String>>(mut self, headers: S) -> Self {
        self.config.headers = Some(headers.into());
        self
    }

    /// Set per-call timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set shutdown timeout
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_timeout = timeout;
        self
    }

    /// Set `service.name`
    pub fn service_name<S: Into<String>>(mut self, name: S) -> Self {
        self.config.resource.service_name = Some(name.into());
        self
    }

    /// Set resource attributes in `key=value,...` form
    pub fn resource_attributes<S: Into<String>>(mut self, attributes: S) -> Self {
        self.config.resource.attributes = Some(attributes.into());
        self
    }

    /// Set log level
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.config.logging.level = level;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<ExporterConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = ExporterConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.endpoint(), DEFAULT_GRPC_ENDPOINT);
    }

    #[test]
    fn test_default_endpoint_follows_protocol() {
        let config = ConfigBuilder::new().protocol(Protocol::HttpProtobuf).build().unwrap();
        assert_eq!(config.endpoint(), DEFAULT_HTTP_ENDPOINT);
    }

    #[test]
    fn test_invalid_scheme_rejected() {
        let err = ConfigBuilder::new().endpoint("ftp://collector:4317").build().unwrap_err();
        assert_eq!(err.category(), "config");
        assert!(err.to_string().contains("ftp"));

        assert!(ConfigBuilder::new().endpoint("localhost:4317").build().is_err());
        assert!(ConfigBuilder::new().endpoint("not a uri").build().is_err());
    }

    #[test]
    fn test_https_accepted() {
        assert!(ConfigBuilder::new().endpoint("https://otel.example.com").build().is_ok());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        assert!(ConfigBuilder::new().timeout(Duration::ZERO).build().is_err());
        assert!(ConfigBuilder::new().shutdown_timeout(Duration::ZERO).build().is_err());
    }

    #[test]
    fn test_protocol_parsing() {
        assert_eq!("grpc".parse::<Protocol>().unwrap(), Protocol::Grpc);
        assert_eq!("HTTP/PROTOBUF".parse::<Protocol>().unwrap(), Protocol::HttpProtobuf);
        assert!("http/json".parse::<Protocol>().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let config = ConfigBuilder::new()
            .from_env_with(lookup(&[
                (env::OTLP_ENDPOINT, "http://generic:4318"),
                (env::OTLP_TRACES_ENDPOINT, "http://traces:4318/v1/traces"),
                (env::OTLP_PROTOCOL, "http/protobuf"),
                (env::OTLP_HEADERS, "a=1"),
                (env::OTLP_TIMEOUT, "2500"),
                (env::SERVICE_NAME, "inventory"),
            ]))
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(config.endpoint(), "http://traces:4318/v1/traces");
        assert_eq!(config.protocol, Protocol::HttpProtobuf);
        assert_eq!(config.headers.as_deref(), Some("a=1"));
        assert_eq!(config.timeout, Duration::from_millis(2500));
        assert_eq!(config.resource.service_name.as_deref(), Some("inventory"));
    }

    #[test]
    fn test_env_empty_values_ignored() {
        let config = ConfigBuilder::new()
            .endpoint("http://kept:4317")
            .from_env_with(lookup(&[(env::OTLP_ENDPOINT, "  ")]))
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(config.endpoint(), "http://kept:4317");
    }

    #[test]
    fn test_env_invalid_timeout() {
        let result = ConfigBuilder::new().from_env_with(lookup(&[(env::OTLP_TIMEOUT, "10s")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
endpoint: "https://collector.internal:4318"
protocol: http/protobuf
headers: "api-key=abc, x-team=obs"
timeout: 3s
shutdown_timeout: 500ms
resource:
  service_name: payments
  attributes: "deployment.environment=staging"
logging:
  level: debug
"#;

        let config = ConfigBuilder::new().from_yaml(yaml).unwrap().build().unwrap();

        assert_eq!(config.endpoint(), "https://collector.internal:4318");
        assert_eq!(config.protocol, Protocol::HttpProtobuf);
        assert_eq!(config.timeout, Duration::from_secs(3));
        assert_eq!(config.shutdown_timeout, Duration::from_millis(500));
        assert_eq!(config.resource.service_name.as_deref(), Some("payments"));
        assert_eq!(config.logging.level, LogLevel::Debug);
    }

    #[test]
    fn test_yaml_unknown_protocol_rejected() {
        assert!(ConfigBuilder::new().from_yaml("protocol: thrift").is_err());
    }
}
