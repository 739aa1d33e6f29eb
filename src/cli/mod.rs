//! Command-line interface for `otlp-send`.
//!
//! Sends one synthetic batch of spans to a collector and reports the export
//! result. Handy for checking endpoint, header and protocol settings.

use crate::core::config::ConfigBuilder;
use crate::core::{ExporterConfig, ExporterError, InstrumentationScope, LogLevel, Protocol, Result, Span};
use crate::export::{ExportResult, TraceExporter};
use clap::Parser;
use opentelemetry::trace::{SpanId, SpanKind, Status, TraceId};
use opentelemetry::KeyValue;
use rand::Rng;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

/// Send a test batch of spans to an OTLP collector
#[derive(Parser, Debug)]
#[command(name = "otlp-send")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Collector endpoint, e.g. http://localhost:4317
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Wire protocol: grpc or http/protobuf
    #[arg(long)]
    pub protocol: Option<Protocol>,

    /// Request headers as name=value,name2=value2
    #[arg(long)]
    pub headers: Option<String>,

    /// Per-call timeout, e.g. 5s or 500ms
    #[arg(long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    /// Value of the service.name resource attribute
    #[arg(long)]
    pub service_name: Option<String>,

    /// Configuration file path (default: ~/.config/otlp-send/config.yaml)
    #[arg(short, long, env = "OTLP_SEND_CONFIG")]
    pub config: Option<PathBuf>,

    /// Number of spans in the test batch
    #[arg(long, default_value_t = 1)]
    pub spans: usize,

    /// Validate configuration and exit
    #[arg(long)]
    pub check_config: bool,

    /// Enable debug logging
    #[arg(short, long, env = "OTLP_SEND_DEBUG")]
    pub debug: bool,
}

fn parse_duration(raw: &str) -> std::result::Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(raw).map_err(|e| e.to_string())
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Load configuration with proper precedence:
    /// 1. CLI arguments (highest priority)
    /// 2. Environment variables
    /// 3. Config file
    /// 4. Defaults (lowest priority)
    pub async fn load_config(&self) -> Result<ExporterConfig> {
        let mut builder = ConfigBuilder::new();

        let config_path = match &self.config {
            Some(path) => Some(path.clone()),
            None => dirs::config_dir()
                .map(|d| d.join("otlp-send").join("config.yaml"))
                .filter(|p| p.exists()),
        };

        if let Some(path) = config_path {
            match tokio::fs::read_to_string(&path).await {
                Ok(content) => {
                    builder = builder.from_yaml(&content)?;
                    tracing::debug!("Loaded configuration from: {:?}", path);
                },
                Err(e) => {
                    return Err(ExporterError::config(format!(
                        "Failed to read config file {:?}: {}",
                        path, e
                    )));
                },
            }
        }

        builder = builder.from_env()?;
        self.apply_args(builder).build()
    }

    fn apply_args(&self, mut builder: ConfigBuilder) -> ConfigBuilder {
        if let Some(endpoint) = &self.endpoint {
            builder = builder.endpoint(endpoint.clone());
        }
        if let Some(protocol) = self.protocol {
            builder = builder.protocol(protocol);
        }
        if let Some(headers) = &self.headers {
            builder = builder.headers(headers.clone());
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(name) = &self.service_name {
            builder = builder.service_name(name.clone());
        }
        if self.debug {
            builder = builder.log_level(LogLevel::Debug);
        }
        builder
    }

    /// Initialize logging. `RUST_LOG` wins over the configured level.
    pub fn init_logging(&self, config: &ExporterConfig) -> Result<()> {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));

        let fmt_layer = if config.logging.structured {
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .compact()
        } else {
            tracing_subscriber::fmt::layer().with_target(false).compact()
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| ExporterError::config(format!("Failed to initialize logging: {}", e)))?;

        Ok(())
    }
}

/// Builds `count` spans of one synthetic trace: a server root and internal children.
pub fn synthetic_batch(count: usize) -> Vec<Span> {
    let mut rng = rand::thread_rng();
    let trace_id = TraceId::from(rng.gen::<u128>() | 1);
    let root_id = SpanId::from(rng.gen::<u64>() | 1);
    let scope = InstrumentationScope::new("otlp-send").with_version(env!("CARGO_PKG_VERSION"));
    let end = SystemTime::now();
    let start = end - Duration::from_millis(10 * count as u64);

    (0..count)
        .map(|i| {
            let builder = if i == 0 {
                Span::builder(trace_id, root_id)
                    .name("otlp-send")
                    .kind(SpanKind::Server)
                    .start_time(start)
                    .end_time(end)
            } else {
                let offset = Duration::from_millis(10 * i as u64);
                Span::builder(trace_id, SpanId::from(rng.gen::<u64>() | 1))
                    .name(format!("step-{i}"))
                    .parent_span_id(root_id)
                    .kind(SpanKind::Internal)
                    .start_time(start + offset - Duration::from_millis(10))
                    .end_time(start + offset)
            };
            builder
                .status(Status::Ok)
                .attribute(KeyValue::new("otlp_send.index", i as i64))
                .scope(scope.clone())
                .build()
        })
        .collect()
}

/// Execute the CLI and return the export result.
pub async fn execute(cli: Cli) -> Result<ExportResult> {
    let config = cli.load_config().await?;
    cli.init_logging(&config)?;

    if cli.check_config {
        println!("Configuration is valid!");
        println!("  Endpoint: {}", config.endpoint());
        println!("  Protocol: {}", config.protocol);
        println!("  Headers: {}", crate::core::Headers::parse(config.headers.as_deref()));
        println!("  Timeout: {:?}", config.timeout);
        return Ok(ExportResult::Success);
    }

    let exporter = TraceExporter::new(config.clone())?;
    let batch = synthetic_batch(cli.spans.max(1));

    tracing::info!(
        endpoint = %config.endpoint(),
        protocol = %config.protocol,
        spans = batch.len(),
        "Sending test batch"
    );
    let result = exporter.export(&batch).await;
    println!("{} spans to {}: {}", batch.len(), config.endpoint(), result);

    if !exporter.shutdown().await {
        tracing::warn!("Exporter did not shut down cleanly");
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_args_parse() {
        let cli = Cli::try_parse_from([
            "otlp-send",
            "--endpoint",
            "http://collector:4318",
            "--protocol",
            "http/protobuf",
            "--timeout",
            "250ms",
            "--spans",
            "4",
        ])
        .unwrap();

        assert_eq!(cli.protocol, Some(Protocol::HttpProtobuf));
        assert_eq!(cli.timeout, Some(Duration::from_millis(250)));
        assert_eq!(cli.spans, 4);
    }

    #[test]
    fn test_cli_rejects_unknown_protocol() {
        assert!(Cli::try_parse_from(["otlp-send", "--protocol", "thrift"]).is_err());
    }

    #[test]
    fn test_args_override_builder() {
        let cli = Cli::try_parse_from([
            "otlp-send",
            "--endpoint",
            "https://otel.example.com",
            "--service-name",
            "smoke",
        ])
        .unwrap();
        let config = cli
            .apply_args(ConfigBuilder::new().endpoint("http://from-yaml:4317"))
            .build()
            .unwrap();

        assert_eq!(config.endpoint(), "https://otel.example.com");
        assert_eq!(config.resource.service_name.as_deref(), Some("smoke"));
        assert_eq!(config.logging.level, LogLevel::Info);
    }

    #[test]
    fn test_debug_flag_raises_log_level() {
        let cli = Cli::try_parse_from(["otlp-send", "--debug"]).unwrap();
        let config = cli
            .apply_args(ConfigBuilder::new().from_yaml("logging:\n  level: warn\n").unwrap())
            .build()
            .unwrap();
        assert_eq!(config.logging.level, LogLevel::Debug);
    }

    #[test]
    fn test_synthetic_batch_shape() {
        let batch = synthetic_batch(3);
        assert_eq!(batch.len(), 3);
        assert!(batch[0].is_root());
        assert!(batch[1..].iter().all(|s| s.parent_span_id == Some(batch[0].span_id)));
        assert!(batch.iter().all(|s| s.trace_id == batch[0].trace_id));
        assert!(batch.iter().all(|s| s.start_time <= s.end_time));
    }
}
