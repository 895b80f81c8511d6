//! Logging for the `arx` CLI.
//!
//! Log lines go to stderr so command output on stdout stays scriptable. When
//! `OTEL_EXPORTER_OTLP_ENDPOINT` is set, spans are also exported over OTLP/gRPC.

use anyhow::{anyhow, Context, Result};
use base64ct::{Base64, Encoding};
use once_cell::sync::OnceCell;
use opentelemetry::{
    global, propagation::TextMapCompositePropagator, trace::TracerProvider as _, KeyValue,
};
use opentelemetry_otlp::{Compression, WithExportConfig, WithTonicConfig};
use opentelemetry_sdk::{
    propagation::{BaggagePropagator, TraceContextPropagator},
    trace::{SdkTracerProvider, Tracer},
    Resource,
};
use std::time::Duration;
use tonic::{
    metadata::{AsciiMetadataKey, BinaryMetadataKey, MetadataMap, MetadataValue},
    transport::ClientTlsConfig,
};
use tracing::{debug, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};
use ulid::Ulid;

const EXPORT_TIMEOUT: Duration = Duration::from_secs(3);
// Noisy dependencies stay quiet unless RUST_LOG asks for them.
const QUIET: [&str; 5] = [
    "hyper=error",
    "h2=error",
    "reqwest=error",
    "tonic=error",
    "opentelemetry_sdk=warn",
];

static TRACER_PROVIDER: OnceCell<SdkTracerProvider> = OnceCell::new();

/// Span export settings read from the standard `OTEL_*` variables.
#[derive(Debug)]
struct ExportSettings {
    endpoint: String,
    metadata: MetadataMap,
    instance_id: String,
}

impl ExportSettings {
    /// `None` when no collector endpoint is configured; a short CLI run
    /// should not try to reach a default collector.
    fn from_lookup<F>(lookup: F) -> Result<Option<Self>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let Some(endpoint) = lookup("OTEL_EXPORTER_OTLP_ENDPOINT") else {
            return Ok(None);
        };

        if let Some(protocol) = lookup("OTEL_EXPORTER_OTLP_PROTOCOL") {
            if protocol != "grpc" {
                debug!("OTEL_EXPORTER_OTLP_PROTOCOL={protocol} ignored, exporting over grpc");
            }
        }

        let metadata = match lookup("OTEL_EXPORTER_OTLP_HEADERS") {
            Some(raw) => metadata(&raw)?,
            None => MetadataMap::new(),
        };

        Ok(Some(Self {
            endpoint: with_scheme(&endpoint),
            metadata,
            instance_id: lookup("OTEL_SERVICE_INSTANCE_ID")
                .unwrap_or_else(|| Ulid::new().to_string()),
        }))
    }

    fn tls_domain(&self) -> Option<&str> {
        self.endpoint
            .strip_prefix("https://")
            .and_then(|rest| rest.split(['/', ':']).next())
            .filter(|host| !host.is_empty())
    }
}

/// Parse `key=value,key2=value2`. Keys ending in `-bin` carry base64 values.
fn metadata(raw: &str) -> Result<MetadataMap> {
    let mut map = MetadataMap::new();

    for pair in raw.split(',') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim();
        if key.is_empty() {
            continue;
        }

        if key.ends_with("-bin") {
            let bytes = Base64::decode_vec(value)
                .map_err(|e| anyhow!("header {key}: invalid base64: {e}"))?;
            let key = BinaryMetadataKey::from_bytes(key.as_bytes())
                .map_err(|e| anyhow!("header {key}: invalid name: {e}"))?;
            map.insert_bin(key, MetadataValue::from_bytes(&bytes));
        } else {
            let name = AsciiMetadataKey::from_bytes(key.as_bytes())
                .map_err(|e| anyhow!("header {key}: invalid name: {e}"))?;
            let value = value
                .parse()
                .map_err(|e| anyhow!("header {key}: invalid value: {e}"))?;
            map.insert(name, value);
        }
    }

    Ok(map)
}

fn with_scheme(endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("https://{}", endpoint.trim_end_matches('/'))
    }
}

fn tracer(settings: ExportSettings) -> Result<Tracer> {
    let mut exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(settings.endpoint.as_str())
        .with_compression(Compression::Gzip)
        .with_timeout(EXPORT_TIMEOUT);

    if let Some(domain) = settings.tls_domain() {
        exporter = exporter.with_tls_config(
            ClientTlsConfig::new()
                .domain_name(domain.to_string())
                .with_native_roots(),
        );
    }
    if !settings.metadata.is_empty() {
        exporter = exporter.with_metadata(settings.metadata.clone());
    }

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter.build().context("failed to build span exporter")?)
        .with_resource(
            Resource::builder_empty()
                .with_attributes([
                    KeyValue::new("service.name", env!("CARGO_PKG_NAME")),
                    KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                    KeyValue::new("service.instance.id", settings.instance_id),
                    KeyValue::new("vcs.revision", crate::GIT_COMMIT_HASH),
                ])
                .build(),
        )
        .build();

    let _ = TRACER_PROVIDER.set(provider.clone());
    global::set_tracer_provider(provider.clone());
    global::set_text_map_propagator(TextMapCompositePropagator::new(vec![
        Box::new(TraceContextPropagator::new()),
        Box::new(BaggagePropagator::new()),
    ]));

    Ok(provider.tracer(env!("CARGO_PKG_NAME")))
}

fn filter(level: Level) -> Result<EnvFilter> {
    QUIET.iter().try_fold(
        EnvFilter::builder()
            .with_default_directive(level.into())
            .from_env_lossy(),
        |filter, directive| -> Result<EnvFilter> {
            Ok(filter.add_directive(directive.parse()?))
        },
    )
}

/// Install the global subscriber. `None` logs errors only.
///
/// # Errors
///
/// Returns an error if the export settings are invalid or a subscriber is
/// already installed.
pub fn init(verbosity_level: Option<Level>) -> Result<()> {
    let level = verbosity_level.unwrap_or(Level::ERROR);

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    let otel_layer = ExportSettings::from_lookup(|name| std::env::var(name).ok())?
        .map(tracer)
        .transpose()?
        .map(|tracer| tracing_opentelemetry::layer().with_tracer(tracer));

    let subscriber = Registry::default()
        .with(fmt_layer)
        .with(otel_layer)
        .with(filter(level)?);
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

/// Flush pending spans; a no-op when export was never enabled.
pub fn shutdown_tracer() {
    if let Some(provider) = TRACER_PROVIDER.get() {
        debug!("flushing spans");
        let _ = provider.shutdown();
    }
}
