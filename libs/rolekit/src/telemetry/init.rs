//! OpenTelemetry tracing initialization utilities
//!
//! Two kinds of providers are built here:
//! - one process-level provider feeding the `tracing` subscriber through
//!   `tracing-opentelemetry` (see [`init_tracing`]);
//! - one provider per service, scoped by `service.name`, handed to the service
//!   together with a [`TracerCloser`] (see [`service_tracer`]).

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use opentelemetry::{KeyValue, global, trace::TracerProvider as _};
use opentelemetry_otlp::{Protocol, WithExportConfig, WithHttpConfig, WithTonicConfig};
use opentelemetry_sdk::{
    Resource,
    propagation::TraceContextPropagator,
    trace::{Sampler, SdkTracer, SdkTracerProvider},
};
use tonic::metadata::{MetadataKey, MetadataMap, MetadataValue};

use super::config::{ExporterKind, TracingConfig};

const DEFAULT_GRPC_ENDPOINT: &str = "http://127.0.0.1:4317";
const DEFAULT_HTTP_ENDPOINT: &str = "http://127.0.0.1:4318";

/// Layer type attached to the process-wide `tracing` registry.
pub type OtelLayer = tracing_opentelemetry::OpenTelemetryLayer<tracing_subscriber::Registry, SdkTracer>;

/// Errors raised while building a tracer provider.
#[derive(thiserror::Error, Debug)]
pub enum TelemetryError {
    #[error("failed to build OTLP exporter: {0}")]
    Exporter(String),
}

/// Shuts a tracer provider down exactly once.
///
/// Shared between clones of a [`TracingHandle`]; the first [`TracerCloser::close`]
/// flushes and shuts down, later calls are no-ops.
#[derive(Debug)]
pub struct TracerCloser {
    scope: String,
    provider: SdkTracerProvider,
    closed: AtomicBool,
}

impl TracerCloser {
    fn new(scope: &str, provider: SdkTracerProvider) -> Self {
        Self {
            scope: scope.to_owned(),
            provider,
            closed: AtomicBool::new(false),
        }
    }

    /// Flush and shut the provider down. Returns `false` if it was already closed.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        if let Err(e) = self.provider.shutdown() {
            tracing::warn!(scope = %self.scope, error = %e, "Tracer provider shutdown failed");
        } else {
            tracing::debug!(scope = %self.scope, "Tracer provider shut down");
        }
        true
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Tracer scoped to one service plus the hook that shuts it down.
#[derive(Clone, Debug)]
pub struct TracingHandle {
    service: Arc<str>,
    tracer: SdkTracer,
    closer: Arc<TracerCloser>,
}

impl TracingHandle {
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service
    }

    /// The OpenTelemetry tracer for this service.
    #[must_use]
    pub fn tracer(&self) -> &SdkTracer {
        &self.tracer
    }

    #[must_use]
    pub fn closer(&self) -> &TracerCloser {
        &self.closer
    }
}

/// Build resource with service name and custom attributes
fn build_resource(cfg: &TracingConfig, service_name: &str) -> Resource {
    let mut attrs = vec![KeyValue::new("service.name", service_name.to_owned())];

    if let Some(resource_map) = &cfg.resource {
        for (k, v) in resource_map {
            attrs.push(KeyValue::new(k.clone(), v.clone()));
        }
    }

    Resource::builder_empty().with_attributes(attrs).build()
}

/// Build sampler from configuration
fn build_sampler(cfg: &TracingConfig) -> Sampler {
    match cfg.sampler.as_ref().and_then(|s| s.strategy.as_deref()) {
        Some("always_off") => Sampler::AlwaysOff,
        Some("always_on") => Sampler::AlwaysOn,
        Some("parentbased_ratio") => {
            let ratio = cfg.sampler.as_ref().and_then(|s| s.ratio).unwrap_or(0.1);
            Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(ratio)))
        }
        _ => Sampler::ParentBased(Box::new(Sampler::AlwaysOn)),
    }
}

fn build_exporter(cfg: &TracingConfig) -> Result<opentelemetry_otlp::SpanExporter, TelemetryError> {
    let exporter = cfg.exporter.clone().unwrap_or_default();
    let timeout = exporter.timeout_ms.map(Duration::from_millis);

    match exporter.kind {
        ExporterKind::OtlpHttp => {
            let endpoint = exporter
                .endpoint
                .unwrap_or_else(|| DEFAULT_HTTP_ENDPOINT.to_owned());
            let mut b = opentelemetry_otlp::SpanExporter::builder()
                .with_http()
                .with_protocol(Protocol::HttpBinary)
                .with_endpoint(endpoint);
            if let Some(t) = timeout {
                b = b.with_timeout(t);
            }
            if let Some(hmap) = build_headers_from_cfg_and_env(cfg) {
                b = b.with_headers(hmap);
            }
            b.build().map_err(|e| TelemetryError::Exporter(e.to_string()))
        }
        ExporterKind::OtlpGrpc => {
            let endpoint = exporter
                .endpoint
                .unwrap_or_else(|| DEFAULT_GRPC_ENDPOINT.to_owned());
            let mut b = opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .with_endpoint(endpoint);
            if let Some(t) = timeout {
                b = b.with_timeout(t);
            }
            if let Some(md) = build_metadata_from_cfg_and_env(cfg) {
                b = b.with_metadata(md);
            }
            b.build().map_err(|e| TelemetryError::Exporter(e.to_string()))
        }
    }
}

fn build_provider(cfg: &TracingConfig, service_name: &str) -> Result<SdkTracerProvider, TelemetryError> {
    let builder = SdkTracerProvider::builder()
        .with_sampler(build_sampler(cfg))
        .with_resource(build_resource(cfg, service_name));

    let builder = if cfg.enabled {
        builder.with_batch_exporter(build_exporter(cfg)?)
    } else {
        builder
    };
    Ok(builder.build())
}

/// Create the tracer for one service.
///
/// The provider always exists; it only exports when `cfg.enabled` is set.
///
/// # Errors
/// Returns [`TelemetryError`] if the OTLP exporter cannot be built.
pub fn service_tracer(cfg: &TracingConfig, service_name: &str) -> Result<TracingHandle, TelemetryError> {
    let provider = build_provider(cfg, service_name)?;
    let tracer = provider.tracer(service_name.to_owned());
    tracing::debug!(service = service_name, export = cfg.enabled, "Service tracer created");

    Ok(TracingHandle {
        service: Arc::from(service_name),
        tracer,
        closer: Arc::new(TracerCloser::new(service_name, provider)),
    })
}

/// Initialize OpenTelemetry tracing from configuration and return a layer
/// to be attached to `tracing_subscriber`, plus the closer for its provider.
///
/// Returns `None` when tracing is disabled or the exporter cannot be built
/// (the failure is reported on stderr since logging is not up yet).
#[must_use]
pub fn init_tracing(cfg: &TracingConfig, process_name: &str) -> Option<(OtelLayer, TracerCloser)> {
    if !cfg.enabled {
        return None;
    }

    // Set W3C propagator for trace-context propagation
    global::set_text_map_propagator(TraceContextPropagator::new());

    let provider = match build_provider(cfg, process_name) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("OpenTelemetry disabled: {e}");
            return None;
        }
    };

    global::set_tracer_provider(provider.clone());

    let tracer = provider.tracer(process_name.to_owned());
    let otel_layer = tracing_opentelemetry::OpenTelemetryLayer::new(tracer);

    Some((otel_layer, TracerCloser::new(process_name, provider)))
}

fn configured_headers(cfg: &TracingConfig) -> HashMap<String, String> {
    let mut out = HashMap::new();

    // From config file
    if let Some(hdrs) = cfg.exporter.as_ref().and_then(|e| e.headers.as_ref()) {
        for (k, v) in hdrs {
            out.insert(k.clone(), v.clone());
        }
    }

    // From ENV OTEL_EXPORTER_OTLP_HEADERS (format: k=v,k2=v2)
    if let Ok(env_hdrs) = std::env::var("OTEL_EXPORTER_OTLP_HEADERS") {
        for part in env_hdrs.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            if let Some((k, v)) = part.split_once('=') {
                out.insert(k.trim().to_owned(), v.trim().to_owned());
            }
        }
    }

    out
}

fn build_headers_from_cfg_and_env(cfg: &TracingConfig) -> Option<HashMap<String, String>> {
    let out = configured_headers(cfg);
    if out.is_empty() { None } else { Some(out) }
}

fn build_metadata_from_cfg_and_env(cfg: &TracingConfig) -> Option<MetadataMap> {
    let mut md = MetadataMap::new();

    for (k, v) in configured_headers(cfg) {
        match (MetadataKey::from_bytes(k.as_bytes()), MetadataValue::try_from(v.as_str())) {
            (Ok(key), Ok(val)) => {
                md.insert(key, val);
            }
            _ => tracing::warn!(header = %k, "Skipping invalid gRPC metadata header"),
        }
    }

    if md.is_empty() { None } else { Some(md) }
}
