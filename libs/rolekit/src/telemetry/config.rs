//! OpenTelemetry tracing configuration types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Tracing configuration shared by the process layer and every per-service tracer.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TracingConfig {
    /// Export spans over OTLP. When off, tracers are still created but record locally only.
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exporter: Option<Exporter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampler: Option<Sampler>,
    /// Extra resource attributes attached to every provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<HashMap<String, String>>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize, PartialEq, Eq, Copy)]
#[serde(rename_all = "snake_case")]
pub enum ExporterKind {
    #[default]
    OtlpGrpc,
    OtlpHttp,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Exporter {
    pub kind: ExporterKind,
    pub endpoint: Option<String>,
    pub headers: Option<HashMap<String, String>>,
    pub timeout_ms: Option<u64>,
}

/// Sampling strategy: `always_on`, `always_off`, `parentbased_ratio`
/// (anything else means parent-based always-on).
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Sampler {
    pub strategy: Option<String>,
    pub ratio: Option<f64>,
}
