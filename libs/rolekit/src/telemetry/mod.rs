//! Telemetry utilities for OpenTelemetry integration
//!
//! This module provides tracing configuration, the process-wide OTel layer
//! and the per-service tracer providers handed out by the provisioner.

pub mod config;
pub mod init;

pub use config::{Exporter, ExporterKind, Sampler, TracingConfig};
pub use init::{OtelLayer, TelemetryError, TracerCloser, TracingHandle, init_tracing, service_tracer};
