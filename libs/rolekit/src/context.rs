use std::sync::Arc;

use opentelemetry_sdk::trace::SdkTracer;
use rolekit_db::DbHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{BrokerConfig, GlobalConfig, ServiceDescriptor};
use crate::telemetry::TracingHandle;

/// Service execution context: the resources provisioned for one service.
///
/// Handed to both [`Service::before_run`](crate::Service::before_run) and
/// [`Service::run`](crate::Service::run). Cheap to clone.
#[derive(Clone)]
pub struct ServiceCtx {
    descriptor: Arc<ServiceDescriptor>,
    config: Arc<GlobalConfig>,
    db: Option<DbHandle>,
    tracing: TracingHandle,
    cancellation_token: CancellationToken,
}

impl ServiceCtx {
    #[must_use]
    pub fn new(
        descriptor: Arc<ServiceDescriptor>,
        config: Arc<GlobalConfig>,
        db: Option<DbHandle>,
        tracing: TracingHandle,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            descriptor,
            config,
            db,
            tracing,
            cancellation_token,
        }
    }

    #[inline]
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.descriptor.name
    }

    #[must_use]
    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    /// The whole loaded configuration, for services that read shared sections.
    #[must_use]
    pub fn config(&self) -> &GlobalConfig {
        &self.config
    }

    #[must_use]
    pub fn broker(&self) -> Option<&BrokerConfig> {
        self.config.broker.as_ref()
    }

    /// Database pool, if the descriptor declared one and it was opened.
    #[must_use]
    pub fn db_optional(&self) -> Option<&DbHandle> {
        self.db.as_ref()
    }

    /// Database pool or fail if not configured.
    ///
    /// # Errors
    /// Returns an error if the service has no database.
    pub fn db_required(&self) -> anyhow::Result<&DbHandle> {
        self.db.as_ref().ok_or_else(|| {
            anyhow::anyhow!(
                "Database is not configured for service '{}'",
                self.descriptor.name
            )
        })
    }

    #[must_use]
    pub fn tracer(&self) -> &SdkTracer {
        self.tracing.tracer()
    }

    #[must_use]
    pub fn tracing(&self) -> &TracingHandle {
        &self.tracing
    }

    /// Cancelled when the runtime shuts down or another service fails.
    #[inline]
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation_token
    }
}
