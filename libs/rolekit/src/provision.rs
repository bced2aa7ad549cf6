//! Per-service resource provisioning.
//!
//! Turns a [`ServiceDescriptor`] into the resources the service runs with:
//! an optional database pool sized from `pool_conns` and a tracer scoped to the
//! service name. Resources are built once at registration and released by the
//! registry on shutdown.

use std::time::Duration;

use rolekit_db::{ConnectOpts, DbError, DbHandle, PoolLimits, redact_credentials_in_dsn};
use serde::{Deserialize, Serialize};

use crate::config::{GlobalConfig, ServiceDescriptor};
use crate::telemetry::{TelemetryError, TracingConfig, TracingHandle, service_tracer};

/// What to do when a service's database cannot be opened.
#[derive(Debug, Default, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DbFailurePolicy {
    /// Abort registration.
    #[default]
    FailFast,
    /// Log and register the service without a database.
    Degrade,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProvisioningConfig {
    /// Open a connection and ping at registration instead of on first use.
    pub verify_connections: bool,
    pub on_database_error: DbFailurePolicy,
    /// Bound on waiting for a pooled connection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acquire_timeout_ms: Option<u64>,
    /// Close connections idle for longer than this, down to the retained minimum.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_timeout_ms: Option<u64>,
    /// Recycle connections older than this.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_lifetime_ms: Option<u64>,
    /// Ping each connection before handing it out.
    pub test_before_acquire: bool,
}

#[derive(thiserror::Error, Debug)]
pub enum ProvisionError {
    #[error("service '{service}': failed to open database {dsn}: {source}")]
    Database {
        service: String,
        dsn: String,
        #[source]
        source: DbError,
    },
    #[error("service '{service}': failed to create tracer: {source}")]
    Tracing {
        service: String,
        #[source]
        source: TelemetryError,
    },
}

/// Resources owned by one registered service.
#[derive(Debug, Clone)]
pub struct Provisioned {
    pub db: Option<DbHandle>,
    pub tracing: TracingHandle,
}

#[derive(Debug, Clone, Default)]
pub struct ResourceProvisioner {
    tracing: TracingConfig,
    policy: ProvisioningConfig,
}

impl ResourceProvisioner {
    #[must_use]
    pub fn new(tracing: TracingConfig, policy: ProvisioningConfig) -> Self {
        Self { tracing, policy }
    }

    #[must_use]
    pub fn from_config(cfg: &GlobalConfig) -> Self {
        Self::new(cfg.tracing.clone(), cfg.provisioning.clone())
    }

    /// Pool options for `descriptor`: `pool_conns` caps both open and idle
    /// connections, `0` leaves the driver defaults in place.
    #[must_use]
    pub fn connect_opts(&self, descriptor: &ServiceDescriptor) -> ConnectOpts {
        ConnectOpts {
            limits: (descriptor.pool_conns > 0).then(|| PoolLimits::uniform(descriptor.pool_conns)),
            acquire_timeout: self.policy.acquire_timeout_ms.map(Duration::from_millis),
            idle_timeout: self.policy.idle_timeout_ms.map(Duration::from_millis),
            max_lifetime: self.policy.max_lifetime_ms.map(Duration::from_millis),
            test_before_acquire: self.policy.test_before_acquire,
        }
    }

    /// Build the resources for one service.
    ///
    /// # Errors
    /// Returns [`ProvisionError::Database`] when the DSN is rejected (or the
    /// eager ping fails) under the fail-fast policy, and
    /// [`ProvisionError::Tracing`] when the tracer cannot be built.
    pub async fn provision(&self, descriptor: &ServiceDescriptor) -> Result<Provisioned, ProvisionError> {
        let db = match descriptor.database_dsn() {
            Some(dsn) => self.open_database(descriptor, dsn).await?,
            None => None,
        };

        let tracing = match service_tracer(&self.tracing, &descriptor.name) {
            Ok(t) => t,
            Err(source) => {
                if let Some(db) = &db {
                    db.close().await;
                }
                return Err(ProvisionError::Tracing {
                    service: descriptor.name.clone(),
                    source,
                });
            }
        };

        Ok(Provisioned { db, tracing })
    }

    async fn open_database(
        &self,
        descriptor: &ServiceDescriptor,
        dsn: &str,
    ) -> Result<Option<DbHandle>, ProvisionError> {
        let opts = self.connect_opts(descriptor);
        let opened = match DbHandle::connect_lazy(dsn, &opts) {
            Ok(db) if self.policy.verify_connections => match db.ping().await {
                Ok(()) => Ok(db),
                Err(e) => {
                    db.close().await;
                    Err(e)
                }
            },
            other => other,
        };

        match opened {
            Ok(db) => {
                tracing::info!(
                    service = %descriptor.name,
                    engine = ?db.engine(),
                    dsn = %db.redacted_dsn(),
                    pool_conns = descriptor.pool_conns,
                    "Database pool ready"
                );
                Ok(Some(db))
            }
            Err(source) => match self.policy.on_database_error {
                DbFailurePolicy::FailFast => Err(ProvisionError::Database {
                    service: descriptor.name.clone(),
                    dsn: redact_credentials_in_dsn(Some(dsn)),
                    source,
                }),
                DbFailurePolicy::Degrade => {
                    tracing::warn!(
                        service = %descriptor.name,
                        dsn = %redact_credentials_in_dsn(Some(dsn)),
                        error = %source,
                        "Database unavailable; continuing without it"
                    );
                    Ok(None)
                }
            },
        }
    }
}
