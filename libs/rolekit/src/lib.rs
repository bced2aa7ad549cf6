#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! `RoleKit`: run several gRPC services, selected by role, inside one process.
//!
//! Startup flow:
//! 1. [`ConfigStore::load`] reads the service catalog once.
//! 2. [`ServiceRegistry::register`] provisions each service's resources
//!    (database pool, tracer) and binds them to its [`Service`] implementation.
//! 3. [`runtime::run`] resolves the [`RoleSelection`], launches one supervised
//!    task per selected service and blocks until shutdown.

pub mod bootstrap;
pub mod config;
pub mod context;
pub mod contracts;
pub mod grpc;
pub mod provision;
pub mod registry;
pub mod runtime;
pub mod telemetry;

pub use config::{BrokerConfig, ConfigError, ConfigFormat, ConfigStore, GlobalConfig, ServiceDescriptor};
pub use context::ServiceCtx;
pub use contracts::Service;
pub use grpc::{CallInfo, CallOutcome, Interceptor, InterceptorChain, LoggingInterceptor};
pub use provision::{DbFailurePolicy, ProvisionError, Provisioned, ProvisioningConfig, ResourceProvisioner};
pub use registry::{RegistryError, ServiceInstance, ServiceRegistry};
pub use runtime::{
    RoleRunner, RoleSelection, RunOptions, RuntimeError, ServiceState, ServiceStatus, ShutdownOptions, Supervisor,
};

pub use async_trait::async_trait;
pub use rolekit_db::DbHandle;
