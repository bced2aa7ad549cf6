//! `RoleKit` runtime runner.
//!
//! Phase order: **launch → serve → wait for shutdown → join → release**.
//! Shutdown can be driven by OS signals, an external `CancellationToken`,
//! or an arbitrary future.

use std::sync::Arc;

use super::roles::RoleSelection;
use super::shutdown::ShutdownOptions;
use super::supervisor::RoleRunner;
use crate::grpc::InterceptorChain;
use crate::registry::ServiceRegistry;

/// Options for running the role runner.
pub struct RunOptions {
    /// Fully registered services; read-only from here on.
    pub registry: ServiceRegistry,
    pub roles: RoleSelection,
    pub interceptors: InterceptorChain,
    pub shutdown: ShutdownOptions,
}

/// Full cycle: launch selected services, block until shutdown, join, release resources.
///
/// # Errors
/// Returns the first service failure; every other service is stopped first.
pub async fn run(opts: RunOptions) -> anyhow::Result<()> {
    let instance_id = uuid::Uuid::new_v4();
    let cancel = opts.shutdown.arm();

    let registry = Arc::new(opts.registry);
    let runner = RoleRunner::new(Arc::clone(&registry)).with_interceptors(opts.interceptors);

    tracing::info!(%instance_id, roles = %opts.roles, registered = ?registry.names(), "Phase: launch");
    let supervisor = runner.launch(&opts.roles, &cancel);
    if supervisor.launched().is_empty() {
        tracing::warn!("No services selected; waiting for shutdown");
    }

    let result = supervisor.join().await;
    if result.is_ok() && !cancel.is_cancelled() {
        cancel.cancelled().await;
    }

    tracing::info!("Phase: release");
    registry.shutdown().await;

    result.map_err(Into::into)
}
