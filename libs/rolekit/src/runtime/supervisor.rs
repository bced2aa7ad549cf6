//! Launches selected services as supervised tasks.
//!
//! One task per service runs `before_run → listen → run → serve`. The
//! supervisor owns every task; the first failure cancels the shared token so
//! the remaining servers drain and stop.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;
use tonic::service::RoutesBuilder;
use tracing::Instrument;

use super::roles::RoleSelection;
use super::state::{ServiceState, ServiceStatus};
use crate::config::GlobalConfig;
use crate::grpc::{self, GrpcError, InterceptorChain};
use crate::registry::{ServiceInstance, ServiceRegistry};

#[derive(thiserror::Error, Debug)]
pub enum RuntimeError {
    #[error("service '{service}': before_run failed: {source}")]
    BeforeRun {
        service: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("service '{service}': failed to attach handlers: {source}")]
    Attach {
        service: String,
        #[source]
        source: anyhow::Error,
    },
    #[error(transparent)]
    Grpc(#[from] GrpcError),
    #[error("service '{service}' panicked")]
    Panicked { service: String },
    #[error("service '{service}' task was cancelled")]
    Aborted { service: String },
}

impl RuntimeError {
    /// Name of the service that failed.
    #[must_use]
    pub fn service(&self) -> &str {
        match self {
            Self::BeforeRun { service, .. }
            | Self::Attach { service, .. }
            | Self::Panicked { service }
            | Self::Aborted { service }
            | Self::Grpc(GrpcError::Bind { service, .. } | GrpcError::Serve { service, .. }) => service,
        }
    }
}

type StatusTx = Arc<watch::Sender<ServiceStatus>>;

/// Launches services out of a registry.
#[derive(Clone)]
pub struct RoleRunner {
    registry: Arc<ServiceRegistry>,
    chain: InterceptorChain,
}

impl RoleRunner {
    /// Runner with the default interceptor chain.
    #[must_use]
    pub fn new(registry: Arc<ServiceRegistry>) -> Self {
        Self {
            registry,
            chain: InterceptorChain::with_defaults(),
        }
    }

    #[must_use]
    pub fn with_interceptors(mut self, chain: InterceptorChain) -> Self {
        self.chain = chain;
        self
    }

    /// Spawn one task per selected service. Must be called inside a Tokio runtime.
    ///
    /// Unknown role names are logged and reported by [`Supervisor::unknown_roles`];
    /// they do not affect the other services.
    #[must_use]
    pub fn launch(&self, selection: &RoleSelection, cancel: &CancellationToken) -> Supervisor {
        let (launched, unknown) = selection.resolve(&self.registry);
        for role in &unknown {
            tracing::warn!(role = %role, "Unknown role; no service registered under this name");
        }

        let mut senders: HashMap<String, StatusTx> = HashMap::new();
        let mut statuses = HashMap::new();
        for name in self.registry.names() {
            let (tx, rx) = watch::channel(ServiceStatus::default());
            senders.insert(name.to_owned(), Arc::new(tx));
            statuses.insert(name.to_owned(), rx);
        }

        let config = self.registry.config();
        let mut tasks = JoinSet::new();
        for name in &launched {
            let (Some(instance), Some(status)) = (self.registry.get(name), senders.remove(name)) else {
                continue;
            };
            tasks.spawn(supervise(
                instance.clone(),
                Arc::clone(&config),
                self.chain.clone(),
                cancel.child_token(),
                status,
            ));
        }

        tracing::info!(
            selection = %selection,
            launched = ?launched,
            "Services launched"
        );

        Supervisor {
            tasks,
            statuses,
            launched,
            unknown,
            cancel: cancel.clone(),
        }
    }
}

/// Owns the running service tasks. Dropping it aborts every service.
pub struct Supervisor {
    tasks: JoinSet<(String, Result<(), RuntimeError>)>,
    statuses: HashMap<String, watch::Receiver<ServiceStatus>>,
    launched: Vec<String>,
    unknown: Vec<String>,
    cancel: CancellationToken,
}

impl Supervisor {
    /// Services that were started, in selection order.
    #[must_use]
    pub fn launched(&self) -> &[String] {
        &self.launched
    }

    #[must_use]
    pub fn unknown_roles(&self) -> &[String] {
        &self.unknown
    }

    /// Current status of a registered service.
    #[must_use]
    pub fn status(&self, name: &str) -> Option<ServiceStatus> {
        self.statuses.get(name).map(|rx| *rx.borrow())
    }

    /// Wait until `name`'s status satisfies `pred`.
    ///
    /// Returns `None` for unknown names or when the service can no longer
    /// change state without ever matching.
    pub async fn wait_for<F>(&self, name: &str, pred: F) -> Option<ServiceStatus>
    where
        F: FnMut(&ServiceStatus) -> bool,
    {
        let mut rx = self.statuses.get(name)?.clone();
        rx.wait_for(pred).await.ok().map(|status| *status)
    }

    /// Wait for every service task to finish.
    ///
    /// The first failure cancels the remaining services.
    ///
    /// # Errors
    /// Returns the first [`RuntimeError`] reported by a service.
    pub async fn join(mut self) -> Result<(), RuntimeError> {
        let mut first_error = None;
        while let Some(joined) = self.tasks.join_next().await {
            let (name, result) = match joined {
                Ok(v) => v,
                Err(e) => {
                    tracing::error!(error = %e, "Supervisor task ended abnormally");
                    continue;
                }
            };

            match result {
                Ok(()) => tracing::info!(service = %name, "Service stopped"),
                Err(e) => {
                    tracing::error!(service = %name, error = %e, "Service failed; stopping remaining services");
                    self.cancel.cancel();
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

/// Run one service on its own task and turn panics into errors.
async fn supervise(
    instance: ServiceInstance,
    config: Arc<GlobalConfig>,
    chain: InterceptorChain,
    cancel: CancellationToken,
    status: StatusTx,
) -> (String, Result<(), RuntimeError>) {
    let name = instance.name().to_owned();
    let span = tracing::info_span!("service", name = %name);
    // Dropping the supervisor aborts this task, and with it the service task.
    let handle = AbortOnDropHandle::new(tokio::spawn(
        run_service(instance, config, chain, cancel, Arc::clone(&status)).instrument(span),
    ));

    let result = match handle.await {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(RuntimeError::Panicked {
            service: name.clone(),
        }),
        Err(_) => Err(RuntimeError::Aborted {
            service: name.clone(),
        }),
    };

    let end = if result.is_ok() {
        ServiceState::Terminated
    } else {
        ServiceState::Fatal
    };
    status.send_modify(|s| s.state = end);
    (name, result)
}

async fn run_service(
    instance: ServiceInstance,
    config: Arc<GlobalConfig>,
    chain: InterceptorChain,
    cancel: CancellationToken,
    status: StatusTx,
) -> Result<(), RuntimeError> {
    let ctx = instance.context(config, cancel);
    let service = Arc::clone(instance.service());

    status.send_modify(|s| s.state = ServiceState::BeforeRun);
    tracing::debug!("Phase: before_run");
    service
        .before_run(&ctx)
        .await
        .map_err(|source| RuntimeError::BeforeRun {
            service: ctx.service_name().to_owned(),
            source,
        })?;

    let (server, listener) = grpc::listen(instance.descriptor(), &chain).await?;
    let local_addr = listener.local_addr().ok();
    status.send_modify(|s| {
        s.state = ServiceState::Listening;
        s.local_addr = local_addr;
    });

    let mut routes = RoutesBuilder::default();
    service
        .run(&ctx, &mut routes)
        .map_err(|source| RuntimeError::Attach {
            service: ctx.service_name().to_owned(),
            source,
        })?;

    status.send_modify(|s| s.state = ServiceState::Serving);
    server
        .serve(routes, listener, ctx.cancellation_token().clone())
        .await?;
    Ok(())
}
