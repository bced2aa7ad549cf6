//! Service registry: the composed set of descriptor, implementation and
//! provisioned resources, keyed by service name.
//!
//! Built single-threaded during startup; read-only once the runner takes it.

use std::collections::HashMap;
use std::sync::Arc;

use rolekit_db::DbHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{ConfigStore, GlobalConfig, ServiceDescriptor};
use crate::context::ServiceCtx;
use crate::contracts::Service;
use crate::provision::{ProvisionError, ResourceProvisioner};
use crate::telemetry::TracingHandle;

#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    #[error("service '{name}' is not declared in the configuration")]
    UnknownService { name: String },
    #[error(transparent)]
    Provision(#[from] ProvisionError),
}

/// A registered service with its resources fully provisioned.
#[derive(Clone)]
pub struct ServiceInstance {
    descriptor: Arc<ServiceDescriptor>,
    service: Arc<dyn Service>,
    db: Option<DbHandle>,
    tracing: TracingHandle,
}

impl ServiceInstance {
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    #[must_use]
    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    #[must_use]
    pub fn service(&self) -> &Arc<dyn Service> {
        &self.service
    }

    #[must_use]
    pub fn db(&self) -> Option<&DbHandle> {
        self.db.as_ref()
    }

    #[must_use]
    pub fn tracing(&self) -> &TracingHandle {
        &self.tracing
    }

    /// Build the context handed to the service's lifecycle hooks.
    #[must_use]
    pub fn context(&self, config: Arc<GlobalConfig>, cancel: CancellationToken) -> ServiceCtx {
        ServiceCtx::new(
            Arc::clone(&self.descriptor),
            config,
            self.db.clone(),
            self.tracing.clone(),
            cancel,
        )
    }

    async fn release(&self) {
        self.tracing.closer().close();
        if let Some(db) = &self.db {
            db.close().await;
        }
    }
}

impl std::fmt::Debug for ServiceInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceInstance")
            .field("name", &self.descriptor.name)
            .field("db", &self.db.as_ref().map(DbHandle::redacted_dsn))
            .finish_non_exhaustive()
    }
}

pub struct ServiceRegistry {
    store: ConfigStore,
    provisioner: ResourceProvisioner,
    entries: HashMap<String, ServiceInstance>,
}

impl ServiceRegistry {
    #[must_use]
    pub fn new(store: ConfigStore, provisioner: ResourceProvisioner) -> Self {
        Self {
            store,
            provisioner,
            entries: HashMap::new(),
        }
    }

    /// Registry whose provisioner is configured from the store's own sections.
    #[must_use]
    pub fn from_store(store: ConfigStore) -> Self {
        let provisioner = ResourceProvisioner::from_config(&store.global());
        Self::new(store, provisioner)
    }

    /// Provision resources for `name` and bind them to `service`.
    ///
    /// Registering a name twice keeps the later registration; the earlier
    /// instance's resources are released.
    ///
    /// # Errors
    /// Returns [`RegistryError::UnknownService`] if `name` is not declared and
    /// [`RegistryError::Provision`] if its resources cannot be created.
    pub async fn register<S: Service>(&mut self, name: &str, service: S) -> Result<(), RegistryError> {
        self.register_arc(name, Arc::new(service)).await
    }

    /// Same as [`ServiceRegistry::register`] for an already shared implementation.
    ///
    /// # Errors
    /// See [`ServiceRegistry::register`].
    pub async fn register_arc(&mut self, name: &str, service: Arc<dyn Service>) -> Result<(), RegistryError> {
        let descriptor = self
            .store
            .lookup(name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownService {
                name: name.to_owned(),
            })?;

        let provisioned = self.provisioner.provision(&descriptor).await?;
        let instance = ServiceInstance {
            descriptor: Arc::new(descriptor),
            service,
            db: provisioned.db,
            tracing: provisioned.tracing,
        };

        tracing::info!(
            service = name,
            db = instance.db.is_some(),
            "Service registered"
        );

        if let Some(previous) = self.entries.insert(name.to_owned(), instance) {
            tracing::warn!(service = name, "Service registered twice; replacing previous registration");
            previous.release().await;
        }
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ServiceInstance> {
        self.entries.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn config(&self) -> Arc<GlobalConfig> {
        self.store.global()
    }

    #[must_use]
    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    /// Close every tracer and database pool held by the registry.
    pub async fn shutdown(&self) {
        for instance in self.entries.values() {
            instance.release().await;
        }
        tracing::info!(services = self.entries.len(), "Service resources released");
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::config::ConfigFormat;
    use tonic::service::RoutesBuilder;

    struct Noop;

    impl Service for Noop {
        fn run(&self, _ctx: &ServiceCtx, _routes: &mut RoutesBuilder) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn store() -> ConfigStore {
        ConfigStore::from_str_with(
            r#"{
                "services": [
                    {"name": "chat", "listen_port": "127.0.0.1:0"},
                    {"name": "scores", "listen_port": "127.0.0.1:0",
                     "database": "sqlite::memory:", "pool_conns": 3}
                ]
            }"#,
            ConfigFormat::Json,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn unknown_service_is_rejected() {
        let mut reg = ServiceRegistry::from_store(store());
        let err = reg.register("gateway", Noop).await.unwrap_err();
        assert!(matches!(err, RegistryError::UnknownService { ref name } if name == "gateway"));
        assert!(reg.is_empty());
    }

    #[tokio::test]
    async fn register_binds_provisioned_resources() {
        let mut reg = ServiceRegistry::from_store(store());
        reg.register("chat", Noop).await.unwrap();
        reg.register("scores", Noop).await.unwrap();

        assert_eq!(reg.names(), vec!["chat", "scores"]);
        assert!(reg.get("chat").unwrap().db().is_none());

        let scores = reg.get("scores").unwrap();
        let limits = scores.db().unwrap().limits();
        assert_eq!((limits.max_open, limits.max_idle), (3, 3));
        assert!(reg.get("missing").is_none());

        reg.shutdown().await;
        assert!(scores.tracing().closer().is_closed());
    }

    #[tokio::test]
    async fn second_registration_wins_and_releases_first() {
        let mut reg = ServiceRegistry::from_store(store());
        reg.register("scores", Noop).await.unwrap();
        let first = reg.get("scores").unwrap().clone();

        reg.register("scores", Noop).await.unwrap();
        assert_eq!(reg.len(), 1);

        assert!(first.tracing().closer().is_closed());
        assert!(first.db().unwrap().is_closed());
        let current = reg.get("scores").unwrap();
        assert!(!current.tracing().closer().is_closed());
        assert!(!current.db().unwrap().is_closed());
    }

    #[tokio::test]
    async fn context_exposes_resources() {
        let mut reg = ServiceRegistry::from_store(store());
        reg.register("chat", Noop).await.unwrap();
        let ctx = reg
            .get("chat")
            .unwrap()
            .context(reg.config(), CancellationToken::new());

        assert_eq!(ctx.service_name(), "chat");
        assert!(ctx.db_optional().is_none());
        assert!(ctx.db_required().is_err());
        assert!(!ctx.cancellation_token().is_cancelled());
    }
}
