// Built-in services compiled into this binary. A service is registered only
// when the catalog declares it; the runner then picks among the registered ones.

use std::sync::Arc;

use rolekit::{RegistryError, Service, ServiceRegistry};

use crate::services::{ChatService, LoginService};

type Constructor = fn() -> Arc<dyn Service>;

/// Services this binary can host, by catalog name.
pub const BUILTIN: [(&str, Constructor); 2] = [("chat", chat), ("login", login)];

fn chat() -> Arc<dyn Service> {
    Arc::new(ChatService::default())
}

fn login() -> Arc<dyn Service> {
    Arc::new(LoginService)
}

/// Register every built-in service declared in the catalog.
///
/// # Errors
/// Returns the first registration failure (usually a database that cannot be opened).
pub async fn register_declared(registry: &mut ServiceRegistry) -> Result<(), RegistryError> {
    for (name, construct) in BUILTIN {
        if registry.store().lookup(name).is_none() {
            tracing::debug!(service = name, "Not declared in catalog; skipping");
            continue;
        }
        registry.register_arc(name, construct()).await?;
    }

    let undeclared: Vec<&str> = registry
        .store()
        .names()
        .filter(|n| !BUILTIN.iter().any(|(builtin, _)| builtin == n))
        .collect();
    if !undeclared.is_empty() {
        tracing::warn!(services = ?undeclared, "Catalog declares services this binary does not implement");
    }
    Ok(())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use rolekit::{ConfigFormat, ConfigStore};

    #[test]
    fn builtin_names_are_unique() {
        let mut names: Vec<&str> = BUILTIN.iter().map(|(name, _)| *name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), BUILTIN.len());
    }

    #[tokio::test]
    async fn registers_every_declared_builtin() {
        let store = ConfigStore::from_str_with(
            r#"{"services": [
                {"name": "chat", "listen_port": "127.0.0.1:0"},
                {"name": "login", "listen_port": "127.0.0.1:0", "database": "sqlite::memory:"},
                {"name": "gateway", "listen_port": "127.0.0.1:0"}
            ]}"#,
            ConfigFormat::Json,
        )
        .unwrap();
        let mut registry = ServiceRegistry::from_store(store);
        register_declared(&mut registry).await.unwrap();

        let expected: Vec<&str> = BUILTIN.iter().map(|(name, _)| *name).collect();
        assert_eq!(registry.names(), expected);
        assert!(!registry.contains("gateway"));
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn skips_builtins_the_catalog_omits() {
        let store = ConfigStore::from_str_with(
            r#"{"services": [{"name": "chat", "listen_port": "127.0.0.1:0"}]}"#,
            ConfigFormat::Json,
        )
        .unwrap();
        let mut registry = ServiceRegistry::from_store(store);
        register_declared(&mut registry).await.unwrap();

        assert_eq!(registry.names(), vec!["chat"]);
        registry.shutdown().await;
    }
}
