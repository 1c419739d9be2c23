//! Mapping from service family to credential provider
//!
//! Built once at startup and shared behind an `Arc`; there is no way to
//! add or remove providers after [`ProviderRegistryBuilder::build`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::{HostBuilder, MariadbProvider, MysqlProvider, PostgresqlProvider, Provider};

/// Immutable service-id to provider mapping
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    /// Start building a registry
    pub fn builder() -> ProviderRegistryBuilder {
        ProviderRegistryBuilder::default()
    }

    /// Registry with every built-in family, resolving hosts in `cluster_domain`
    pub fn with_defaults(cluster_domain: &str) -> Self {
        let hosts = HostBuilder::new(cluster_domain);
        Self::builder()
            .register("mariadb", MariadbProvider::new(hosts.clone()))
            .register("mysql", MysqlProvider::new(hosts.clone()))
            .register("postgresql", PostgresqlProvider::new(hosts))
            .build()
    }

    /// Provider registered for a service id
    pub fn get(&self, service_id: &str) -> Option<&dyn Provider> {
        self.providers.get(service_id).map(|p| p.as_ref())
    }

    /// Whether a provider is registered for a service id
    pub fn contains(&self, service_id: &str) -> bool {
        self.providers.contains_key(service_id)
    }

    /// Registered service ids in sorted order
    pub fn service_ids(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("services", &self.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for [`ProviderRegistry`]
#[derive(Default)]
pub struct ProviderRegistryBuilder {
    providers: BTreeMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistryBuilder {
    /// Register a provider for a service id, replacing any earlier one
    pub fn register(
        mut self,
        service_id: impl Into<String>,
        provider: impl Provider + 'static,
    ) -> Self {
        self.providers.insert(service_id.into(), Arc::new(provider));
        self
    }

    /// Freeze the registry
    pub fn build(self) -> ProviderRegistry {
        ProviderRegistry {
            providers: self.providers,
        }
    }
}
