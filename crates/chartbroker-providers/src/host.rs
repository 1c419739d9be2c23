//! Hostnames for discovered Services

use k8s_openapi::api::core::v1::Service;

/// Builds in-cluster DNS names for Services
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostBuilder {
    cluster_domain: String,
}

impl HostBuilder {
    /// Create a builder for the given cluster DNS domain (e.g. `cluster.local`)
    pub fn new(cluster_domain: impl Into<String>) -> Self {
        Self {
            cluster_domain: cluster_domain.into(),
        }
    }

    /// `<name>.<namespace>.svc.<cluster-domain>`
    pub fn host_from_service(&self, service: &Service) -> String {
        format!(
            "{}.{}.svc.{}",
            service.metadata.name.as_deref().unwrap_or_default(),
            service.metadata.namespace.as_deref().unwrap_or_default(),
            self.cluster_domain
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::service;

    #[test]
    fn host_is_fully_qualified() {
        let hb = HostBuilder::new("cluster.local");
        let svc = service("inst-1-mariadb", "tenants", &[3306]);
        assert_eq!(
            hb.host_from_service(&svc),
            "inst-1-mariadb.tenants.svc.cluster.local"
        );
    }
}
