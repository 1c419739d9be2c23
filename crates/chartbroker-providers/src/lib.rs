//! Credential providers for chartbroker bindings
//!
//! A [`Provider`] turns the generic resources discovered for an instance (its
//! Services and the flattened key/values of its Secrets) into the credential
//! shape a particular service family expects. Providers are stateless and
//! pure: everything they need arrives as arguments.
//!
//! The [`ProviderRegistry`] is built once at startup and shared read-only.

#![deny(missing_docs)]

pub mod host;
pub mod mariadb;
pub mod mysql;
pub mod params;
pub mod postgresql;
pub mod registry;
mod relational;

use k8s_openapi::api::core::v1::Service;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

pub use host::HostBuilder;
pub use mariadb::MariadbProvider;
pub use mysql::MysqlProvider;
pub use params::{ParamError, Params};
pub use postgresql::PostgresqlProvider;
pub use registry::{ProviderRegistry, ProviderRegistryBuilder};

/// Credential object handed back to binding callers
pub type Credentials = serde_json::Map<String, serde_json::Value>;

/// Errors raised while deriving credentials
#[derive(Debug, Error)]
pub enum ProviderError {
    /// No Service was discovered for the instance
    #[error("no services found")]
    NoServices,

    /// The Service used as endpoint exposes no ports
    #[error("no ports found on service {service}")]
    NoPorts {
        /// Name of the Service
        service: String,
    },

    /// The chart secrets do not hold the expected key
    #[error("failed to get password: secret key {key} not found")]
    MissingSecret {
        /// Secret key that was looked up
        key: String,
    },

    /// A provisioning or binding parameter had an unusable value
    #[error(transparent)]
    Param(#[from] ParamError),

    /// The connection URI could not be assembled
    #[error("failed to build connection uri: {0}")]
    Uri(String),
}

/// Derives service-specific credential fields for one service family
#[cfg_attr(test, automock)]
pub trait Provider: Send + Sync {
    /// Derive credentials for a binding.
    ///
    /// # Arguments
    ///
    /// * `services` - Services labelled with the instance's correlation label
    /// * `bind_params` - Parameters supplied with the bind request
    /// * `provision_params` - Parameters the instance was provisioned with
    /// * `chart_secrets` - Key/values flattened from the instance's Secrets
    ///
    /// The returned fields are merged over `chart_secrets`; on a key collision
    /// the provider's value wins.
    fn bind(
        &self,
        services: &[Service],
        bind_params: &Params,
        provision_params: &Params,
        chart_secrets: &Credentials,
    ) -> Result<Credentials, ProviderError>;
}

/// Look up a string value in the flattened chart secrets
pub(crate) fn secret_string<'a>(
    chart_secrets: &'a Credentials,
    key: &str,
) -> Result<&'a str, ProviderError> {
    chart_secrets
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ProviderError::MissingSecret {
            key: key.to_string(),
        })
}

/// First Service and its first port, the endpoint every relational family uses
pub(crate) fn primary_endpoint(services: &[Service]) -> Result<(&Service, i32), ProviderError> {
    let service = services.first().ok_or(ProviderError::NoServices)?;
    let port = service
        .spec
        .as_ref()
        .and_then(|spec| spec.ports.as_ref())
        .and_then(|ports| ports.first())
        .map(|p| p.port)
        .ok_or_else(|| ProviderError::NoPorts {
            service: service.metadata.name.clone().unwrap_or_default(),
        })?;
    Ok((service, port))
}
