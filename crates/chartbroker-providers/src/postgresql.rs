//! PostgreSQL credentials

use k8s_openapi::api::core::v1::Service;
use tracing::debug;

use crate::relational::RelationalCredentials;
use crate::{
    primary_endpoint, secret_string, Credentials, HostBuilder, Params, Provider, ProviderError,
};

const POSTGRESQL_PROTOCOL_NAME: &str = "postgresql";
const ADMIN_POSTGRESQL_USERNAME: &str = "postgres";

/// Provider for the `postgresql` chart family
#[derive(Debug, Clone)]
pub struct PostgresqlProvider {
    hosts: HostBuilder,
}

impl PostgresqlProvider {
    /// Create a provider resolving hostnames with `hosts`
    pub fn new(hosts: HostBuilder) -> Self {
        Self { hosts }
    }
}

impl Provider for PostgresqlProvider {
    fn bind(
        &self,
        services: &[Service],
        _bind_params: &Params,
        provision_params: &Params,
        chart_secrets: &Credentials,
    ) -> Result<Credentials, ProviderError> {
        let (service, port) = primary_endpoint(services)?;
        let host = self.hosts.host_from_service(service);

        // Older chart versions use the flat postgresql* parameters
        let database = provision_params
            .dig_string_alt_or(&["auth.database", "postgresqlDatabase"], "")?;
        let user = provision_params.dig_string_alt_or(
            &["auth.username", "postgresqlUsername"],
            ADMIN_POSTGRESQL_USERNAME,
        )?;

        let password_key = if user == ADMIN_POSTGRESQL_USERNAME {
            "postgres-password"
        } else {
            "password"
        };
        // Older charts keep a single postgresql-password key for either user
        let password = secret_string(chart_secrets, password_key)
            .or_else(|_| secret_string(chart_secrets, "postgresql-password"))?;

        debug!(host = %host, port, user = %user, database = %database, "derived postgresql credentials");

        RelationalCredentials {
            protocol: POSTGRESQL_PROTOCOL_NAME,
            host: &host,
            port,
            username: &user,
            password,
            database: &database,
        }
        .into_credentials()
    }
}
