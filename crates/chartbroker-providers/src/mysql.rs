//! MySQL credentials

use k8s_openapi::api::core::v1::Service;
use tracing::debug;

use crate::relational::RelationalCredentials;
use crate::{
    primary_endpoint, secret_string, Credentials, HostBuilder, Params, Provider, ProviderError,
};

const MYSQL_PROTOCOL_NAME: &str = "mysql";
const ROOT_MYSQL_USERNAME: &str = "root";

/// Provider for the `mysql` chart family
#[derive(Debug, Clone)]
pub struct MysqlProvider {
    hosts: HostBuilder,
}

impl MysqlProvider {
    /// Create a provider resolving hostnames with `hosts`
    pub fn new(hosts: HostBuilder) -> Self {
        Self { hosts }
    }
}

impl Provider for MysqlProvider {
    fn bind(
        &self,
        services: &[Service],
        _bind_params: &Params,
        provision_params: &Params,
        chart_secrets: &Credentials,
    ) -> Result<Credentials, ProviderError> {
        let (service, port) = primary_endpoint(services)?;
        let host = self.hosts.host_from_service(service);

        let database = provision_params.dig_string_alt_or(&["auth.database", "db.name"], "")?;
        let user =
            provision_params.dig_string_alt_or(&["auth.username", "db.user"], ROOT_MYSQL_USERNAME)?;

        let password_key = if user == ROOT_MYSQL_USERNAME {
            "mysql-root-password"
        } else {
            "mysql-password"
        };
        let password = secret_string(chart_secrets, password_key)?;

        debug!(host = %host, port, user = %user, database = %database, "derived mysql credentials");

        RelationalCredentials {
            protocol: MYSQL_PROTOCOL_NAME,
            host: &host,
            port,
            username: &user,
            password,
            database: &database,
        }
        .into_credentials()
    }
}
