//! Common types for chartbroker: errors, ledger keys, retry and telemetry

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod retry;
pub mod telemetry;

pub use config::BrokerConfig;
pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Default namespace holding the instance ledger ConfigMaps
pub const DEFAULT_BROKER_NAMESPACE: &str = "chartbroker";

/// Default cluster DNS domain used to build service hostnames
pub const DEFAULT_CLUSTER_DOMAIN: &str = "cluster.local";

/// Field manager / managed-by value for resources written by the broker
pub const FIELD_MANAGER: &str = "chartbroker";

// =============================================================================
// Labels
// =============================================================================

/// Correlation label put on every resource a release created for an instance
pub const INSTANCE_LABEL: &str = "chartbroker.io/instance";

/// Standard Kubernetes managed-by label
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Build the label selector matching every resource of an instance
pub fn instance_selector(instance_id: &str) -> String {
    format!("{}={}", INSTANCE_LABEL, instance_id)
}

// =============================================================================
// Ledger record keys
// =============================================================================

/// Service identifier the instance was provisioned from
pub const SERVICE_KEY: &str = "service-id";
/// Plan identifier the instance was provisioned from
pub const PLAN_KEY: &str = "plan-id";
/// JSON-encoded provisioning parameters
pub const PROVISION_PARAMS_KEY: &str = "provision-params";
/// Release name assigned by the deployment engine
pub const RELEASE_KEY: &str = "release";
/// Namespace the release was installed into
pub const RELEASE_NAMESPACE_KEY: &str = "release-namespace";
/// Exact chart version resolved at provision time
pub const CHART_VERSION_KEY: &str = "chart-version";
/// Namespace of an install that was started but whose release is not recorded yet
pub const INSTALL_NAMESPACE_KEY: &str = "install-namespace";

/// Token of the last asynchronous instance operation
pub const OPERATION_NAME_KEY: &str = "last-operation-name";
/// State of the last instance operation
pub const OPERATION_STATE_KEY: &str = "last-operation-state";
/// Human readable description of the last instance operation
pub const OPERATION_DESCRIPTION_KEY: &str = "last-operation-description";

/// Prefix of the key holding a binding's credentials and parameters
pub const BINDING_KEY_PREFIX: &str = "binding-";
/// Prefix of the key holding a binding's last operation state
pub const BINDING_STATE_KEY_PREFIX: &str = "binding-state-";

/// Ledger key of the result record for a binding
pub fn binding_key(binding_id: &str) -> String {
    format!("{}{}", BINDING_KEY_PREFIX, binding_id)
}

/// Ledger key of the operation state record for a binding
pub fn binding_state_key(binding_id: &str) -> String {
    format!("{}{}", BINDING_STATE_KEY_PREFIX, binding_id)
}
