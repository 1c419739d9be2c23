//! Broker configuration
//!
//! Every field can be set by flag or environment variable so the same
//! struct serves a CLI and an in-cluster deployment.

use clap::Args;

use crate::{DEFAULT_BROKER_NAMESPACE, DEFAULT_CLUSTER_DOMAIN};

/// Runtime configuration shared by the broker components
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    /// Namespace holding one ledger ConfigMap per service instance
    #[arg(long, env = "CHARTBROKER_NAMESPACE", default_value = DEFAULT_BROKER_NAMESPACE)]
    pub namespace: String,

    /// Cluster DNS domain used to build service hostnames in credentials
    #[arg(long, env = "CHARTBROKER_CLUSTER_DOMAIN", default_value = DEFAULT_CLUSTER_DOMAIN)]
    pub cluster_domain: String,

    /// Attempts for a ledger update that loses an optimistic concurrency race
    #[arg(long, env = "CHARTBROKER_LEDGER_RETRIES", default_value_t = 5)]
    pub ledger_retries: u32,

    /// Emit JSON log lines
    #[arg(long, env = "CHARTBROKER_JSON_LOGS", default_value_t = true, action = clap::ArgAction::Set)]
    pub json_logs: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_BROKER_NAMESPACE.to_string(),
            cluster_domain: DEFAULT_CLUSTER_DOMAIN.to_string(),
            ledger_retries: 5,
            json_logs: true,
        }
    }
}
