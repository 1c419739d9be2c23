//! Ledger stored as one ConfigMap per instance in the broker namespace
//!
//! The ConfigMap is named after the instance id and its `data` is the record.
//! Updates are read-modify-replace: the replace carries the resourceVersion
//! that was read, so a concurrent writer makes the API server answer 409 and
//! the update is retried against the fresh record.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, PostParams};
use kube::Client;
use tracing::{debug, instrument};

#[cfg(test)]
use mockall::automock;

use chartbroker_common::error::is_api_status;
use chartbroker_common::retry::{retry_with_backoff_if, RetryConfig};
use chartbroker_common::{Error, FIELD_MANAGER, LABEL_MANAGED_BY, PLAN_KEY, SERVICE_KEY};

use super::{apply_updates, InstanceRecord, Ledger, LedgerData, LedgerUpdate};

/// ConfigMap operations the ledger needs, scoped to one namespace
///
/// Errors are returned unmapped so the ledger decides what each API status
/// means for a record.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ConfigMapClient: Send + Sync {
    /// Fetch a ConfigMap, including its resourceVersion
    async fn get(&self, name: &str) -> Result<ConfigMap, kube::Error>;

    /// Create a ConfigMap; 409 if it exists
    async fn create(&self, config_map: &ConfigMap) -> Result<(), kube::Error>;

    /// Replace a ConfigMap; 409 if its resourceVersion is stale
    async fn replace(&self, name: &str, config_map: &ConfigMap) -> Result<(), kube::Error>;

    /// Delete a ConfigMap; 404 if it does not exist
    async fn delete(&self, name: &str) -> Result<(), kube::Error>;
}

/// [`ConfigMapClient`] backed by the Kubernetes API
pub struct KubeConfigMapClient {
    api: Api<ConfigMap>,
}

impl KubeConfigMapClient {
    /// Client for ConfigMaps in `namespace`
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
        }
    }
}

#[async_trait]
impl ConfigMapClient for KubeConfigMapClient {
    async fn get(&self, name: &str) -> Result<ConfigMap, kube::Error> {
        self.api.get(name).await
    }

    async fn create(&self, config_map: &ConfigMap) -> Result<(), kube::Error> {
        self.api
            .create(&PostParams::default(), config_map)
            .await
            .map(|_| ())
    }

    async fn replace(&self, name: &str, config_map: &ConfigMap) -> Result<(), kube::Error> {
        self.api
            .replace(name, &PostParams::default(), config_map)
            .await
            .map(|_| ())
    }

    async fn delete(&self, name: &str) -> Result<(), kube::Error> {
        self.api
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
    }
}

/// Ledger persisted in Kubernetes ConfigMaps
pub struct ConfigMapLedger {
    client: Arc<dyn ConfigMapClient>,
    namespace: String,
    retry: RetryConfig,
}

impl ConfigMapLedger {
    /// Create a ledger writing ConfigMaps into `namespace`
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        let client = Arc::new(KubeConfigMapClient::new(client, &namespace));
        Self::with_client(client, namespace)
    }

    /// Create a ledger over any ConfigMap client for `namespace`
    pub fn with_client(client: Arc<dyn ConfigMapClient>, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            retry: RetryConfig::with_max_attempts(5),
        }
    }

    /// Override how often a lost update race is retried
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    async fn apply_once(&self, instance_id: &str, updates: &[LedgerUpdate]) -> Result<(), Error> {
        let mut config_map = match self.client.get(instance_id).await {
            Ok(cm) => cm,
            Err(e) if is_api_status(&e, 404) => return Err(Error::gone(instance_id)),
            Err(e) => return Err(e.into()),
        };

        apply_updates(config_map.data.get_or_insert_with(BTreeMap::new), updates);

        match self.client.replace(instance_id, &config_map).await {
            Ok(()) => Ok(()),
            Err(e) if is_api_status(&e, 409) => Err(Error::version_conflict(instance_id)),
            Err(e) if is_api_status(&e, 404) => Err(Error::gone(instance_id)),
            Err(e) => Err(e.into()),
        }
    }
}

/// Build the ConfigMap holding a new instance record
pub fn instance_config_map(namespace: &str, instance_id: &str, fields: LedgerData) -> ConfigMap {
    let mut labels = BTreeMap::new();
    labels.insert(LABEL_MANAGED_BY.to_string(), FIELD_MANAGER.to_string());
    for key in [SERVICE_KEY, PLAN_KEY] {
        if let Some(value) = fields.get(key) {
            labels.insert(key.to_string(), value.clone());
        }
    }

    ConfigMap {
        metadata: ObjectMeta {
            name: Some(instance_id.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        data: Some(fields),
        ..Default::default()
    }
}

#[async_trait]
impl Ledger for ConfigMapLedger {
    #[instrument(skip(self, fields), fields(namespace = %self.namespace))]
    async fn create(&self, instance_id: &str, fields: LedgerData) -> Result<(), Error> {
        let config_map = instance_config_map(&self.namespace, instance_id, fields);
        match self.client.create(&config_map).await {
            Ok(()) => {
                debug!(instance = %instance_id, "created ledger record");
                Ok(())
            }
            Err(e) if is_api_status(&e, 409) => Err(Error::conflict(instance_id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn read(&self, instance_id: &str) -> Result<InstanceRecord, Error> {
        match self.client.get(instance_id).await {
            Ok(cm) => Ok(InstanceRecord::new(instance_id, cm.data.unwrap_or_default())),
            Err(e) if is_api_status(&e, 404) => Err(Error::gone(instance_id)),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, updates), fields(namespace = %self.namespace, updates = updates.len()))]
    async fn apply(&self, instance_id: &str, updates: &[LedgerUpdate]) -> Result<(), Error> {
        retry_with_backoff_if(
            &self.retry,
            "ledger_apply",
            |e: &Error| matches!(e, Error::VersionConflict { .. }),
            || self.apply_once(instance_id, updates),
        )
        .await
    }

    #[instrument(skip(self), fields(namespace = %self.namespace))]
    async fn delete(&self, instance_id: &str) -> Result<(), Error> {
        match self.client.delete(instance_id).await {
            Ok(()) => {
                debug!(instance = %instance_id, "deleted ledger record");
                Ok(())
            }
            Err(e) if is_api_status(&e, 404) => Ok(()), // already deleted
            Err(e) => Err(e.into()),
        }
    }
}
