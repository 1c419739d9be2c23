//! Boundary to the cluster resource store
//!
//! Bind discovers an instance's endpoints and secrets by label selector, and
//! provisioning tags release resources with the correlation label. Both go
//! through [`ResourceStore`] so the lifecycle can be tested without a cluster.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Secret, Service};
use kube::api::{Api, ApiResource, DynamicObject, ListParams, Patch, PatchParams};
use kube::Client;
use serde_json::json;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use chartbroker_common::{Error, FIELD_MANAGER};

/// A resource whose labels are to be replaced by a merge patch
#[derive(Debug, Clone)]
pub struct LabelTarget {
    /// How to address the resource
    pub api_resource: ApiResource,
    /// Resource name
    pub name: String,
    /// Namespace for namespaced kinds, `None` for cluster-scoped ones
    pub namespace: Option<String>,
    /// Full label set to write, existing labels included
    pub labels: BTreeMap<String, String>,
}

/// Cluster resource store consumed by the broker
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// List Services in a namespace matching a label selector
    async fn list_services(&self, namespace: &str, selector: &str) -> Result<Vec<Service>, Error>;

    /// List Secrets in a namespace matching a label selector
    async fn list_secrets(&self, namespace: &str, selector: &str) -> Result<Vec<Secret>, Error>;

    /// Merge the target's labels into the live resource
    async fn merge_labels(&self, target: &LabelTarget) -> Result<(), Error>;
}

/// Merge patch body that writes only `metadata.labels`
pub fn label_patch(labels: &BTreeMap<String, String>) -> serde_json::Value {
    json!({ "metadata": { "labels": labels } })
}

/// [`ResourceStore`] backed by the Kubernetes API
pub struct KubeResourceStore {
    client: Client,
}

impl KubeResourceStore {
    /// Create a store wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResourceStore for KubeResourceStore {
    async fn list_services(&self, namespace: &str, selector: &str) -> Result<Vec<Service>, Error> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        let list = api.list(&ListParams::default().labels(selector)).await?;
        Ok(list.items)
    }

    async fn list_secrets(&self, namespace: &str, selector: &str) -> Result<Vec<Secret>, Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let list = api.list(&ListParams::default().labels(selector)).await?;
        Ok(list.items)
    }

    async fn merge_labels(&self, target: &LabelTarget) -> Result<(), Error> {
        let api: Api<DynamicObject> = match &target.namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &target.api_resource),
            None => Api::all_with(self.client.clone(), &target.api_resource),
        };

        let patch = label_patch(&target.labels);
        api.patch(
            &target.name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await?;

        debug!(
            kind = %target.api_resource.kind,
            name = %target.name,
            namespace = ?target.namespace,
            "merged labels"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_patch_only_touches_labels() {
        let labels: BTreeMap<String, String> = [
            ("app".to_string(), "mariadb".to_string()),
            ("chartbroker.io/instance".to_string(), "inst-1".to_string()),
        ]
        .into();

        let patch = label_patch(&labels);
        assert_eq!(
            patch,
            json!({
                "metadata": {
                    "labels": {
                        "app": "mariadb",
                        "chartbroker.io/instance": "inst-1"
                    }
                }
            })
        );
    }
}
