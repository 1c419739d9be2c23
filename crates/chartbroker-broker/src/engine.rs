//! Boundary to the chart deployment engine
//!
//! The broker never renders or applies manifests itself. It asks the engine
//! to resolve a chart, install it, enumerate what the install created, and
//! eventually uninstall it.

use async_trait::async_trait;
use kube::api::{ApiResource, DynamicObject};

#[cfg(test)]
use mockall::automock;

use chartbroker_common::Error;
use chartbroker_providers::Params;

/// A resolved chart definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chart {
    /// Chart name
    pub name: String,
    /// Exact chart version
    pub version: String,
    /// Application version the chart declares, if any
    pub app_version: Option<String>,
}

/// One installed deployment, owned by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    /// Release name chosen by the engine
    pub name: String,
    /// Namespace the release was installed into
    pub namespace: String,
    /// Release revision
    pub version: u32,
}

/// A resource created by a release
#[derive(Debug, Clone)]
pub struct ReleaseResource {
    /// The object as rendered by the engine
    pub object: DynamicObject,
    /// Group/version/kind/plural needed to address the object
    pub api_resource: ApiResource,
    /// Whether the resource kind is namespace scoped
    pub namespaced: bool,
}

impl ReleaseResource {
    /// `kind/name` for log and error messages
    pub fn display_name(&self) -> String {
        format!(
            "{}/{}",
            self.api_resource.kind,
            self.object.metadata.name.as_deref().unwrap_or_default()
        )
    }
}

/// Chart deployment engine consumed by the broker
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DeploymentEngine: Send + Sync {
    /// Look up a chart by name and exact version; [`Error::ChartNotFound`] if unknown
    async fn resolve(&self, chart: &str, version: &str) -> Result<Chart, Error>;

    /// Install a chart into a namespace with the given values
    async fn install(&self, chart: &Chart, namespace: &str, params: &Params)
        -> Result<Release, Error>;

    /// Enumerate the resources a release created, in install order
    async fn list_resources(&self, release: &Release) -> Result<Vec<ReleaseResource>, Error>;

    /// Uninstall a release
    async fn uninstall(&self, release: &str, namespace: &str) -> Result<(), Error>;
}
