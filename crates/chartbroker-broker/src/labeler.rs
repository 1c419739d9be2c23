//! Tag release resources with the instance correlation label

use tracing::{debug, instrument};

use chartbroker_common::{Error, INSTANCE_LABEL};

use crate::engine::{Release, ReleaseResource};
use crate::store::{LabelTarget, ResourceStore};

/// Build the label patch target for one release resource.
///
/// Returns `None` for anything that is not a single named object (lists,
/// anonymous manifests); those are skipped rather than failed.
pub fn label_target(
    resource: &ReleaseResource,
    release: &Release,
    instance_id: &str,
) -> Option<LabelTarget> {
    if resource.api_resource.kind.ends_with("List") {
        return None;
    }
    let name = resource.object.metadata.name.clone()?;

    let mut labels = resource.object.metadata.labels.clone().unwrap_or_default();
    labels.insert(INSTANCE_LABEL.to_string(), instance_id.to_string());

    let namespace = resource.namespaced.then(|| {
        resource
            .object
            .metadata
            .namespace
            .clone()
            .filter(|ns| !ns.is_empty())
            .unwrap_or_else(|| release.namespace.clone())
    });

    Some(LabelTarget {
        api_resource: resource.api_resource.clone(),
        name,
        namespace,
        labels,
    })
}

/// Merge the correlation label into every labelable resource of a release
#[instrument(skip(store, release, resources), fields(release = %release.name, resources = resources.len()))]
pub async fn label_release_resources(
    store: &dyn ResourceStore,
    release: &Release,
    resources: &[ReleaseResource],
    instance_id: &str,
) -> Result<(), Error> {
    for resource in resources {
        let Some(target) = label_target(resource, release, instance_id) else {
            debug!(kind = %resource.api_resource.kind, "skipping unlabelable resource");
            continue;
        };

        store.merge_labels(&target).await.map_err(|e| {
            Error::internal_with_context(
                "labeler",
                format!(
                    "failed to label {} with {} = {}: {}",
                    resource.display_name(),
                    INSTANCE_LABEL,
                    instance_id,
                    e
                ),
            )
        })?;
    }
    Ok(())
}
