//! Provision: create the ledger record, install the chart, label its resources

use tracing::{error, info, info_span, instrument, warn, Instrument};

use chartbroker_common::{
    Error, CHART_VERSION_KEY, INSTALL_NAMESPACE_KEY, PLAN_KEY, PROVISION_PARAMS_KEY, RELEASE_KEY,
    RELEASE_NAMESPACE_KEY, SERVICE_KEY,
};
use chartbroker_providers::Params;

use super::{Broker, InstanceClaim};
use crate::labeler::label_release_resources;
use crate::ledger::{LedgerData, LedgerUpdate};
use crate::operation::{Dispatch, OperationOutcome, OperationState};
use crate::plan::chart_reference;
use crate::token::{OperationKey, OperationKind};

/// Request to provision one service instance
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    /// Caller-chosen instance identifier
    pub instance_id: String,
    /// Service (chart) to deploy
    pub service_id: String,
    /// Plan encoding the chart version
    pub plan_id: String,
    /// Namespace to install the release into
    pub namespace: String,
    /// Whether the caller accepts an asynchronous answer
    pub accepts_incomplete: bool,
    /// Values passed to the chart
    pub params: Params,
}

impl ProvisionRequest {
    /// Request with empty parameters
    pub fn new(
        instance_id: impl Into<String>,
        service_id: impl Into<String>,
        plan_id: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            service_id: service_id.into(),
            plan_id: plan_id.into(),
            namespace: namespace.into(),
            accepts_incomplete: false,
            params: Params::empty(),
        }
    }

    /// Set whether the caller accepts an asynchronous answer
    pub fn accepts_incomplete(mut self, accepts_incomplete: bool) -> Self {
        self.accepts_incomplete = accepts_incomplete;
        self
    }

    /// Set the chart values
    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }
}

fn provisioned(instance_id: &str) -> String {
    format!("service instance {:?} provisioned", instance_id)
}

impl Broker {
    /// Provision a service instance.
    ///
    /// Fails with [`Error::Conflict`] if the instance already has a ledger
    /// record. Synchronous requests return the first failure as-is;
    /// asynchronous requests return an operation key once the in-progress
    /// state is recorded and report failures through the ledger.
    #[instrument(
        skip(self, request),
        fields(
            instance = %request.instance_id,
            service = %request.service_id,
            plan = %request.plan_id,
            accepts_incomplete = request.accepts_incomplete
        )
    )]
    pub async fn provision(&self, request: ProvisionRequest) -> Result<Dispatch, Error> {
        self.ensure_accepting()?;
        let instance_id = request.instance_id.clone();

        let params = serde_json::to_string(&request.params).map_err(|e| {
            Error::serialization_for_kind(
                PROVISION_PARAMS_KEY,
                format!("could not serialize provisioning parameters: {}", e),
            )
        })?;
        let fields: LedgerData = [
            (SERVICE_KEY, request.service_id.clone()),
            (PLAN_KEY, request.plan_id.clone()),
            (PROVISION_PARAMS_KEY, params),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        self.ledger.create(&instance_id, fields).await?;

        if !request.accepts_incomplete {
            let _claim = self.claim_new_instance(&instance_id, "provision").await?;
            self.provision_release(&request).await?;
            self.record_finished(&instance_id, OperationState::Succeeded, provisioned(&instance_id))
                .await?;
            info!("provisioned instance");
            return Ok(Dispatch::Completed);
        }

        let key = OperationKey::generate(OperationKind::Provision);
        let claim = self.claim_new_instance(&instance_id, key.as_str()).await?;
        self.record_started(
            &instance_id,
            &key,
            format!("provisioning service instance {:?}", instance_id),
        )
        .await?;

        let broker = self.clone();
        let span = info_span!("provision_task", instance = %instance_id, operation = %key);
        let handle = self.spawn(
            key.clone(),
            async move {
                let _claim = claim;
                broker.finish_provision(request).await
            }
            .instrument(span),
        );

        info!(operation = %key, "accepted asynchronous provision");
        Ok(Dispatch::Accepted(handle))
    }

    /// Claim a freshly created instance, removing its record if another
    /// operation of this process still holds the identifier
    async fn claim_new_instance(
        &self,
        instance_id: &str,
        operation: &str,
    ) -> Result<InstanceClaim, Error> {
        match self.claim(instance_id, operation) {
            Ok(claim) => Ok(claim),
            Err(e) => {
                if let Err(cleanup) = self.ledger.delete(instance_id).await {
                    warn!(instance = %instance_id, error = %cleanup, "could not remove ledger record");
                }
                Err(e)
            }
        }
    }

    async fn finish_provision(&self, request: ProvisionRequest) -> OperationOutcome {
        let instance_id = request.instance_id.as_str();

        match self.provision_release(&request).await {
            Ok(()) => match self
                .record_finished(instance_id, OperationState::Succeeded, provisioned(instance_id))
                .await
            {
                Ok(()) => {
                    info!("provisioned instance");
                    OperationOutcome::Succeeded
                }
                Err(e) => {
                    error!(error = %e, "provisioned instance but could not record success");
                    OperationOutcome::Failed {
                        description: e.to_string(),
                    }
                }
            },
            Err(e) => {
                warn!(error = %e, "failed to provision instance");
                let description =
                    format!("service instance {:?} failed to provision: {}", instance_id, e);
                if let Err(status) = self
                    .record_finished(instance_id, OperationState::Failed, description.clone())
                    .await
                {
                    error!(
                        error = %e,
                        status_error = %status,
                        "could not record failed provision"
                    );
                }
                OperationOutcome::Failed { description }
            }
        }
    }

    /// Resolve and install the chart, record the release, then label it
    ///
    /// The install target is written before the engine is called and the
    /// release right after it returns, so a failure in any later step still
    /// leaves deprovision something to uninstall.
    async fn provision_release(&self, request: &ProvisionRequest) -> Result<(), Error> {
        let instance_id = request.instance_id.as_str();
        let (chart_name, version) = chart_reference(&request.service_id, &request.plan_id);

        let chart = self.engine.resolve(&chart_name, &version).await?;
        self.ledger
            .apply(
                instance_id,
                &[LedgerUpdate::set(
                    INSTALL_NAMESPACE_KEY,
                    request.namespace.as_str(),
                )],
            )
            .await?;
        info!(chart = %chart.name, version = %chart.version, namespace = %request.namespace, "installing chart");

        let release = match self
            .engine
            .install(&chart, &request.namespace, &request.params)
            .await
        {
            Ok(release) => release,
            Err(e) => {
                if let Err(status) = self
                    .ledger
                    .apply(instance_id, &[LedgerUpdate::remove(INSTALL_NAMESPACE_KEY)])
                    .await
                {
                    warn!(error = %status, "could not clear install marker");
                }
                return Err(e);
            }
        };

        self.ledger
            .apply(
                instance_id,
                &[
                    LedgerUpdate::set(RELEASE_KEY, release.name.as_str()),
                    LedgerUpdate::set(RELEASE_NAMESPACE_KEY, release.namespace.as_str()),
                    LedgerUpdate::set(CHART_VERSION_KEY, chart.version.as_str()),
                ],
            )
            .await?;
        info!(
            release = %release.name,
            release_namespace = %release.namespace,
            revision = release.version,
            "release installed"
        );

        let resources = self.engine.list_resources(&release).await?;
        label_release_resources(self.store.as_ref(), &release, &resources, instance_id).await
    }
}
