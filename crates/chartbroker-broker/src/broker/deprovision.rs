//! Deprovision: uninstall the recorded release, then forget the instance

use tracing::{error, info, info_span, instrument, warn, Instrument};

use chartbroker_common::Error;

use super::Broker;
use crate::ledger::Deployment;
use crate::operation::{Dispatch, OperationOutcome, OperationState};
use crate::token::{OperationKey, OperationKind};

impl Broker {
    /// Deprovision a service instance.
    ///
    /// Fails with [`Error::Gone`] if the instance has no ledger record and
    /// with [`Error::OperationInProgress`] while this broker is still running
    /// another instance operation on it. The record is deleted only after the
    /// release was uninstalled; a failed uninstall leaves it in place with a
    /// failed state so the request can be retried. An install that started
    /// without recording its release is never forgotten silently: the
    /// record is kept and the deprovision fails.
    #[instrument(skip(self), fields(instance = %instance_id))]
    pub async fn deprovision(
        &self,
        instance_id: &str,
        accepts_incomplete: bool,
    ) -> Result<Dispatch, Error> {
        self.ensure_accepting()?;

        let record = self.ledger.read(instance_id).await?;
        let deployment = record.deployment();

        if !accepts_incomplete {
            let _claim = self.claim(instance_id, "deprovision")?;
            self.teardown(instance_id, &deployment).await?;
            info!("deprovisioned instance");
            return Ok(Dispatch::Completed);
        }

        let key = OperationKey::generate(OperationKind::Deprovision);
        let claim = self.claim(instance_id, key.as_str())?;
        self.record_started(
            instance_id,
            &key,
            format!("deprovisioning service instance {:?}", instance_id),
        )
        .await?;

        let broker = self.clone();
        let instance = instance_id.to_string();
        let span = info_span!("deprovision_task", instance = %instance_id, operation = %key);
        let handle = self.spawn(
            key.clone(),
            async move {
                let _claim = claim;
                broker.finish_deprovision(&instance, deployment).await
            }
            .instrument(span),
        );

        info!(operation = %key, "accepted asynchronous deprovision");
        Ok(Dispatch::Accepted(handle))
    }

    async fn finish_deprovision(
        &self,
        instance_id: &str,
        deployment: Deployment,
    ) -> OperationOutcome {
        match self.teardown(instance_id, &deployment).await {
            Ok(()) => {
                info!("deprovisioned instance");
                OperationOutcome::Succeeded
            }
            Err(e) => {
                warn!(error = %e, "failed to deprovision instance");
                let description =
                    format!("service instance {:?} failed to deprovision: {}", instance_id, e);
                if let Err(status) = self
                    .record_finished(instance_id, OperationState::Failed, description.clone())
                    .await
                {
                    error!(
                        error = %e,
                        status_error = %status,
                        "could not record failed deprovision"
                    );
                }
                OperationOutcome::Failed { description }
            }
        }
    }

    /// Uninstall the release, if one exists, then delete the record
    async fn teardown(&self, instance_id: &str, deployment: &Deployment) -> Result<(), Error> {
        match deployment {
            Deployment::Installed(release) => {
                self.engine
                    .uninstall(&release.name, &release.namespace)
                    .await?;
                info!(release = %release.name, namespace = %release.namespace, "release uninstalled");
            }
            Deployment::Unrecorded { namespace } => {
                return Err(Error::internal_with_context(
                    "deprovision",
                    format!(
                        "install of instance {:?} into namespace {:?} started but its release was never recorded",
                        instance_id, namespace
                    ),
                ));
            }
            Deployment::NotInstalled => warn!("nothing was installed; removing ledger record only"),
        }
        self.ledger.delete(instance_id).await
    }
}
