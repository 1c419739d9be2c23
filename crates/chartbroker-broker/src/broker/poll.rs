//! Reads of operation state and binding results, and unbind

use tracing::{debug, instrument};

use chartbroker_common::{binding_key, binding_state_key, Error};

use super::Broker;
use crate::ledger::LedgerUpdate;
use crate::operation::{BindingResult, LastOperation};

impl Broker {
    /// State of the last instance operation.
    ///
    /// When `operation` is given it must be the key of the last recorded
    /// operation, otherwise [`Error::ConcurrencyMismatch`] is returned. A
    /// deprovisioned instance is [`Error::Gone`].
    #[instrument(skip(self), fields(instance = %instance_id))]
    pub async fn last_operation_state(
        &self,
        instance_id: &str,
        operation: Option<&str>,
    ) -> Result<LastOperation, Error> {
        let record = self.ledger.read(instance_id).await?;

        if let Some(supplied) = operation {
            if record.last_operation_key() != Some(supplied) {
                debug!(
                    supplied = %supplied,
                    recorded = ?record.last_operation_key(),
                    "operation key mismatch"
                );
                return Err(Error::concurrency_mismatch(instance_id, supplied));
            }
        }

        record.last_operation()?.ok_or_else(|| {
            Error::internal_with_context(
                "poll",
                format!("no operation recorded for instance {}", instance_id),
            )
        })
    }

    /// State of the last operation on a binding
    #[instrument(skip(self), fields(instance = %instance_id, binding = %binding_id))]
    pub async fn last_binding_operation_state(
        &self,
        instance_id: &str,
        binding_id: &str,
    ) -> Result<LastOperation, Error> {
        self.ledger
            .read(instance_id)
            .await?
            .binding_state(binding_id)?
            .ok_or_else(|| Error::binding_gone(instance_id, binding_id))
    }

    /// Credentials and parameters stored by a successful bind
    #[instrument(skip(self), fields(instance = %instance_id, binding = %binding_id))]
    pub async fn get_binding(
        &self,
        instance_id: &str,
        binding_id: &str,
    ) -> Result<BindingResult, Error> {
        self.ledger
            .read(instance_id)
            .await?
            .binding_result(binding_id)?
            .ok_or_else(|| Error::binding_gone(instance_id, binding_id))
    }

    /// Forget a binding; unbinding an unknown binding succeeds
    #[instrument(skip(self), fields(instance = %instance_id, binding = %binding_id))]
    pub async fn unbind(&self, instance_id: &str, binding_id: &str) -> Result<(), Error> {
        self.ledger
            .apply(
                instance_id,
                &[
                    LedgerUpdate::remove(binding_state_key(binding_id)),
                    LedgerUpdate::remove(binding_key(binding_id)),
                ],
            )
            .await?;
        debug!("unbound instance");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chartbroker_common::error::CONCURRENCY_ERROR_MESSAGE;
    use chartbroker_common::{OPERATION_DESCRIPTION_KEY, OPERATION_NAME_KEY, OPERATION_STATE_KEY};

    use super::*;
    use crate::broker::fixtures::idle_broker;
    use crate::ledger::{Ledger, LedgerData, MemoryLedger};
    use crate::operation::OperationState;

    async fn ledger_with(pairs: &[(&str, &str)]) -> Arc<MemoryLedger> {
        let ledger = Arc::new(MemoryLedger::new());
        let fields: LedgerData = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ledger.create("inst-1", fields).await.unwrap();
        ledger
    }

    /// Story: a stale token is a concurrency error, never gone
    #[tokio::test]
    async fn story_stale_token_is_mismatch() {
        let ledger = ledger_with(&[
            (OPERATION_NAME_KEY, "provision-current"),
            (OPERATION_STATE_KEY, "in progress"),
        ])
        .await;
        let broker = idle_broker(ledger);

        let err = broker
            .last_operation_state("inst-1", Some("provision-stale"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConcurrencyMismatch { .. }));
        assert_eq!(err.status_code(), 400);
        assert_eq!(
            err.api_error().map(|(message, _)| message),
            Some(CONCURRENCY_ERROR_MESSAGE)
        );

        let state = broker
            .last_operation_state("inst-1", Some("provision-current"))
            .await
            .unwrap();
        assert_eq!(state.state, OperationState::InProgress);
    }

    #[tokio::test]
    async fn poll_without_token_returns_stored_state() {
        let ledger = ledger_with(&[
            (OPERATION_NAME_KEY, "provision-current"),
            (OPERATION_STATE_KEY, "failed"),
            (OPERATION_DESCRIPTION_KEY, "service instance \"inst-1\" failed to provision"),
        ])
        .await;
        let broker = idle_broker(ledger);

        let state = broker.last_operation_state("inst-1", None).await.unwrap();
        assert_eq!(state.state, OperationState::Failed);
        assert_eq!(
            state.description.as_deref(),
            Some("service instance \"inst-1\" failed to provision")
        );
    }

    #[tokio::test]
    async fn poll_of_missing_instance_is_gone() {
        let broker = idle_broker(Arc::new(MemoryLedger::new()));
        let err = broker
            .last_operation_state("inst-1", Some("provision-x"))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 410);

        let err = broker
            .last_binding_operation_state("inst-1", "bind-1")
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 410);
    }

    #[tokio::test]
    async fn poll_without_recorded_operation_is_internal() {
        let broker = idle_broker(ledger_with(&[]).await);
        let err = broker.last_operation_state("inst-1", None).await.unwrap_err();
        assert_eq!(err.status_code(), 500);
    }

    /// Story: unbind is idempotent
    #[tokio::test]
    async fn story_unbind_is_idempotent() {
        let ledger = ledger_with(&[
            ("binding-bind-1", r#"{"credentials":{},"parameters":{}}"#),
            ("binding-state-bind-1", r#"{"state":"succeeded"}"#),
            ("binding-bind-2", r#"{"credentials":{},"parameters":{}}"#),
        ])
        .await;
        let broker = idle_broker(ledger.clone());

        broker.unbind("inst-1", "bind-1").await.unwrap();
        broker.unbind("inst-1", "bind-1").await.unwrap();
        broker.unbind("inst-1", "never-bound").await.unwrap();

        let data = ledger.snapshot("inst-1").unwrap();
        assert!(!data.contains_key("binding-bind-1"));
        assert!(!data.contains_key("binding-state-bind-1"));
        assert!(data.contains_key("binding-bind-2"));

        let err = broker.get_binding("inst-1", "bind-1").await.unwrap_err();
        assert!(matches!(err, Error::Gone { binding: Some(_), .. }));
    }

    #[tokio::test]
    async fn unbind_of_missing_instance_is_gone() {
        let broker = idle_broker(Arc::new(MemoryLedger::new()));
        let err = broker.unbind("inst-1", "bind-1").await.unwrap_err();
        assert!(matches!(err, Error::Gone { .. }));
    }

    #[tokio::test]
    async fn corrupt_binding_record_is_serialization_error() {
        let broker = idle_broker(ledger_with(&[("binding-bind-1", "{")]).await);
        let err = broker.get_binding("inst-1", "bind-1").await.unwrap_err();
        assert!(matches!(err, Error::Serialization { .. }));
    }
}
