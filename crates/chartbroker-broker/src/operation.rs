//! Operation state, binding records and background task handles

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use chartbroker_common::Error;
use chartbroker_providers::{Credentials, Params};

use crate::token::OperationKey;

/// State of an asynchronous operation as reported to pollers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationState {
    /// Still running
    #[serde(rename = "in progress")]
    InProgress,
    /// Finished successfully
    #[serde(rename = "succeeded")]
    Succeeded,
    /// Finished with an error
    #[serde(rename = "failed")]
    Failed,
}

impl OperationState {
    /// Wire form stored in the ledger
    pub fn as_str(self) -> &'static str {
        match self {
            OperationState::InProgress => "in progress",
            OperationState::Succeeded => "succeeded",
            OperationState::Failed => "failed",
        }
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in progress" => Ok(OperationState::InProgress),
            "succeeded" => Ok(OperationState::Succeeded),
            "failed" => Ok(OperationState::Failed),
            other => Err(Error::serialization_for_kind(
                "operation-state",
                format!("unknown operation state {:?}", other),
            )),
        }
    }
}

/// Last operation of an instance or binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastOperation {
    /// Current state
    pub state: OperationState,
    /// Human readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Key of the operation, when it ran asynchronously
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
}

impl LastOperation {
    /// Operation in a given state with a description
    pub fn new(state: OperationState, description: impl Into<String>) -> Self {
        Self {
            state,
            description: Some(description.into()),
            operation: None,
        }
    }

    /// Attach the operation key
    pub fn with_operation(mut self, key: Option<&OperationKey>) -> Self {
        self.operation = key.map(|k| k.as_str().to_string());
        self
    }
}

/// Stored result of a successful bind, returned by `get_binding`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindingResult {
    /// Credentials handed to the application
    pub credentials: Credentials,
    /// Parameters the binding was requested with
    #[serde(default)]
    pub parameters: Params,
}

/// Terminal result of a background operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    /// The operation completed
    Succeeded,
    /// The operation failed; the description is what pollers see
    Failed {
        /// Human readable failure description
        description: String,
    },
}

impl OperationOutcome {
    /// True if the operation completed
    pub fn is_success(&self) -> bool {
        matches!(self, OperationOutcome::Succeeded)
    }
}

/// Handle on a background operation spawned by the broker
///
/// Dropping the handle detaches the task; it keeps running and its result
/// stays observable through the ledger.
#[derive(Debug)]
pub struct OperationHandle {
    key: OperationKey,
    task: JoinHandle<OperationOutcome>,
}

impl OperationHandle {
    pub(crate) fn new(key: OperationKey, task: JoinHandle<OperationOutcome>) -> Self {
        Self { key, task }
    }

    /// Key returned to the caller for polling
    pub fn key(&self) -> &OperationKey {
        &self.key
    }

    /// Wait for the background task to finish
    pub async fn wait(self) -> OperationOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => OperationOutcome::Failed {
                description: format!("operation {} did not complete: {}", self.key, e),
            },
        }
    }
}

/// How the broker ran a lifecycle request
#[derive(Debug)]
pub enum Dispatch {
    /// Ran to completion before returning
    Completed,
    /// Accepted; continues in the background
    Accepted(OperationHandle),
}

impl Dispatch {
    /// Key to poll with, for accepted operations
    pub fn operation_key(&self) -> Option<&OperationKey> {
        match self {
            Dispatch::Completed => None,
            Dispatch::Accepted(handle) => Some(handle.key()),
        }
    }

    /// Wait for the operation; completed dispatches succeed immediately
    pub async fn wait(self) -> OperationOutcome {
        match self {
            Dispatch::Completed => OperationOutcome::Succeeded,
            Dispatch::Accepted(handle) => handle.wait().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::OperationKind;

    #[test]
    fn state_round_trips_through_wire_form() {
        for state in [
            OperationState::InProgress,
            OperationState::Succeeded,
            OperationState::Failed,
        ] {
            assert_eq!(state.as_str().parse::<OperationState>().unwrap(), state);
        }
        assert!("done".parse::<OperationState>().is_err());
    }

    #[test]
    fn binding_state_record_shape() {
        let key = OperationKey::from_string("bind-abc");
        let state = LastOperation::new(OperationState::Failed, "Failed to bind instance \"i\"")
            .with_operation(Some(&key));
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "state": "failed",
                "description": "Failed to bind instance \"i\"",
                "operation": "bind-abc"
            })
        );
    }

    #[test]
    fn binding_result_tolerates_missing_parameters() {
        let result: BindingResult =
            serde_json::from_str(r#"{"credentials": {"uri": "mysql://x"}}"#).unwrap();
        assert_eq!(result.credentials["uri"], "mysql://x");
        assert_eq!(result.parameters, Params::empty());
    }

    #[tokio::test]
    async fn handle_reports_task_outcome() {
        let key = OperationKey::generate(OperationKind::Provision);
        let task = tokio::spawn(async { OperationOutcome::Succeeded });
        let dispatch = Dispatch::Accepted(OperationHandle::new(key.clone(), task));

        assert_eq!(dispatch.operation_key(), Some(&key));
        assert!(dispatch.wait().await.is_success());
    }

    #[tokio::test]
    async fn aborted_task_is_a_failure() {
        let key = OperationKey::generate(OperationKind::Bind);
        let task = tokio::spawn(async {
            std::future::pending::<()>().await;
            OperationOutcome::Succeeded
        });
        task.abort();

        let outcome = OperationHandle::new(key, task).wait().await;
        assert!(!outcome.is_success());
    }

    #[tokio::test]
    async fn completed_dispatch_has_no_key() {
        let dispatch = Dispatch::Completed;
        assert!(dispatch.operation_key().is_none());
        assert!(dispatch.wait().await.is_success());
    }
}
