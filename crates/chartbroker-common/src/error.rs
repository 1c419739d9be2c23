//! Error types for the broker
//!
//! Errors are structured with fields to aid debugging in production. Each
//! variant maps onto one of the broker API failure classes via
//! [`Error::status_code`]: conflict, gone, concurrency mismatch, or internal.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Error message returned alongside a concurrency mismatch
pub const CONCURRENCY_ERROR_MESSAGE: &str = "ConcurrencyError";

/// Description returned alongside a concurrency mismatch
pub const CONCURRENCY_ERROR_DESCRIPTION: &str = "Concurrent modification not supported";

/// Main error type for broker operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// An instance with this identifier already exists
    #[error("instance {instance} already exists")]
    Conflict {
        /// Instance identifier that was provisioned twice
        instance: String,
    },

    /// A ledger record kept changing underneath an update until retries ran out
    #[error("ledger record of instance {instance} was modified concurrently")]
    VersionConflict {
        /// Instance whose record could not be updated
        instance: String,
    },

    /// The instance (or one of its bindings) has no ledger record
    #[error("{}", gone_message(.instance, .binding.as_deref()))]
    Gone {
        /// Instance identifier that was looked up
        instance: String,
        /// Binding identifier, when a binding record was looked up
        binding: Option<String>,
    },

    /// The supplied operation token does not match the recorded one
    #[error("operation {supplied} does not match the last operation of instance {instance}")]
    ConcurrencyMismatch {
        /// Instance identifier that was polled
        instance: String,
        /// Token supplied by the caller
        supplied: String,
    },

    /// Another asynchronous operation is still running against the instance
    #[error("instance {instance} has operation {operation} in progress")]
    OperationInProgress {
        /// Instance identifier
        instance: String,
        /// Token of the running operation
        operation: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// What was being (de)serialized (e.g. "provision-params")
        kind: Option<String>,
    },

    /// The requested chart version is unknown to the deployment engine
    #[error("chart {chart}@{version} not found")]
    ChartNotFound {
        /// Chart name
        chart: String,
        /// Chart version
        version: String,
    },

    /// Deployment engine failure (install, list, uninstall)
    #[error("deployment engine error during {operation}: {message}")]
    Engine {
        /// Engine operation that failed
        operation: String,
        /// Description of what failed
        message: String,
    },

    /// Bind could not find the deployed resources of an instance
    #[error("discovery error for {instance}: {message}")]
    Discovery {
        /// Instance identifier being bound
        instance: String,
        /// Description of what was missing
        message: String,
    },

    /// A credential provider rejected the discovered resources
    #[error("provider error [{service}]: {message}")]
    Provider {
        /// Service family of the provider
        service: String,
        /// Description of what failed
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "ledger", "labeler")
        context: String,
    },
}

fn gone_message(instance: &str, binding: Option<&str>) -> String {
    match binding {
        Some(binding) => format!("binding {} of instance {} is gone", binding, instance),
        None => format!("instance {} is gone", instance),
    }
}

impl Error {
    /// Create a conflict error for an instance
    pub fn conflict(instance: impl Into<String>) -> Self {
        Self::Conflict {
            instance: instance.into(),
        }
    }

    /// Create a version conflict error for an instance's ledger record
    pub fn version_conflict(instance: impl Into<String>) -> Self {
        Self::VersionConflict {
            instance: instance.into(),
        }
    }

    /// Create a gone error for an instance
    pub fn gone(instance: impl Into<String>) -> Self {
        Self::Gone {
            instance: instance.into(),
            binding: None,
        }
    }

    /// Create a gone error for a binding of an instance
    pub fn binding_gone(instance: impl Into<String>, binding: impl Into<String>) -> Self {
        Self::Gone {
            instance: instance.into(),
            binding: Some(binding.into()),
        }
    }

    /// Create a concurrency mismatch error
    pub fn concurrency_mismatch(instance: impl Into<String>, supplied: impl Into<String>) -> Self {
        Self::ConcurrencyMismatch {
            instance: instance.into(),
            supplied: supplied.into(),
        }
    }

    /// Create an operation-in-progress error
    pub fn operation_in_progress(
        instance: impl Into<String>,
        operation: impl Into<String>,
    ) -> Self {
        Self::OperationInProgress {
            instance: instance.into(),
            operation: operation.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error naming what was being processed
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create a chart-not-found error
    pub fn chart_not_found(chart: impl Into<String>, version: impl Into<String>) -> Self {
        Self::ChartNotFound {
            chart: chart.into(),
            version: version.into(),
        }
    }

    /// Create a deployment engine error
    pub fn engine(operation: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Engine {
            operation: operation.into(),
            message: msg.into(),
        }
    }

    /// Create a discovery error for an instance
    pub fn discovery(instance: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Discovery {
            instance: instance.into(),
            message: msg.into(),
        }
    }

    /// Create a provider error for a service family
    pub fn provider(service: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Provider {
            service: service.into(),
            message: msg.into(),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// HTTP status the broker API reports for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Conflict { .. } => 409,
            Error::Gone { .. } => 410,
            Error::ConcurrencyMismatch { .. } => 400,
            Error::OperationInProgress { .. } => 422,
            Error::Kube { .. }
            | Error::VersionConflict { .. }
            | Error::Serialization { .. }
            | Error::ChartNotFound { .. }
            | Error::Engine { .. }
            | Error::Discovery { .. }
            | Error::Provider { .. }
            | Error::Internal { .. } => 500,
        }
    }

    /// Check if this error is retryable
    ///
    /// Client errors (conflict, gone, mismatch) and serialization errors need a
    /// different request, not a retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => !matches!(
                source,
                kube::Error::Api(ae) if (400..500).contains(&ae.code)
            ),
            Error::Conflict { .. }
            | Error::Gone { .. }
            | Error::ConcurrencyMismatch { .. }
            | Error::Serialization { .. }
            | Error::ChartNotFound { .. } => false,
            Error::OperationInProgress { .. }
            | Error::VersionConflict { .. }
            | Error::Engine { .. }
            | Error::Discovery { .. }
            | Error::Provider { .. }
            | Error::Internal { .. } => true,
        }
    }

    /// Error code and description the broker API reports with this error
    pub fn api_error(&self) -> Option<(&'static str, &'static str)> {
        match self {
            Error::Conflict { .. } | Error::ConcurrencyMismatch { .. } => {
                Some((CONCURRENCY_ERROR_MESSAGE, CONCURRENCY_ERROR_DESCRIPTION))
            }
            _ => None,
        }
    }

    /// Get the instance identifier if this error is tied to one
    pub fn instance(&self) -> Option<&str> {
        match self {
            Error::Conflict { instance }
            | Error::VersionConflict { instance }
            | Error::Gone { instance, .. }
            | Error::ConcurrencyMismatch { instance, .. }
            | Error::OperationInProgress { instance, .. }
            | Error::Discovery { instance, .. } => Some(instance),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::serialization(e.to_string())
    }
}

/// True if a kube error is an API response with the given status code
pub fn is_api_status(err: &kube::Error, code: u16) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == code)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kube_api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: reason.to_string(),
            reason: reason.to_string(),
            code,
        })
    }

    /// Story: a duplicate provision surfaces as 409 naming the instance
    #[test]
    fn story_duplicate_provision_is_conflict() {
        let err = Error::conflict("inst-1");
        assert_eq!(err.status_code(), 409);
        assert!(err.to_string().contains("inst-1"));
        assert_eq!(err.instance(), Some("inst-1"));
        assert!(!err.is_retryable());
    }

    /// Story: a lost ledger update race is an internal failure, not a duplicate
    #[test]
    fn story_lost_update_race_is_not_conflict() {
        let err = Error::version_conflict("inst-1");
        assert_eq!(err.status_code(), 500);
        assert!(err.is_retryable());
        assert_eq!(err.api_error(), None);
        assert_eq!(err.instance(), Some("inst-1"));
        assert!(!err.to_string().contains("already exists"));
    }

    /// Story: missing instances and bindings are both reported as gone
    #[test]
    fn story_missing_records_are_gone() {
        let err = Error::gone("inst-1");
        assert_eq!(err.status_code(), 410);
        assert_eq!(err.to_string(), "instance inst-1 is gone");

        let err = Error::binding_gone("inst-1", "bind-1");
        assert_eq!(err.status_code(), 410);
        assert_eq!(err.to_string(), "binding bind-1 of instance inst-1 is gone");
    }

    /// Story: a stale token is a client error, never gone
    #[test]
    fn story_stale_token_is_bad_request() {
        let err = Error::concurrency_mismatch("inst-1", "provision-stale");
        assert_eq!(err.status_code(), 400);
        assert!(err.to_string().contains("provision-stale"));
        assert_eq!(
            err.api_error(),
            Some((CONCURRENCY_ERROR_MESSAGE, CONCURRENCY_ERROR_DESCRIPTION))
        );
        assert_eq!(Error::gone("inst-1").api_error(), None);
    }

    #[test]
    fn internal_failures_map_to_500() {
        assert_eq!(Error::engine("install", "boom").status_code(), 500);
        assert_eq!(Error::discovery("i", "no services").status_code(), 500);
        assert_eq!(Error::provider("mariadb", "no ports").status_code(), 500);
        assert_eq!(Error::serialization("bad json").status_code(), 500);
        assert_eq!(Error::chart_not_found("mariadb", "9.9.9").status_code(), 500);
        assert_eq!(Error::operation_in_progress("i", "op").status_code(), 422);
    }

    #[test]
    fn kube_client_errors_are_not_retryable() {
        let err: Error = kube_api_error(404, "NotFound").into();
        assert!(!err.is_retryable());

        let err: Error = kube_api_error(503, "ServiceUnavailable").into();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_is_api_status() {
        assert!(is_api_status(&kube_api_error(409, "AlreadyExists"), 409));
        assert!(!is_api_status(&kube_api_error(404, "NotFound"), 409));
    }

    #[test]
    fn test_internal_error_default_context() {
        let err = Error::internal("unexpected state");
        assert!(err.to_string().contains("[unknown]"));

        let err = Error::internal_with_context("ledger", "unexpected state");
        assert!(err.to_string().contains("[ledger]"));
    }

    #[test]
    fn serde_errors_convert_to_serialization() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: Error = parse.unwrap_err().into();
        assert!(matches!(err, Error::Serialization { .. }));
    }
}
