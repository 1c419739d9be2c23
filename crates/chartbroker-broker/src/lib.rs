//! Service-instance lifecycle for chart-based deployments
//!
//! This crate provides the [`Broker`], which provisions, binds, unbinds and
//! deprovisions service instances on top of a chart deployment engine, and
//! the durable per-instance ledger through which asynchronous operations are
//! polled to completion.
//!
//! Related crates:
//! - `chartbroker-common`: errors, ledger keys, configuration, telemetry
//! - `chartbroker-providers`: per-family credential providers

#![deny(missing_docs)]

pub mod broker;
pub mod engine;
pub mod labeler;
pub mod ledger;
pub mod operation;
pub mod plan;
pub mod store;
pub mod token;

pub use broker::{BindRequest, Broker, ProvisionRequest};
pub use engine::{Chart, DeploymentEngine, Release, ReleaseResource};
pub use ledger::{
    ConfigMapLedger, Deployment, InstanceRecord, Ledger, LedgerUpdate, MemoryLedger,
};
pub use operation::{
    BindingResult, Dispatch, LastOperation, OperationHandle, OperationOutcome, OperationState,
};
pub use store::{KubeResourceStore, LabelTarget, ResourceStore};
pub use token::{OperationKey, OperationKind};

// Re-export common types
pub use chartbroker_common::{BrokerConfig, Error, Result};
pub use chartbroker_providers::{Credentials, Params, Provider, ProviderRegistry};
