//! Service-instance lifecycle orchestrator
//!
//! The [`Broker`] composes the ledger, the deployment engine, the resource
//! store and the provider registry into the lifecycle operations. Each
//! lifecycle call either runs to completion before returning
//! ([`Dispatch::Completed`]) or records an in-progress state, spawns one
//! background task and hands back its key ([`Dispatch::Accepted`]).
//!
//! Background tasks are tracked so [`Broker::shutdown`] can wait for them.
//! Their results are written to the ledger, which is the only channel the
//! poll operations read.

mod bind;
mod deprovision;
mod poll;
mod provision;

use std::future::Future;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use kube::Client;
use tokio_util::task::TaskTracker;
use tracing::info;

use chartbroker_common::retry::RetryConfig;
use chartbroker_common::{
    BrokerConfig, Error, OPERATION_DESCRIPTION_KEY, OPERATION_NAME_KEY, OPERATION_STATE_KEY,
};
use chartbroker_providers::ProviderRegistry;

use crate::engine::DeploymentEngine;
use crate::ledger::{ConfigMapLedger, Ledger, LedgerUpdate};
use crate::operation::{OperationHandle, OperationOutcome, OperationState};
use crate::store::{KubeResourceStore, ResourceStore};
use crate::token::OperationKey;

pub use bind::BindRequest;
pub use provision::ProvisionRequest;

/// Lifecycle orchestrator shared by every request handler
///
/// Cloning is cheap; clones share the same collaborators, task tracker and
/// in-flight claims.
#[derive(Clone)]
pub struct Broker {
    ledger: Arc<dyn Ledger>,
    engine: Arc<dyn DeploymentEngine>,
    store: Arc<dyn ResourceStore>,
    providers: Arc<ProviderRegistry>,
    tasks: TaskTracker,
    in_flight: Arc<DashMap<String, String>>,
}

impl Broker {
    /// Create a broker from its collaborators
    pub fn new(
        ledger: Arc<dyn Ledger>,
        engine: Arc<dyn DeploymentEngine>,
        store: Arc<dyn ResourceStore>,
        providers: Arc<ProviderRegistry>,
    ) -> Self {
        Self {
            ledger,
            engine,
            store,
            providers,
            tasks: TaskTracker::new(),
            in_flight: Arc::new(DashMap::new()),
        }
    }

    /// Create a broker backed by the Kubernetes API
    ///
    /// The ledger lives in ConfigMaps in `config.namespace`, discovery and
    /// labeling go through the same client, and every built-in provider is
    /// registered.
    pub fn from_client(
        client: Client,
        engine: Arc<dyn DeploymentEngine>,
        config: &BrokerConfig,
    ) -> Self {
        let ledger = ConfigMapLedger::new(client.clone(), &config.namespace)
            .with_retry(RetryConfig::with_max_attempts(config.ledger_retries));
        Self::new(
            Arc::new(ledger),
            engine,
            Arc::new(KubeResourceStore::new(client)),
            Arc::new(ProviderRegistry::with_defaults(&config.cluster_domain)),
        )
    }

    /// The provider registry used by bind
    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Number of background operations still running
    pub fn running_operations(&self) -> usize {
        self.tasks.len()
    }

    /// Stop accepting lifecycle requests and wait for every background
    /// operation to finish
    pub async fn shutdown(&self) {
        self.tasks.close();
        info!(running = self.tasks.len(), "waiting for background operations");
        self.tasks.wait().await;
        info!("broker stopped");
    }

    fn ensure_accepting(&self) -> Result<(), Error> {
        if self.tasks.is_closed() {
            return Err(Error::internal_with_context(
                "broker",
                "broker is shutting down",
            ));
        }
        Ok(())
    }

    fn spawn<F>(&self, key: OperationKey, operation: F) -> OperationHandle
    where
        F: Future<Output = OperationOutcome> + Send + 'static,
    {
        OperationHandle::new(key, self.tasks.spawn(operation))
    }

    /// Claim an instance for one instance operation run by this process
    fn claim(&self, instance_id: &str, operation: &str) -> Result<InstanceClaim, Error> {
        match self.in_flight.entry(instance_id.to_string()) {
            Entry::Occupied(running) => Err(Error::operation_in_progress(
                instance_id,
                running.get().as_str(),
            )),
            Entry::Vacant(slot) => {
                slot.insert(operation.to_string());
                Ok(InstanceClaim {
                    in_flight: self.in_flight.clone(),
                    instance_id: instance_id.to_string(),
                })
            }
        }
    }

    /// Record the start of an asynchronous instance operation
    async fn record_started(
        &self,
        instance_id: &str,
        key: &OperationKey,
        description: String,
    ) -> Result<(), Error> {
        self.ledger
            .apply(
                instance_id,
                &[
                    LedgerUpdate::set(OPERATION_STATE_KEY, OperationState::InProgress.as_str()),
                    LedgerUpdate::set(OPERATION_NAME_KEY, key.as_str()),
                    LedgerUpdate::set(OPERATION_DESCRIPTION_KEY, description),
                ],
            )
            .await
    }

    /// Record the terminal state of an instance operation
    async fn record_finished(
        &self,
        instance_id: &str,
        state: OperationState,
        description: String,
    ) -> Result<(), Error> {
        self.ledger
            .apply(
                instance_id,
                &[
                    LedgerUpdate::set(OPERATION_STATE_KEY, state.as_str()),
                    LedgerUpdate::set(OPERATION_DESCRIPTION_KEY, description),
                ],
            )
            .await
    }
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("providers", &self.providers)
            .field("running", &self.tasks.len())
            .field("claimed", &self.in_flight.len())
            .finish()
    }
}

/// Marks an instance as busy until dropped
#[derive(Debug)]
struct InstanceClaim {
    in_flight: Arc<DashMap<String, String>>,
    instance_id: String,
}

impl Drop for InstanceClaim {
    fn drop(&mut self) {
        self.in_flight.remove(&self.instance_id);
    }
}
