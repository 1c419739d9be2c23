//! Durable per-instance operation ledger
//!
//! One flat string map per service instance, keyed by instance id. It holds
//! the provisioning inputs, the release identity, the last instance
//! operation, and one result/state pair per binding. Pollers observe
//! background operations only through this record.
//!
//! Writers never replace the map wholesale: they send a list of
//! [`LedgerUpdate`]s which the implementation applies atomically against the
//! current record.

mod configmap;
mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use chartbroker_common::{
    binding_key, binding_state_key, Error, CHART_VERSION_KEY, INSTALL_NAMESPACE_KEY,
    OPERATION_DESCRIPTION_KEY, OPERATION_NAME_KEY, OPERATION_STATE_KEY, PLAN_KEY,
    PROVISION_PARAMS_KEY, RELEASE_KEY, RELEASE_NAMESPACE_KEY, SERVICE_KEY,
};
use chartbroker_providers::Params;

use crate::operation::{BindingResult, LastOperation};

pub use configmap::{instance_config_map, ConfigMapClient, ConfigMapLedger, KubeConfigMapClient};
pub use memory::MemoryLedger;

/// Raw ledger fields
pub type LedgerData = BTreeMap<String, String>;

/// One mutation of a ledger record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerUpdate {
    /// Set a field, replacing any previous value
    Set {
        /// Field name
        key: String,
        /// New value
        value: String,
    },
    /// Remove a field; removing an absent field is a no-op
    Remove {
        /// Field name
        key: String,
    },
}

impl LedgerUpdate {
    /// Set `key` to `value`
    pub fn set(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Set {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Remove `key`
    pub fn remove(key: impl Into<String>) -> Self {
        Self::Remove { key: key.into() }
    }
}

/// Apply updates in order to raw ledger data
pub fn apply_updates(data: &mut LedgerData, updates: &[LedgerUpdate]) {
    for update in updates {
        match update {
            LedgerUpdate::Set { key, value } => {
                data.insert(key.clone(), value.clone());
            }
            LedgerUpdate::Remove { key } => {
                data.remove(key);
            }
        }
    }
}

/// Release a ledger record points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseRef {
    /// Release name
    pub name: String,
    /// Release namespace
    pub namespace: String,
}

/// What a ledger record knows about the release behind an instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deployment {
    /// No install was started, or the engine rejected it
    NotInstalled,
    /// An install into `namespace` was started but no release was recorded
    Unrecorded {
        /// Namespace the install targeted
        namespace: String,
    },
    /// The release the instance was installed as
    Installed(ReleaseRef),
}

/// Snapshot of one instance's ledger record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRecord {
    instance_id: String,
    data: LedgerData,
}

impl InstanceRecord {
    /// Wrap raw ledger data read for an instance
    pub fn new(instance_id: impl Into<String>, data: LedgerData) -> Self {
        Self {
            instance_id: instance_id.into(),
            data,
        }
    }

    /// Instance identifier
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Raw field value; empty values count as unset
    pub fn get(&self, key: &str) -> Option<&str> {
        self.data
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Raw fields
    pub fn data(&self) -> &LedgerData {
        &self.data
    }

    /// Service the instance was provisioned from
    pub fn service_id(&self) -> Option<&str> {
        self.get(SERVICE_KEY)
    }

    /// Plan the instance was provisioned from
    pub fn plan_id(&self) -> Option<&str> {
        self.get(PLAN_KEY)
    }

    /// Chart version resolved when the instance was provisioned
    pub fn chart_version(&self) -> Option<&str> {
        self.get(CHART_VERSION_KEY)
    }

    /// Decoded provisioning parameters
    pub fn provision_params(&self) -> Result<Params, Error> {
        match self.get(PROVISION_PARAMS_KEY) {
            None => Ok(Params::empty()),
            Some(raw) => serde_json::from_str(raw).map_err(|e| {
                Error::serialization_for_kind(
                    PROVISION_PARAMS_KEY,
                    format!(
                        "could not decode provisioning parameters for instance {:?}: {}",
                        self.instance_id, e
                    ),
                )
            }),
        }
    }

    /// Release recorded once deployment succeeded
    pub fn release(&self) -> Option<ReleaseRef> {
        Some(ReleaseRef {
            name: self.get(RELEASE_KEY)?.to_string(),
            namespace: self.get(RELEASE_NAMESPACE_KEY)?.to_string(),
        })
    }

    /// Deployment state derived from the release and install-marker fields
    pub fn deployment(&self) -> Deployment {
        if let Some(release) = self.release() {
            return Deployment::Installed(release);
        }
        match self.get(INSTALL_NAMESPACE_KEY) {
            Some(namespace) => Deployment::Unrecorded {
                namespace: namespace.to_string(),
            },
            None => Deployment::NotInstalled,
        }
    }

    /// Key of the last asynchronous instance operation
    pub fn last_operation_key(&self) -> Option<&str> {
        self.get(OPERATION_NAME_KEY)
    }

    /// Last instance operation, if any was recorded
    pub fn last_operation(&self) -> Result<Option<LastOperation>, Error> {
        let Some(state) = self.get(OPERATION_STATE_KEY) else {
            return Ok(None);
        };
        Ok(Some(LastOperation {
            state: state.parse()?,
            description: self.get(OPERATION_DESCRIPTION_KEY).map(str::to_string),
            operation: self.last_operation_key().map(str::to_string),
        }))
    }

    /// Stored credentials and parameters of a binding
    pub fn binding_result(&self, binding_id: &str) -> Result<Option<BindingResult>, Error> {
        self.decode(&binding_key(binding_id), "binding")
    }

    /// Last operation of a binding
    pub fn binding_state(&self, binding_id: &str) -> Result<Option<LastOperation>, Error> {
        self.decode(&binding_state_key(binding_id), "binding-state")
    }

    fn decode<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
        kind: &str,
    ) -> Result<Option<T>, Error> {
        self.get(key)
            .map(|raw| {
                serde_json::from_str(raw).map_err(|e| {
                    Error::serialization_for_kind(kind, format!("could not decode {}: {}", key, e))
                })
            })
            .transpose()
    }
}

/// Storage for instance ledger records
///
/// Implementations must make `create` fail with [`Error::Conflict`] when the
/// record exists, and must apply each `apply` call atomically with respect
/// to concurrent `apply` calls on the same record.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Create the record; Conflict if it already exists
    async fn create(&self, instance_id: &str, fields: LedgerData) -> Result<(), Error>;

    /// Read the record; Gone if absent
    async fn read(&self, instance_id: &str) -> Result<InstanceRecord, Error>;

    /// Apply updates to an existing record; Gone if absent
    async fn apply(&self, instance_id: &str, updates: &[LedgerUpdate]) -> Result<(), Error>;

    /// Delete the record; deleting an absent record succeeds
    async fn delete(&self, instance_id: &str) -> Result<(), Error>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::OperationState;

    fn record(pairs: &[(&str, &str)]) -> InstanceRecord {
        InstanceRecord::new(
            "inst-1",
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn updates_apply_in_order() {
        let mut data = LedgerData::new();
        apply_updates(
            &mut data,
            &[
                LedgerUpdate::set("a", "1"),
                LedgerUpdate::set("b", "2"),
                LedgerUpdate::remove("a"),
                LedgerUpdate::remove("never-set"),
                LedgerUpdate::set("b", "3"),
            ],
        );
        assert_eq!(data.len(), 1);
        assert_eq!(data["b"], "3");
    }

    #[test]
    fn release_requires_name_and_namespace() {
        assert_eq!(record(&[(RELEASE_KEY, "r")]).release(), None);
        assert_eq!(
            record(&[(RELEASE_KEY, "r"), (RELEASE_NAMESPACE_KEY, "ns")]).release(),
            Some(ReleaseRef {
                name: "r".into(),
                namespace: "ns".into()
            })
        );
    }

    #[test]
    fn deployment_prefers_recorded_release() {
        assert_eq!(record(&[]).deployment(), Deployment::NotInstalled);
        assert_eq!(
            record(&[(INSTALL_NAMESPACE_KEY, "tenants")]).deployment(),
            Deployment::Unrecorded {
                namespace: "tenants".into()
            }
        );
        assert_eq!(
            record(&[
                (INSTALL_NAMESPACE_KEY, "tenants"),
                (RELEASE_KEY, "r"),
                (RELEASE_NAMESPACE_KEY, "tenants"),
            ])
            .deployment(),
            Deployment::Installed(ReleaseRef {
                name: "r".into(),
                namespace: "tenants".into()
            })
        );
    }

    #[test]
    fn last_operation_is_read_from_columns() {
        let rec = record(&[
            (OPERATION_NAME_KEY, "provision-abc"),
            (OPERATION_STATE_KEY, "in progress"),
            (OPERATION_DESCRIPTION_KEY, "provisioning"),
        ]);
        let op = rec.last_operation().unwrap().unwrap();
        assert_eq!(op.state, OperationState::InProgress);
        assert_eq!(op.description.as_deref(), Some("provisioning"));
        assert_eq!(op.operation.as_deref(), Some("provision-abc"));

        assert_eq!(record(&[]).last_operation().unwrap(), None);
    }

    #[test]
    fn provision_params_decode() {
        let rec = record(&[(PROVISION_PARAMS_KEY, r#"{"auth":{"database":"db"}}"#)]);
        let params = rec.provision_params().unwrap();
        assert_eq!(params.dig_str("auth.database").unwrap(), Some("db"));

        let rec = record(&[(PROVISION_PARAMS_KEY, "{not json")]);
        assert!(matches!(
            rec.provision_params(),
            Err(Error::Serialization { .. })
        ));

        assert_eq!(record(&[]).provision_params().unwrap(), Params::empty());
    }

    #[test]
    fn binding_records_are_keyed_by_binding() {
        let rec = record(&[
            ("binding-b1", r#"{"credentials":{"k":"v"},"parameters":{}}"#),
            ("binding-state-b1", r#"{"state":"succeeded"}"#),
        ]);
        let result = rec.binding_result("b1").unwrap().unwrap();
        assert_eq!(result.credentials["k"], "v");
        assert_eq!(
            rec.binding_state("b1").unwrap().unwrap().state,
            OperationState::Succeeded
        );
        assert!(rec.binding_result("b2").unwrap().is_none());
        assert!(rec.binding_state("b2").unwrap().is_none());
    }
}
