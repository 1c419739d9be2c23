//! In-process ledger backed by a concurrent map
//!
//! Used by tests and by embedders that do not need records to survive a
//! restart. Each record sits behind its own shard lock, so an `apply` call
//! is atomic against other writers of the same instance.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use chartbroker_common::Error;

use super::{apply_updates, InstanceRecord, Ledger, LedgerData, LedgerUpdate};

/// Ledger that keeps every record in memory
#[derive(Debug, Default)]
pub struct MemoryLedger {
    records: DashMap<String, LedgerData>,
}

impl MemoryLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of one record's raw fields, if present
    pub fn snapshot(&self, instance_id: &str) -> Option<LedgerData> {
        self.records.get(instance_id).map(|r| r.value().clone())
    }

    /// Number of instance records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if no instance has a record
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn create(&self, instance_id: &str, fields: LedgerData) -> Result<(), Error> {
        match self.records.entry(instance_id.to_string()) {
            Entry::Occupied(_) => Err(Error::conflict(instance_id)),
            Entry::Vacant(slot) => {
                slot.insert(fields);
                Ok(())
            }
        }
    }

    async fn read(&self, instance_id: &str) -> Result<InstanceRecord, Error> {
        self.records
            .get(instance_id)
            .map(|r| InstanceRecord::new(instance_id, r.value().clone()))
            .ok_or_else(|| Error::gone(instance_id))
    }

    async fn apply(&self, instance_id: &str, updates: &[LedgerUpdate]) -> Result<(), Error> {
        let mut record = self
            .records
            .get_mut(instance_id)
            .ok_or_else(|| Error::gone(instance_id))?;
        apply_updates(record.value_mut(), updates);
        Ok(())
    }

    async fn delete(&self, instance_id: &str) -> Result<(), Error> {
        self.records.remove(instance_id);
        Ok(())
    }
}
