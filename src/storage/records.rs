//! In-memory document record store.

use std::collections::HashMap;
use std::sync::RwLock;

use super::traits::RecordStore;
use crate::models::{ChainId, DocumentId, DocumentRecord};
use crate::{Error, Result};

/// `HashMap`-backed [`RecordStore`].
pub struct InMemoryRecordStore {
    records: RwLock<HashMap<DocumentId, DocumentRecord>>,
}

impl InMemoryRecordStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Removes a record, simulating an external retention deletion.
    ///
    /// The engine itself never deletes records; this exists so tests can
    /// exercise the chain-repair path.
    pub fn remove(&self, id: &DocumentId) -> Result<bool> {
        let mut records = self.records.write().map_err(|_| Error::OperationFailed {
            operation: "record_remove".to_string(),
            cause: "poisoned lock".to_string(),
        })?;
        Ok(records.remove(id).is_some())
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore for InMemoryRecordStore {
    fn get(&self, id: &DocumentId) -> Result<Option<DocumentRecord>> {
        let records = self.records.read().map_err(|_| Error::OperationFailed {
            operation: "record_get".to_string(),
            cause: "poisoned lock".to_string(),
        })?;
        Ok(records.get(id).cloned())
    }

    fn put(&self, record: DocumentRecord) -> Result<()> {
        let mut records = self.records.write().map_err(|_| Error::OperationFailed {
            operation: "record_put".to_string(),
            cause: "poisoned lock".to_string(),
        })?;
        records.insert(record.id.clone(), record);
        Ok(())
    }

    fn set_chain_membership(
        &self,
        id: &DocumentId,
        chain_id: &ChainId,
        is_latest: bool,
    ) -> Result<bool> {
        let mut records = self.records.write().map_err(|_| Error::OperationFailed {
            operation: "record_set_chain".to_string(),
            cause: "poisoned lock".to_string(),
        })?;
        match records.get_mut(id) {
            Some(record) => {
                record.version_chain_id = Some(chain_id.clone());
                record.is_latest = is_latest;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn len(&self) -> Result<usize> {
        let records = self.records.read().map_err(|_| Error::OperationFailed {
            operation: "record_len".to_string(),
            cause: "poisoned lock".to_string(),
        })?;
        Ok(records.len())
    }
}
