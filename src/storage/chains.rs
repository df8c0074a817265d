//! In-memory version-chain store.

use std::collections::HashMap;
use std::sync::RwLock;

use super::traits::ChainStore;
use crate::models::{ChainId, DocumentId, VersionChain};
use crate::{Error, Result};

#[derive(Default)]
struct ChainTables {
    chains: HashMap<ChainId, VersionChain>,
    membership: HashMap<DocumentId, ChainId>,
}

/// `HashMap`-backed [`ChainStore`].
///
/// One `RwLock` covers both the chain table and the membership map so the
/// two can never disagree mid-operation.
pub struct InMemoryChainStore {
    inner: RwLock<ChainTables>,
}

impl InMemoryChainStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(ChainTables::default()),
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, ChainTables>> {
        self.inner.read().map_err(|_| Error::OperationFailed {
            operation: "chain_store_read".to_string(),
            cause: "poisoned lock".to_string(),
        })
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, ChainTables>> {
        self.inner.write().map_err(|_| Error::OperationFailed {
            operation: "chain_store_write".to_string(),
            cause: "poisoned lock".to_string(),
        })
    }
}

impl Default for InMemoryChainStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainStore for InMemoryChainStore {
    fn get(&self, chain_id: &ChainId) -> Result<Option<VersionChain>> {
        Ok(self.read()?.chains.get(chain_id).cloned())
    }

    fn chain_of(&self, id: &DocumentId) -> Result<Option<ChainId>> {
        Ok(self.read()?.membership.get(id).cloned())
    }

    fn create(&self, members: &[DocumentId]) -> Result<ChainId> {
        let mut tables = self.write()?;
        for member in members {
            if let Some(existing) = tables.membership.get(member) {
                return Err(Error::OperationFailed {
                    operation: "chain_create".to_string(),
                    cause: format!("document '{member}' already belongs to chain '{existing}'"),
                });
            }
        }
        let chain_id = ChainId::generate();
        for member in members {
            tables.membership.insert(member.clone(), chain_id.clone());
        }
        tables.chains.insert(
            chain_id.clone(),
            VersionChain::new(chain_id.clone(), members.to_vec()),
        );
        Ok(chain_id)
    }

    fn append(&self, chain_id: &ChainId, id: &DocumentId) -> Result<VersionChain> {
        let mut tables = self.write()?;
        if let Some(existing) = tables.membership.get(id) {
            return Err(Error::OperationFailed {
                operation: "chain_append".to_string(),
                cause: format!("document '{id}' already belongs to chain '{existing}'"),
            });
        }
        let Some(chain) = tables.chains.get_mut(chain_id) else {
            return Err(Error::OperationFailed {
                operation: "chain_append".to_string(),
                cause: format!("chain '{chain_id}' does not exist"),
            });
        };
        chain.member_ids.push(id.clone());
        let updated = chain.clone();
        tables.membership.insert(id.clone(), chain_id.clone());
        Ok(updated)
    }

    fn replace(&self, chain: VersionChain) -> Result<()> {
        let mut tables = self.write()?;
        // Drop stale membership entries pointing at this chain.
        tables
            .membership
            .retain(|_, owner| owner != &chain.chain_id);
        for member in &chain.member_ids {
            tables
                .membership
                .insert(member.clone(), chain.chain_id.clone());
        }
        tables.chains.insert(chain.chain_id.clone(), chain);
        Ok(())
    }

    fn remove(&self, chain_id: &ChainId) -> Result<bool> {
        let mut tables = self.write()?;
        let existed = tables.chains.remove(chain_id).is_some();
        tables.membership.retain(|_, owner| owner != chain_id);
        Ok(existed)
    }

    fn len(&self) -> Result<usize> {
        Ok(self.read()?.chains.len())
    }
}
