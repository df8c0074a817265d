//! Version chains and chain-update outcomes.

use serde::{Deserialize, Serialize};

use super::document::{ChainId, DocumentId};

/// An ordered set of document records believed to represent successive
/// versions of the same underlying document.
///
/// Member order is insertion order, which is temporal order; the latest
/// version is the last member. Chains never close: they remain open for
/// future near/semantic matches indefinitely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionChain {
    /// Unique chain identifier.
    pub chain_id: ChainId,
    /// Member document ids, oldest first.
    pub member_ids: Vec<DocumentId>,
}

impl VersionChain {
    /// Creates a chain with the given members.
    #[must_use]
    pub const fn new(chain_id: ChainId, member_ids: Vec<DocumentId>) -> Self {
        Self {
            chain_id,
            member_ids,
        }
    }

    /// Returns the latest member, if the chain is non-empty.
    #[must_use]
    pub fn latest(&self) -> Option<&DocumentId> {
        self.member_ids.last()
    }

    /// Returns true if `id` is a member.
    #[must_use]
    pub fn contains(&self, id: &DocumentId) -> bool {
        self.member_ids.iter().any(|m| m == id)
    }

    /// Returns the member's position, oldest = 0.
    #[must_use]
    pub fn position(&self, id: &DocumentId) -> Option<usize> {
        self.member_ids.iter().position(|m| m == id)
    }

    /// Returns the number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.member_ids.len()
    }

    /// Returns true if the chain has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.member_ids.is_empty()
    }
}

/// What a chain update did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChainUpdate {
    /// No chain mutation occurred (exact, unique, or unknown results).
    NoChange,
    /// A new chain was created linking the original and the new document.
    Created {
        /// The new chain.
        chain_id: ChainId,
        /// Members at creation, oldest first.
        members: Vec<DocumentId>,
    },
    /// The new document was appended to an existing chain.
    Appended {
        /// The chain appended to.
        chain_id: ChainId,
        /// The new latest member.
        new_latest: DocumentId,
        /// The member that lost latest status.
        previous_latest: DocumentId,
    },
    /// The original's record was missing; a chain was created from the new
    /// document alone and the inconsistency logged.
    Repaired {
        /// The repaired chain.
        chain_id: ChainId,
        /// The sole member.
        document_id: DocumentId,
    },
    /// Two chains were merged after a direct pairwise similarity check.
    Merged {
        /// The surviving chain.
        target: ChainId,
        /// The chain whose members were absorbed.
        absorbed: ChainId,
        /// The direct pairwise Jaccard evidence supplied for the merge.
        direct_jaccard: f64,
    },
    /// A chain suffix was carved into a fresh chain.
    Split {
        /// The chain that kept the prefix.
        original: ChainId,
        /// The new chain holding the suffix.
        carved: ChainId,
    },
}
