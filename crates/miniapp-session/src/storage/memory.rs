//! In-memory trust store.

use std::{collections::HashSet, sync::RwLock};

use async_trait::async_trait;
use miniapp_core::{PeerId, TrustStore, TrustStoreError};

/// In-memory trust store.
///
/// Useful for tests and single-process deployments.
/// Trust decisions are lost on restart.
#[derive(Default)]
pub struct MemoryTrustStore {
    trusted: RwLock<HashSet<PeerId>>,
}

impl MemoryTrustStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already trusts `agents`.
    #[must_use]
    pub fn with_trusted(agents: impl IntoIterator<Item = PeerId>) -> Self {
        Self {
            trusted: RwLock::new(agents.into_iter().collect()),
        }
    }

    /// Number of trusted agents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.trusted.read().map_or(0, |t| t.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TrustStore for MemoryTrustStore {
    async fn is_trusted(&self, agent: PeerId) -> Result<bool, TrustStoreError> {
        Ok(self
            .trusted
            .read()
            .map_err(|e| TrustStoreError::Internal(e.to_string()))?
            .contains(&agent))
    }

    async fn mark_trusted(&self, agent: PeerId) -> Result<(), TrustStoreError> {
        self.trusted
            .write()
            .map_err(|e| TrustStoreError::Internal(e.to_string()))?
            .insert(agent);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn marks_and_reads() {
        let store = MemoryTrustStore::new();
        assert!(!store.is_trusted(PeerId(3)).await.unwrap());
        tokio_test::assert_ok!(store.mark_trusted(PeerId(3)).await);
        assert!(store.is_trusted(PeerId(3)).await.unwrap());
        assert_eq!(store.len(), 1);
    }
}
