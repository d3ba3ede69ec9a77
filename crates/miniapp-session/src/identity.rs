//! Local identity cache.

use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock},
};

use miniapp_core::{PeerId, PeerRecord};

#[derive(Default)]
struct Inner {
    by_id: HashMap<PeerId, PeerRecord>,
    /// Lowercased handle -> peer.
    by_handle: HashMap<String, PeerId>,
}

/// In-memory cache of peer records, looked up by id or handle.
///
/// Fed by every remote response that embeds peer records. Handles are
/// matched case-insensitively.
#[derive(Default)]
pub struct IdentityCache {
    inner: RwLock<Inner>,
}

impl IdentityCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace records. Returns how many records changed.
    pub fn ingest<I>(&self, records: I) -> usize
    where
        I: IntoIterator<Item = PeerRecord>,
    {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let mut changed = 0;
        for record in records {
            if inner.by_id.get(&record.id) == Some(&record) {
                continue;
            }
            if let Some(old) = inner.by_id.get(&record.id).and_then(|r| r.handle.clone()) {
                let key = old.to_lowercase();
                if inner.by_handle.get(&key) == Some(&record.id) {
                    inner.by_handle.remove(&key);
                }
            }
            if let Some(handle) = &record.handle {
                inner.by_handle.insert(handle.to_lowercase(), record.id);
            }
            inner.by_id.insert(record.id, record);
            changed += 1;
        }
        changed
    }

    /// Record for an id.
    #[must_use]
    pub fn get(&self, id: PeerId) -> Option<PeerRecord> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_id
            .get(&id)
            .cloned()
    }

    /// Record carrying `handle`, ignoring case and a leading `@`.
    #[must_use]
    pub fn by_handle(&self, handle: &str) -> Option<PeerRecord> {
        let key = handle.trim_start_matches('@').to_lowercase();
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .by_handle
            .get(&key)
            .and_then(|id| inner.by_id.get(id))
            .cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_id
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use miniapp_core::PeerKind;

    use super::*;

    fn user(id: i64, handle: &str, name: &str) -> PeerRecord {
        PeerRecord {
            id: PeerId(id),
            handle: Some(handle.to_string()),
            name: name.to_string(),
            kind: PeerKind::User,
        }
    }

    #[test]
    fn lookup_by_handle_ignores_case_and_at() {
        let cache = IdentityCache::new();
        cache.ingest([user(1, "Alice", "Alice A.")]);
        assert_eq!(cache.by_handle("@alice").unwrap().id, PeerId(1));
        assert!(cache.by_handle("bob").is_none());
    }

    #[test]
    fn renamed_handle_drops_old_index() {
        let cache = IdentityCache::new();
        cache.ingest([user(1, "old", "A")]);
        assert_eq!(cache.ingest([user(1, "new", "A")]), 1);
        assert!(cache.by_handle("old").is_none());
        assert_eq!(cache.by_handle("new").unwrap().id, PeerId(1));
    }

    #[test]
    fn unchanged_records_are_not_counted() {
        let cache = IdentityCache::new();
        assert_eq!(cache.ingest([user(1, "a", "A"), user(2, "b", "B")]), 2);
        assert_eq!(cache.ingest([user(1, "a", "A")]), 0);
        assert_eq!(cache.len(), 2);
    }
}
