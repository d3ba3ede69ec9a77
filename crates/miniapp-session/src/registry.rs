//! Registry of orchestrators that currently show a live session.

use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use tokio::sync::mpsc::WeakUnboundedSender;

use crate::orchestrator::{Command, Orchestrator, OrchestratorId};

type Sessions = HashMap<OrchestratorId, WeakUnboundedSender<Command>>;

/// Process-level set of live sessions.
///
/// Owned by whoever manages application lifetime and shared with every
/// orchestrator it builds. `cancel_all` closes every live session, e.g. on
/// logout or shutdown. Entries are weak: an orchestrator whose handles are
/// all dropped shuts down regardless.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<Sessions>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an orchestrator. Registering twice is harmless.
    pub fn register(&self, orchestrator: &Orchestrator) {
        self.insert(orchestrator.id(), orchestrator.downgrade());
    }

    pub(crate) fn insert(&self, id: OrchestratorId, commands: WeakUnboundedSender<Command>) {
        self.lock().insert(id, commands);
    }

    /// Remove an orchestrator. Returns whether it was registered.
    pub fn unregister(&self, id: OrchestratorId) -> bool {
        self.lock().remove(&id).is_some()
    }

    #[must_use]
    pub fn contains(&self, id: OrchestratorId) -> bool {
        self.lock().contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Cancel every registered session and empty the registry.
    pub fn cancel_all(&self) {
        let drained: Vec<_> = self.lock().drain().collect();
        tracing::debug!(count = drained.len(), "Cancelling all live sessions");
        for (id, commands) in drained {
            let sent = commands
                .upgrade()
                .is_some_and(|commands| commands.send(Command::Cancel).is_ok());
            if !sent {
                tracing::debug!(%id, "Cancel skipped: orchestrator already stopped");
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Sessions> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;

    #[tokio::test]
    async fn register_and_unregister() {
        let registry = SessionRegistry::new();
        let h = Harness::new();
        let id = h.orchestrator.id();

        registry.register(&h.orchestrator);
        registry.register(&h.orchestrator);
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(id));

        assert!(registry.unregister(id));
        assert!(!registry.unregister(id));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn cancel_all_drains_even_without_live_sessions() {
        let registry = SessionRegistry::new();
        let a = Harness::new();
        let b = Harness::new();
        registry.register(&a.orchestrator);
        registry.register(&b.orchestrator);

        registry.cancel_all();

        assert!(registry.is_empty());
        assert!(a.orchestrator.status().await.unwrap().context.is_none());
    }

    #[tokio::test]
    async fn entries_do_not_keep_orchestrators_alive() {
        let registry = SessionRegistry::new();
        let Harness { orchestrator, .. } = Harness::new();
        registry.register(&orchestrator);
        let weak = orchestrator.downgrade();

        drop(orchestrator);
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert!(weak.upgrade().is_none());
        registry.cancel_all();
        assert!(registry.is_empty());
    }
}
