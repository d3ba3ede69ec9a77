//! Agent directory: the cached list of agents on the attach surface.

use std::sync::Arc;

use futures::{StreamExt, stream::BoxStream};
use miniapp_core::{
    Agent, IconCache,
    api::AgentsSnapshot,
    types::DEFAULT_ICON_NAME,
};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::{
    identity::IdentityCache,
    orchestrator::pending::{Pending, RequestId, settle},
};

/// Shared, immutable directory snapshot.
pub type AgentList = Arc<Vec<Agent>>;

/// Versioned cache of attach agents.
///
/// Owned by the orchestrator task; readers hold a [`watch::Receiver`] and
/// observe each full snapshot as one atomic replacement.
pub(crate) struct AgentDirectory {
    hash: i64,
    pending: Option<Pending>,
    agents: watch::Sender<AgentList>,
}

impl AgentDirectory {
    pub(crate) fn new() -> Self {
        let (agents, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            hash: 0,
            pending: None,
            agents,
        }
    }

    /// Version hash of the current snapshot, 0 before the first one.
    pub(crate) const fn hash(&self) -> i64 {
        self.hash
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<AgentList> {
        self.agents.subscribe()
    }

    pub(crate) const fn is_refreshing(&self) -> bool {
        self.pending.is_some()
    }

    pub(crate) fn begin(&mut self, pending: Pending) {
        self.pending = Some(pending);
    }

    /// Clear the in-flight request if `id` is still current.
    pub(crate) fn settle(&mut self, id: RequestId) -> bool {
        settle(&mut self.pending, id)
    }

    /// Apply a snapshot response. Returns whether subscribers were notified.
    ///
    /// Peer records embedded in the snapshot must already be ingested into
    /// `identities`; entries whose identity is not an attach-capable bot are
    /// dropped, and so are inactive ones.
    pub(crate) fn apply(
        &mut self,
        snapshot: AgentsSnapshot,
        identities: &IdentityCache,
        icons: &dyn IconCache,
    ) -> bool {
        let (hash, agents) = match snapshot {
            AgentsSnapshot::NotModified => {
                tracing::debug!(hash = self.hash, "Attach directory not modified");
                return false;
            }
            AgentsSnapshot::Full { hash, agents, .. } => (hash, agents),
        };

        let agents: Vec<Agent> = agents
            .into_iter()
            .filter_map(|agent| parse_agent(agent, identities))
            .filter(|agent| !agent.inactive)
            .collect();
        for icon in agents.iter().filter_map(|agent| agent.icon.as_ref()) {
            icons.pin(icon);
        }

        tracing::debug!(hash, count = agents.len(), "Attach directory replaced");
        self.hash = hash;
        self.agents.send_replace(Arc::new(agents));
        true
    }
}

/// Keep an entry only if its identity is a known attach-capable bot. The
/// display name comes from the snapshot; only the default icon slot is kept.
pub(crate) fn parse_agent(mut agent: Agent, identities: &IdentityCache) -> Option<Agent> {
    let supported = identities
        .get(agent.id)
        .is_some_and(|record| record.supports_attach());
    if !supported {
        tracing::debug!(agent = %agent.id, "Skipping agent without attach support");
        return None;
    }
    agent.icon = agent.icon.filter(|icon| icon.name == DEFAULT_ICON_NAME);
    Some(agent)
}

/// Stream of directory replacements, starting after the current snapshot.
pub(crate) fn updates(rx: watch::Receiver<AgentList>) -> BoxStream<'static, AgentList> {
    WatchStream::from_changes(rx).boxed()
}
