//! Session context for mini-app sessions.

use serde::{Deserialize, Serialize};

use crate::PeerId;

/// Who a session is opened for and against which agent.
///
/// `peer` is the requesting surface (the chat the user is in). For simple
/// and menu sessions the peer is the agent itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    /// Requesting peer.
    pub peer: PeerId,

    /// Agent identity, once known. Absent while a handle is being resolved.
    #[serde(default)]
    pub agent: Option<PeerId>,

    /// Handle the session was requested by, if any.
    #[serde(default)]
    pub handle: Option<String>,

    /// Start parameter forwarded to the agent.
    #[serde(default)]
    pub start_param: String,
}

impl SessionContext {
    /// Context for a known agent.
    #[must_use]
    pub fn for_agent(peer: PeerId, agent: PeerId) -> Self {
        Self {
            peer,
            agent: Some(agent),
            handle: None,
            start_param: String::new(),
        }
    }

    /// Context for an agent that still has to be resolved from a handle.
    #[must_use]
    pub fn for_handle(peer: PeerId, handle: impl Into<String>, start_param: impl Into<String>) -> Self {
        Self {
            peer,
            agent: None,
            handle: Some(handle.into()),
            start_param: start_param.into(),
        }
    }

    /// True when `(peer, agent)` names this context.
    #[must_use]
    pub fn targets(&self, peer: PeerId, agent: PeerId) -> bool {
        self.peer == peer && self.agent == Some(agent)
    }

    /// True when this context was requested with the same handle and start
    /// parameter. Handles compare case-insensitively.
    #[must_use]
    pub fn same_request(&self, peer: PeerId, handle: &str, start_param: &str) -> bool {
        self.peer == peer
            && self.start_param == start_param
            && self
                .handle
                .as_deref()
                .is_some_and(|own| own.eq_ignore_ascii_case(handle))
    }

    /// The session runs inside the agent's own chat.
    #[must_use]
    pub fn is_agent_local(&self) -> bool {
        self.agent == Some(self.peer)
    }
}
