//! Remote request/response API consumed by the session engine.
//!
//! The transport behind [`AttachApi`] is opaque: implementations may speak
//! any wire protocol as long as they map failures onto [`ApiError`].

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Agent, PeerId, PeerRecord, ThemeParams};

/// Error type reported when the remote no longer accepts an agent identity.
pub const AGENT_INVALID: &str = "BOT_INVALID";

/// Error code of the "not found" failure class.
pub const NOT_FOUND_CODE: u16 = 400;

/// Remote call failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// The remote rejected the request with a typed error.
    #[error("Request rejected ({code}): {kind}")]
    Rejected { code: u16, kind: String },
    /// Network failure before a response arrived.
    #[error("Transport error: {0}")]
    Transport(String),
    /// The response could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),
}

impl ApiError {
    /// Build a typed rejection.
    #[must_use]
    pub fn rejected(code: u16, kind: impl Into<String>) -> Self {
        Self::Rejected {
            code,
            kind: kind.into(),
        }
    }

    /// The remote rejected the agent identity as stale or invalid.
    #[must_use]
    pub fn is_agent_invalid(&self) -> bool {
        matches!(self, Self::Rejected { kind, .. } if kind == AGENT_INVALID)
    }

    /// The looked-up entity does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Rejected { code, .. } if *code == NOT_FOUND_CODE)
    }
}

/// Response to a versioned directory snapshot request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentsSnapshot {
    /// The cached snapshot is still current.
    NotModified,
    /// A complete replacement snapshot.
    Full {
        hash: i64,
        agents: Vec<Agent>,
        #[serde(default)]
        peers: Vec<PeerRecord>,
    },
}

/// Registration state of an agent on the attach surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationState {
    NotRegistered,
    Inactive,
    Active,
}

/// Response to a registration status request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub agent: Agent,
    pub state: RegistrationState,
    #[serde(default)]
    pub peers: Vec<PeerRecord>,
}

/// General-purpose session open request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenRequest {
    pub context: PeerId,
    pub agent: PeerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_param: Option<String>,
    pub theme: ThemeParams,
    /// Launched from the agent's own menu button.
    #[serde(default)]
    pub from_menu: bool,
}

/// Successful general open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionGrant {
    pub query_id: u64,
    pub url: String,
}

/// Simple open request for agent-local data entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleOpenRequest {
    pub agent: PeerId,
    pub url: String,
    pub theme: ThemeParams,
}

/// Successful simple open. Carries no session-query id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleGrant {
    pub url: String,
}

/// Keepalive for a live session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProlongRequest {
    pub context: PeerId,
    pub agent: PeerId,
    pub query_id: u64,
    pub silent: bool,
}

/// Result of a handle lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPeer {
    #[serde(default)]
    pub peer: Option<PeerId>,
    #[serde(default)]
    pub peers: Vec<PeerRecord>,
}

/// Data submitted by a simple session's surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    pub agent: PeerId,
    pub random_id: u64,
    pub button_text: String,
    pub data: Bytes,
}

/// Remote service used by the session engine.
#[async_trait]
pub trait AttachApi: Send + Sync {
    /// Fetch the attach directory, passing the last known version hash.
    async fn get_attach_agents(&self, hash: i64) -> Result<AgentsSnapshot, ApiError>;

    /// Fetch the registration status of one agent.
    async fn get_attach_agent(&self, agent: PeerId) -> Result<AgentStatus, ApiError>;

    /// Enable or disable an agent on the attach surface.
    async fn toggle_attach_agent(&self, agent: PeerId, enabled: bool) -> Result<(), ApiError>;

    /// Open a general-purpose session.
    async fn request_session(&self, request: OpenRequest) -> Result<SessionGrant, ApiError>;

    /// Open a simple session without a server-side session id.
    async fn request_simple_session(
        &self,
        request: SimpleOpenRequest,
    ) -> Result<SimpleGrant, ApiError>;

    /// Keep a live session alive.
    async fn prolong_session(&self, request: ProlongRequest) -> Result<(), ApiError>;

    /// Look up a public handle.
    async fn resolve_handle(&self, handle: &str) -> Result<ResolvedPeer, ApiError>;

    /// Forward data submitted from a simple session.
    async fn send_session_data(&self, data: SessionData) -> Result<(), ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_errors() {
        let invalid = ApiError::rejected(400, AGENT_INVALID);
        assert!(invalid.is_agent_invalid());
        assert!(invalid.is_not_found());

        let flood = ApiError::rejected(420, "FLOOD_WAIT_3");
        assert!(!flood.is_agent_invalid());
        assert!(!flood.is_not_found());

        assert!(!ApiError::Transport("reset".into()).is_not_found());
    }

    #[test]
    fn snapshot_variants_are_tagged() {
        let json = serde_json::to_string(&AgentsSnapshot::NotModified).unwrap();
        assert_eq!(json, r#"{"type":"not_modified"}"#);

        let parsed: AgentsSnapshot =
            serde_json::from_str(r#"{"type":"full","hash":9,"agents":[]}"#).unwrap();
        assert_eq!(
            parsed,
            AgentsSnapshot::Full {
                hash: 9,
                agents: vec![],
                peers: vec![],
            }
        );
    }
}
