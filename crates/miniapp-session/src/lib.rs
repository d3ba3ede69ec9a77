//! Session orchestration for mini-app agents.
//!
//! Provides:
//! - `Orchestrator` - Open, keep alive and close one agent session
//! - `SessionRegistry` - Process-wide set of live sessions
//! - `IdentityCache` - Peer records by id and handle
//! - Trust store implementations (memory)

pub mod config;
pub mod directory;
pub mod identity;
pub mod orchestrator;
pub mod registry;
pub mod storage;
pub mod trust;

#[cfg(test)]
mod testing;

pub use config::{ConfigError, SessionConfig};
pub use directory::AgentList;
pub use identity::IdentityCache;
pub use orchestrator::{
    Orchestrator, OrchestratorBuilder, OrchestratorError, OrchestratorId, SessionState,
    SessionStatus, TrustCheck,
};
pub use registry::SessionRegistry;
pub use trust::TrustGate;
