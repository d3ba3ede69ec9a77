//! Collaborator traits for storage and presentation services.

use async_trait::async_trait;
use thiserror::Error;

use crate::{IconRef, PeerId, ThemeParams};

/// Trust store error.
#[derive(Debug, Error)]
pub enum TrustStoreError {
    #[error("Storage error: {0}")]
    Internal(String),
}

/// Persisted per-agent trust flags.
#[async_trait]
pub trait TrustStore: Send + Sync {
    /// Whether the user already allowed this agent to open sessions.
    async fn is_trusted(&self, agent: PeerId) -> Result<bool, TrustStoreError>;

    /// Remember that the user allowed this agent.
    async fn mark_trusted(&self, agent: PeerId) -> Result<(), TrustStoreError>;
}

/// Persistent icon cache.
pub trait IconCache: Send + Sync {
    /// Pin an icon so it is not evicted before the next directory refresh,
    /// and start loading it if needed.
    fn pin(&self, icon: &IconRef);
}

/// Opens application-local links intercepted from a surface.
pub trait LinkOpener: Send + Sync {
    fn open(&self, local_uri: &str);
}

/// Supplies the current theme parameters.
pub trait ThemeSource: Send + Sync {
    fn theme_params(&self) -> ThemeParams;
}

/// Theme source that always reports the same parameters.
#[derive(Debug, Clone, Default)]
pub struct StaticTheme(pub ThemeParams);

impl ThemeSource for StaticTheme {
    fn theme_params(&self) -> ThemeParams {
        self.0.clone()
    }
}

/// Icon cache that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoIconCache;

impl IconCache for NoIconCache {
    fn pin(&self, _icon: &IconRef) {}
}

/// Link opener that drops every link.
#[derive(Debug, Clone, Copy, Default)]
pub struct IgnoreLinks;

impl LinkOpener for IgnoreLinks {
    fn open(&self, local_uri: &str) {
        tracing::debug!(%local_uri, "No link opener configured");
    }
}
