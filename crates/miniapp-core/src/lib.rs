//! Core abstractions for mini-app session management.
//!
//! This crate provides the fundamental building blocks:
//! - Peer and agent identity types
//! - `SessionContext` - Who a session is opened for
//! - `AttachApi` - The remote request/response API and its error taxonomy
//! - Collaborator traits for consent, notices, trust storage and surfaces

pub mod api;
pub mod consent;
pub mod context;
pub mod surface;
pub mod traits;
pub mod types;

pub use api::{ApiError, AttachApi};
pub use consent::{ConsentDecision, ConsentPrompt, ConsentRequest, Notice, Notifier};
pub use context::SessionContext;
pub use surface::{Surface, SurfaceCallbacks, SurfaceHost, SurfaceParams};
pub use traits::{IconCache, LinkOpener, ThemeSource, TrustStore, TrustStoreError};
pub use types::{
    Agent, BotInfo, IconRef, MenuButton, PeerId, PeerKind, PeerRecord, ThemeParams, WebViewButton,
};
