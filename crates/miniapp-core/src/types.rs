//! Identities, peer records and the attachable agent model.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identity of any addressable peer: a user, a bot or a group chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(pub i64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

/// Fixed launch target configured by a bot for its menu button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuButton {
    pub url: String,
    pub text: String,
}

/// Bot-specific attributes of a peer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotInfo {
    /// The bot can be added to the attach surface.
    #[serde(default)]
    pub supports_attach: bool,
    /// Intrinsically trusted; never needs a consent prompt.
    #[serde(default)]
    pub verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub menu_button: Option<MenuButton>,
}

/// What kind of peer a record describes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PeerKind {
    User,
    Group,
    Bot(BotInfo),
}

/// A peer as known to the local identity cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    pub id: PeerId,
    /// Public handle, without the leading `@`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    pub name: String,
    pub kind: PeerKind,
}

impl PeerRecord {
    /// Bot attributes, if this peer is a bot.
    #[must_use]
    pub const fn bot(&self) -> Option<&BotInfo> {
        match &self.kind {
            PeerKind::Bot(info) => Some(info),
            PeerKind::User | PeerKind::Group => None,
        }
    }

    #[must_use]
    pub const fn is_bot(&self) -> bool {
        self.bot().is_some()
    }

    /// True for bots that can live on the attach surface.
    #[must_use]
    pub fn supports_attach(&self) -> bool {
        self.bot().is_some_and(|bot| bot.supports_attach)
    }

    #[must_use]
    pub fn is_verified(&self) -> bool {
        self.bot().is_some_and(|bot| bot.verified)
    }

    /// Case-insensitive handle comparison.
    #[must_use]
    pub fn has_handle(&self, handle: &str) -> bool {
        self.handle
            .as_deref()
            .is_some_and(|own| own.eq_ignore_ascii_case(handle))
    }
}

/// Reference to an icon asset stored by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IconRef {
    pub id: i64,
    /// Icon slot name; only `default_static` is used for the attach surface.
    pub name: String,
}

/// Icon slot picked for the attach surface.
pub const DEFAULT_ICON_NAME: &str = "default_static";

/// An agent registered for the attach surface.
///
/// Built from a directory snapshot entry and valid until the next snapshot
/// replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: PeerId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<IconRef>,
    /// Registered, but disabled by the user.
    #[serde(default)]
    pub inactive: bool,
}

/// Caller-supplied launch parameters for a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebViewButton {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub start_param: String,
}

impl WebViewButton {
    /// A button carrying only a start parameter.
    #[must_use]
    pub fn with_start_param(start_param: impl Into<String>) -> Self {
        Self {
            start_param: start_param.into(),
            ..Self::default()
        }
    }
}

/// Opaque theme parameters blob forwarded to the remote service and the
/// surface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThemeParams(pub Value);
