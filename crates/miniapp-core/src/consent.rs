//! User consent prompts and user-visible notices.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// What the user is asked to agree to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConsentRequest {
    /// Allow an untrusted agent to open a session.
    OpenSession { agent_name: String },
    /// Add an agent to the attach surface.
    AddToSurface { agent_name: String },
}

impl ConsentRequest {
    /// Prompt text shown to the user.
    #[must_use]
    pub fn text(&self) -> String {
        match self {
            Self::OpenSession { agent_name } => format!(
                "{agent_name} would like to open its web app to proceed. \
                 It will be able to access your IP address and basic device info."
            ),
            Self::AddToSurface { agent_name } => {
                format!("{agent_name} asks your permission to be added as an option to your attachment menu.")
            }
        }
    }
}

/// Outcome of a consent prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentDecision {
    Accepted,
    Declined,
}

impl ConsentDecision {
    #[must_use]
    pub const fn is_accepted(self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Presents blocking consent prompts.
///
/// Implement this trait to integrate with your dialog system. Dropping the
/// returned future (the session was superseded) must dismiss the prompt.
#[async_trait]
pub trait ConsentPrompt: Send + Sync {
    /// Ask the user and wait for the answer.
    async fn ask(&self, request: ConsentRequest) -> ConsentDecision;
}

/// Prompt that accepts everything without asking.
#[derive(Debug, Default, Clone)]
pub struct AutoAccept;

#[async_trait]
impl ConsentPrompt for AutoAccept {
    async fn ask(&self, _request: ConsentRequest) -> ConsentDecision {
        ConsentDecision::Accepted
    }
}

/// Non-fatal, user-visible message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    /// The agent cannot be attached.
    Unsupported,
    /// The agent is already on the attach surface.
    AlreadyAdded,
    /// The agent was added to the attach surface.
    Added,
    /// The agent was removed from the attach surface.
    Removed,
    /// No peer carries this handle.
    HandleNotFound { handle: String },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported => f.write_str("This bot isn't supported in the attach menu."),
            Self::AlreadyAdded => f.write_str("This bot is already added in your attach menu."),
            Self::Added => f.write_str("The bot was added to the menu."),
            Self::Removed => f.write_str("The bot was removed from the menu."),
            Self::HandleNotFound { handle } => write!(f, "Username @{handle} not found."),
        }
    }
}

/// Shows notices to the user (toasts, status lines, ...).
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}
