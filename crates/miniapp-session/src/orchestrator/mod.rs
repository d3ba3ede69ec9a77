//! Session orchestrator.
//!
//! An [`Orchestrator`] owns at most one mini-app session. All state lives in
//! a single task; the handle only sends commands to it, so calls never block
//! and never race each other. Opening a new session supersedes the current
//! one.

mod actor;
mod keepalive;
mod live;
pub(crate) mod pending;
mod registration;
mod resolve;


use std::sync::Arc;

use futures::stream::BoxStream;
use miniapp_core::{
    Agent, AttachApi, ConsentPrompt, IconCache, LinkOpener, Notifier, PeerId, SessionContext,
    SurfaceHost, ThemeSource, TrustStore, WebViewButton,
    traits::{IgnoreLinks, NoIconCache, StaticTheme},
};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::Instrument;
use uuid::Uuid;

pub(crate) use self::actor::Command;
use self::{
    actor::Actor,
    live::LinkRewriter,
    pending::Tasks,
    registration::Registration,
};
use crate::{
    config::SessionConfig,
    directory::{self, AgentDirectory, AgentList},
    identity::IdentityCache,
    registry::SessionRegistry,
    trust::TrustGate,
};

/// Orchestrator identifier.
pub type OrchestratorId = Uuid;

/// Orchestrator error.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Orchestrator has shut down")]
    Closed,
}

/// Whether opening needs to pass the trust gate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TrustCheck {
    /// Ask the user unless the agent is verified or already trusted.
    #[default]
    Ask,
    /// The caller already obtained consent.
    Granted,
}

/// Coarse session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Resolving,
    AwaitingTrust,
    OpeningSession,
    Live,
}

/// Snapshot of an orchestrator's session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub context: Option<SessionContext>,
    /// Query id of the live session, if it has one.
    pub query_id: Option<u64>,
    /// Whether the session registry currently lists this orchestrator.
    pub registered: bool,
}

/// Handle to a running orchestrator. Cheap to clone.
///
/// The orchestrator task stops, closing any live session, once every handle
/// is dropped. A [`SessionRegistry`] entry does not count as a handle.
#[derive(Clone)]
pub struct Orchestrator {
    id: OrchestratorId,
    commands: mpsc::UnboundedSender<Command>,
    agents: watch::Receiver<AgentList>,
    identities: Arc<IdentityCache>,
}

impl Orchestrator {
    #[must_use]
    pub const fn id(&self) -> OrchestratorId {
        self.id
    }

    /// Open a session by public handle, e.g. from a deep link.
    ///
    /// # Errors
    /// Returns error if the orchestrator has shut down.
    pub fn open_by_handle(
        &self,
        peer: PeerId,
        handle: impl Into<String>,
        start_param: impl Into<String>,
    ) -> Result<(), OrchestratorError> {
        self.send(Command::OpenByHandle {
            peer,
            handle: handle.into(),
            start_param: start_param.into(),
        })
    }

    /// Open a session for `agent` in the context of `peer`.
    ///
    /// # Errors
    /// Returns error if the orchestrator has shut down.
    pub fn open(
        &self,
        peer: PeerId,
        agent: PeerId,
        button: WebViewButton,
    ) -> Result<(), OrchestratorError> {
        self.open_with(peer, agent, button, TrustCheck::Ask)
    }

    /// Like [`Self::open`], with explicit control over the trust gate.
    ///
    /// # Errors
    /// Returns error if the orchestrator has shut down.
    pub fn open_with(
        &self,
        peer: PeerId,
        agent: PeerId,
        button: WebViewButton,
        trust: TrustCheck,
    ) -> Result<(), OrchestratorError> {
        self.send(Command::Open {
            peer,
            agent,
            button,
            trust,
        })
    }

    /// Open a simple session: no query id, no keepalive. Such a session may
    /// submit data back to the agent once.
    ///
    /// # Errors
    /// Returns error if the orchestrator has shut down.
    pub fn open_simple(&self, agent: PeerId, button: WebViewButton) -> Result<(), OrchestratorError> {
        self.send(Command::OpenSimple { agent, button })
    }

    /// Open the agent's menu-button session.
    ///
    /// # Errors
    /// Returns error if the orchestrator has shut down.
    pub fn open_menu(&self, agent: PeerId) -> Result<(), OrchestratorError> {
        self.send(Command::OpenMenu { agent })
    }

    /// Ask to add `agent` to the attach surface, then open against `peer` if
    /// given.
    ///
    /// # Errors
    /// Returns error if the orchestrator has shut down.
    pub fn request_add_to_surface(
        &self,
        peer: Option<PeerId>,
        agent: PeerId,
        start_param: impl Into<String>,
    ) -> Result<(), OrchestratorError> {
        self.send(Command::AddToSurface {
            peer,
            agent,
            start_param: start_param.into(),
        })
    }

    /// # Errors
    /// Returns error if the orchestrator has shut down.
    pub fn toggle(&self, agent: PeerId, enabled: bool) -> Result<(), OrchestratorError> {
        self.send(Command::Toggle { agent, enabled })
    }

    /// # Errors
    /// Returns error if the orchestrator has shut down.
    pub fn remove_from_surface(&self, agent: PeerId) -> Result<(), OrchestratorError> {
        self.send(Command::RemoveFromSurface { agent })
    }

    /// Refresh the agent directory. No-op while a refresh is in flight.
    ///
    /// # Errors
    /// Returns error if the orchestrator has shut down.
    pub fn refresh_directory(&self) -> Result<(), OrchestratorError> {
        self.send(Command::RefreshDirectory)
    }

    /// The remote service consumed the result of `query_id`.
    ///
    /// # Errors
    /// Returns error if the orchestrator has shut down.
    pub fn session_result_sent(&self, query_id: u64) -> Result<(), OrchestratorError> {
        self.send(Command::ResultSent { query_id })
    }

    /// Cancel whatever the orchestrator is doing and close the live session.
    ///
    /// # Errors
    /// Returns error if the orchestrator has shut down.
    pub fn cancel(&self) -> Result<(), OrchestratorError> {
        self.send(Command::Cancel)
    }

    /// # Errors
    /// Returns error if the orchestrator has shut down.
    pub async fn status(&self) -> Result<SessionStatus, OrchestratorError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Status { reply })?;
        rx.await.map_err(|_| OrchestratorError::Closed)
    }

    /// # Errors
    /// Returns error if the orchestrator has shut down.
    pub async fn state(&self) -> Result<SessionState, OrchestratorError> {
        Ok(self.status().await?.state)
    }

    /// Current directory snapshot.
    #[must_use]
    pub fn agents(&self) -> AgentList {
        Arc::clone(&self.agents.borrow())
    }

    /// Directory snapshots published after this call.
    #[must_use]
    pub fn agent_updates(&self) -> BoxStream<'static, Arc<Vec<Agent>>> {
        directory::updates(self.agents.clone())
    }

    #[must_use]
    pub fn identities(&self) -> &IdentityCache {
        &self.identities
    }

    pub(crate) fn downgrade(&self) -> mpsc::WeakUnboundedSender<Command> {
        self.commands.downgrade()
    }

    fn send(&self, command: Command) -> Result<(), OrchestratorError> {
        self.commands
            .send(command)
            .map_err(|_| OrchestratorError::Closed)
    }
}

/// Builder for an [`Orchestrator`].
pub struct OrchestratorBuilder {
    api: Arc<dyn AttachApi>,
    surfaces: Arc<dyn SurfaceHost>,
    prompt: Arc<dyn ConsentPrompt>,
    notifier: Arc<dyn Notifier>,
    trust_store: Arc<dyn TrustStore>,
    icons: Arc<dyn IconCache>,
    opener: Arc<dyn LinkOpener>,
    theme: Arc<dyn ThemeSource>,
    registry: Arc<SessionRegistry>,
    identities: Arc<IdentityCache>,
    config: SessionConfig,
}

impl OrchestratorBuilder {
    #[must_use]
    pub fn new(
        api: Arc<dyn AttachApi>,
        surfaces: Arc<dyn SurfaceHost>,
        prompt: Arc<dyn ConsentPrompt>,
        notifier: Arc<dyn Notifier>,
        trust_store: Arc<dyn TrustStore>,
    ) -> Self {
        Self {
            api,
            surfaces,
            prompt,
            notifier,
            trust_store,
            icons: Arc::new(NoIconCache),
            opener: Arc::new(IgnoreLinks),
            theme: Arc::new(StaticTheme::default()),
            registry: Arc::new(SessionRegistry::new()),
            identities: Arc::new(IdentityCache::new()),
            config: SessionConfig::default(),
        }
    }

    #[must_use]
    pub fn icons(mut self, icons: Arc<dyn IconCache>) -> Self {
        self.icons = icons;
        self
    }

    #[must_use]
    pub fn link_opener(mut self, opener: Arc<dyn LinkOpener>) -> Self {
        self.opener = opener;
        self
    }

    #[must_use]
    pub fn theme(mut self, theme: Arc<dyn ThemeSource>) -> Self {
        self.theme = theme;
        self
    }

    /// Share a session registry between orchestrators.
    #[must_use]
    pub fn registry(mut self, registry: Arc<SessionRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Share an identity cache between orchestrators.
    #[must_use]
    pub fn identities(mut self, identities: Arc<IdentityCache>) -> Self {
        self.identities = identities;
        self
    }

    #[must_use]
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Start the orchestrator task. Must be called within a tokio runtime.
    #[must_use]
    pub fn spawn(self) -> Orchestrator {
        let id = Uuid::new_v4();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let directory = AgentDirectory::new();
        let handle = Orchestrator {
            id,
            commands: commands_tx.clone(),
            agents: directory.subscribe(),
            identities: Arc::clone(&self.identities),
        };

        let actor = Actor {
            id,
            api: self.api,
            surfaces: self.surfaces,
            notifier: self.notifier,
            opener: self.opener,
            theme: self.theme,
            icons: self.icons,
            trust: TrustGate::new(self.trust_store, self.prompt),
            registry: self.registry,
            links: LinkRewriter::new(self.config.local_scheme.clone(), &self.config.link_hosts),
            config: self.config,
            identities: self.identities,
            directory,
            tasks: Tasks::new(completions_tx),
            commands: commands_tx.downgrade(),
            context: None,
            open: None,
            lookup: None,
            consent: None,
            live: None,
            registration: Registration::default(),
            generation: 0,
            epoch: 0,
        };
        let span = tracing::debug_span!("orchestrator", %id);
        tokio::spawn(actor.run(commands_rx, completions_rx).instrument(span));
        handle
    }
}
