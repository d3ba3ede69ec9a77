//! The orchestrator task. It owns all session state; every transition runs
//! here, one message at a time.

use std::sync::Arc;

use bytes::Bytes;
use miniapp_core::{
    ApiError, AttachApi, ConsentDecision, IconCache, LinkOpener, Notice, Notifier, PeerId,
    PeerRecord, SessionContext, SurfaceHost, SurfaceParams, ThemeSource, WebViewButton,
    api::{
        AgentStatus, AgentsSnapshot, OpenRequest, ProlongRequest, ResolvedPeer, SessionData,
        SimpleOpenRequest,
    },
};
use tokio::sync::{mpsc, oneshot, watch};
use uuid::Uuid;

use super::{
    OrchestratorId, SessionState, SessionStatus, TrustCheck,
    keepalive::{self, Keepalive},
    live::{LinkRewriter, LiveSession, SessionCallbacks, SurfaceEvent},
    pending::{Pending, RequestId, Tasks, settle},
    registration::{AfterToggle, Registration},
};
use crate::{
    config::SessionConfig, directory::AgentDirectory, identity::IdentityCache,
    registry::SessionRegistry, trust::TrustGate,
};

/// Request from an [`Orchestrator`](super::Orchestrator) handle.
pub(crate) enum Command {
    OpenByHandle {
        peer: PeerId,
        handle: String,
        start_param: String,
    },
    Open {
        peer: PeerId,
        agent: PeerId,
        button: WebViewButton,
        trust: TrustCheck,
    },
    OpenSimple {
        agent: PeerId,
        button: WebViewButton,
    },
    OpenMenu {
        agent: PeerId,
    },
    AddToSurface {
        peer: Option<PeerId>,
        agent: PeerId,
        start_param: String,
    },
    Toggle {
        agent: PeerId,
        enabled: bool,
    },
    RemoveFromSurface {
        agent: PeerId,
    },
    RefreshDirectory,
    ResultSent {
        query_id: u64,
    },
    Cancel,
    Status {
        reply: oneshot::Sender<SessionStatus>,
    },
}

/// Result of work the orchestrator spawned.
#[derive(Debug)]
pub(crate) enum Completion {
    Directory {
        id: RequestId,
        result: Result<AgentsSnapshot, ApiError>,
    },
    Resolve {
        id: RequestId,
        handle: String,
        result: Result<ResolvedPeer, ApiError>,
    },
    Registration {
        id: RequestId,
        result: Result<AgentStatus, ApiError>,
    },
    AddConsent {
        id: RequestId,
        decision: ConsentDecision,
    },
    Toggle {
        agent: PeerId,
        enabled: bool,
        then: AfterToggle,
        result: Result<(), ApiError>,
    },
    Consent {
        id: RequestId,
        decision: ConsentDecision,
    },
    Open {
        id: RequestId,
        label: String,
        result: Result<Grant, ApiError>,
    },
    Prolong {
        id: RequestId,
        result: Result<(), ApiError>,
    },
    DataSent(Result<(), ApiError>),
    Surface {
        generation: u64,
        event: SurfaceEvent,
    },
}

/// Surface location granted by a successful open.
#[derive(Debug)]
pub(crate) struct Grant {
    query_id: Option<u64>,
    url: String,
}

/// Which open request to issue once consent is settled.
pub(super) enum OpenPlan {
    General {
        button: WebViewButton,
        from_menu: bool,
    },
    Simple {
        button: WebViewButton,
    },
}

pub(crate) struct Actor {
    pub(super) id: OrchestratorId,
    pub(super) api: Arc<dyn AttachApi>,
    pub(super) surfaces: Arc<dyn SurfaceHost>,
    pub(super) notifier: Arc<dyn Notifier>,
    pub(super) opener: Arc<dyn LinkOpener>,
    pub(super) theme: Arc<dyn ThemeSource>,
    pub(super) icons: Arc<dyn IconCache>,
    pub(super) trust: TrustGate,
    pub(super) registry: Arc<SessionRegistry>,
    pub(super) config: SessionConfig,
    pub(super) links: LinkRewriter,
    pub(super) identities: Arc<IdentityCache>,
    pub(super) directory: AgentDirectory,
    pub(super) tasks: Tasks,
    /// Weak so that dropping every handle stops the task.
    pub(super) commands: mpsc::WeakUnboundedSender<Command>,
    pub(super) context: Option<SessionContext>,
    pub(super) open: Option<Pending>,
    pub(super) lookup: Option<Pending>,
    pub(super) consent: Option<(Pending, OpenPlan)>,
    pub(super) live: Option<LiveSession>,
    pub(super) registration: Registration,
    /// Bumped for every surface shown.
    pub(super) generation: u64,
    /// Bumped by every `cancel`.
    pub(super) epoch: u64,
}

impl Actor {
    pub(crate) async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
    ) {
        tracing::debug!("Orchestrator started");
        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    self.handle_command(command).await;
                }
                Some(completion) = completions.recv() => {
                    self.handle_completion(completion).await;
                }
                () = keepalive::next_tick(&mut self.live) => self.prolong(),
            }
        }
        self.cancel();
        tracing::debug!("Orchestrator stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::OpenByHandle {
                peer,
                handle,
                start_param,
            } => self.open_by_handle(peer, &handle, start_param),
            Command::Open {
                peer,
                agent,
                button,
                trust,
            } => self.open(peer, agent, button, trust).await,
            Command::OpenSimple { agent, button } => self.open_simple(agent, button).await,
            Command::OpenMenu { agent } => self.open_menu(agent).await,
            Command::AddToSurface {
                peer,
                agent,
                start_param,
            } => self.request_add_to_surface(peer, agent, start_param),
            Command::Toggle { agent, enabled } => self.toggle(agent, enabled, AfterToggle::Nothing),
            Command::RemoveFromSurface { agent } => self.toggle(agent, false, AfterToggle::Removed),
            Command::RefreshDirectory => self.refresh_directory(),
            Command::ResultSent { query_id } => self.result_sent(query_id),
            Command::Cancel => self.cancel(),
            Command::Status { reply } => {
                let _ = reply.send(self.status());
            }
        }
    }

    async fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Directory { id, result } => self.on_directory(id, result),
            Completion::Resolve { id, handle, result } => self.on_lookup(id, handle, result),
            Completion::Registration { id, result } => self.on_registration_status(id, result).await,
            Completion::AddConsent { id, decision } => self.on_add_consent(id, decision),
            Completion::Toggle {
                agent,
                enabled,
                then,
                result,
            } => self.on_toggled(agent, enabled, then, result).await,
            Completion::Consent { id, decision } => self.on_consent(id, decision),
            Completion::Open { id, label, result } => self.on_open(id, label, result),
            Completion::Prolong { id, result } => self.on_prolong(id, result),
            Completion::DataSent(result) => match result {
                Ok(()) => tracing::debug!("Session data delivered"),
                Err(e) => tracing::warn!("Failed to deliver session data: {e}"),
            },
            Completion::Surface { generation, event } => self.on_surface(generation, event),
        }
    }

    pub(super) fn status(&self) -> SessionStatus {
        let context_agent = self.context.as_ref().and_then(|c| c.agent);
        let registering = self
            .registration
            .request
            .as_ref()
            .is_some_and(|r| context_agent == Some(r.agent));
        let confirming_add = self
            .registration
            .confirmation
            .as_ref()
            .is_some_and(|c| context_agent == Some(c.agent));

        let state = if self.live.is_some() {
            SessionState::Live
        } else if self.open.is_some() {
            SessionState::OpeningSession
        } else if self.consent.is_some() || confirming_add {
            SessionState::AwaitingTrust
        } else if self.lookup.is_some() || registering {
            SessionState::Resolving
        } else {
            SessionState::Idle
        };
        SessionStatus {
            state,
            context: self.context.clone(),
            query_id: self.live.as_ref().and_then(|live| live.query_id),
            registered: self.registry.contains(self.id),
        }
    }

    /// Tear down everything tied to the current session. Safe in any state.
    pub(super) fn cancel(&mut self) {
        self.registry.unregister(self.id);
        self.epoch += 1;
        self.registration.release_session();
        self.open = None;
        self.lookup = None;
        self.consent = None;
        if let Some(live) = self.live.take() {
            tracing::info!(query_id = ?live.query_id, "Session closed");
        }
        self.context = None;
    }

    pub(super) fn open_by_handle(&mut self, peer: PeerId, handle: &str, start_param: String) {
        let handle = handle.trim_start_matches('@');
        if handle.is_empty() {
            return;
        }
        if let Some(ctx) = &self.context {
            let same = match ctx.agent.and_then(|agent| self.identities.get(agent)) {
                Some(record) => {
                    ctx.peer == peer && ctx.start_param == start_param && record.has_handle(handle)
                }
                None => ctx.same_request(peer, handle, &start_param),
            };
            if same {
                if let Some(live) = &self.live {
                    live.activate();
                }
                return;
            }
        }
        self.cancel();
        tracing::debug!(%peer, %handle, "Opening session by handle");
        self.context = Some(SessionContext::for_handle(peer, handle, start_param));
        self.resolve(handle.to_string());
    }

    pub(super) async fn open(
        &mut self,
        peer: PeerId,
        agent: PeerId,
        button: WebViewButton,
        trust: TrustCheck,
    ) {
        if self.context.as_ref().is_some_and(|ctx| ctx.targets(peer, agent)) {
            if let Some(live) = &self.live {
                tracing::debug!(%peer, %agent, "Session already live, activating");
                live.activate();
                return;
            }
            if self.open.is_some() {
                tracing::debug!(%peer, %agent, "Session already requested");
                return;
            }
        }
        self.cancel();
        let mut context = SessionContext::for_agent(peer, agent);
        context.start_param.clone_from(&button.start_param);
        self.context = Some(context);
        self.begin(
            OpenPlan::General {
                button,
                from_menu: false,
            },
            trust,
        )
        .await;
    }

    async fn open_simple(&mut self, agent: PeerId, button: WebViewButton) {
        self.cancel();
        self.context = Some(SessionContext::for_agent(agent, agent));
        self.begin(OpenPlan::Simple { button }, TrustCheck::Ask).await;
    }

    async fn open_menu(&mut self, agent: PeerId) {
        self.cancel();
        let menu = self
            .identities
            .get(agent)
            .and_then(|record| record.bot().and_then(|bot| bot.menu_button.clone()));
        let Some(menu) = menu else {
            tracing::debug!(%agent, "Agent has no menu button");
            self.notifier.notify(Notice::Unsupported);
            return;
        };
        self.context = Some(SessionContext::for_agent(agent, agent));
        let button = WebViewButton {
            url: menu.url,
            text: menu.text,
            start_param: String::new(),
        };
        self.begin(
            OpenPlan::General {
                button,
                from_menu: true,
            },
            TrustCheck::Ask,
        )
        .await;
    }

    /// Pass the trust gate, then issue the open request.
    async fn begin(&mut self, plan: OpenPlan, trust: TrustCheck) {
        let Some(agent) = self.context.as_ref().and_then(|ctx| ctx.agent) else {
            return;
        };
        let Some(record) = self.identities.get(agent) else {
            tracing::warn!(%agent, "Cannot open a session for an unknown agent");
            self.context = None;
            return;
        };
        if matches!(trust, TrustCheck::Granted) || !self.trust.requires_confirmation(&record).await {
            self.issue(plan);
            return;
        }
        tracing::debug!(%agent, "Waiting for consent");
        let gate = self.trust.clone();
        let pending = self.tasks.spawn(
            async move { gate.confirm(&record).await },
            |id, decision| Completion::Consent { id, decision },
        );
        self.consent = Some((pending, plan));
    }

    fn on_consent(&mut self, id: RequestId, decision: ConsentDecision) {
        let Some((_prompt, plan)) = self.consent.take_if(|(pending, _)| pending.id() == id) else {
            return;
        };
        if decision.is_accepted() {
            self.issue(plan);
        } else {
            tracing::debug!("Consent declined");
            self.cancel();
        }
    }

    fn issue(&mut self, plan: OpenPlan) {
        let Some(ctx) = self.context.as_ref() else {
            return;
        };
        let Some(agent) = ctx.agent else {
            return;
        };
        let api = Arc::clone(&self.api);
        let theme = self.theme.theme_params();
        let pending = match plan {
            OpenPlan::General { button, from_menu } => {
                let request = OpenRequest {
                    context: ctx.peer,
                    agent,
                    url: non_empty(button.url),
                    start_param: non_empty(ctx.start_param.clone()),
                    theme,
                    from_menu,
                };
                tracing::debug!(peer = %ctx.peer, %agent, from_menu, "Requesting session");
                let label = button.text;
                self.tasks.spawn(
                    async move { api.request_session(request).await },
                    move |id, result| Completion::Open {
                        id,
                        label,
                        result: result.map(|grant| Grant {
                            query_id: Some(grant.query_id),
                            url: grant.url,
                        }),
                    },
                )
            }
            OpenPlan::Simple { button } => {
                let request = SimpleOpenRequest {
                    agent,
                    url: button.url,
                    theme,
                };
                tracing::debug!(%agent, "Requesting simple session");
                let label = button.text;
                self.tasks.spawn(
                    async move { api.request_simple_session(request).await },
                    move |id, result| Completion::Open {
                        id,
                        label,
                        result: result.map(|grant| Grant {
                            query_id: None,
                            url: grant.url,
                        }),
                    },
                )
            }
        };
        self.open = Some(pending);
    }

    fn on_open(&mut self, id: RequestId, label: String, result: Result<Grant, ApiError>) {
        if !settle(&mut self.open, id) {
            return;
        }
        match result {
            Ok(grant) => self.show(grant, label),
            Err(e) if e.is_agent_invalid() => {
                tracing::info!("Agent rejected by remote, refreshing directory");
                self.refresh_directory();
            }
            Err(e) => tracing::debug!("Session request failed: {e}"),
        }
    }

    fn show(&mut self, grant: Grant, button_text: String) {
        let Some((peer, agent)) = self
            .context
            .as_ref()
            .and_then(|ctx| ctx.agent.map(|agent| (ctx.peer, agent)))
        else {
            return;
        };
        let record = self.identities.get(agent);
        let name = record
            .as_ref()
            .map_or_else(|| agent.to_string(), |r| r.name.clone());
        let subtitle = record
            .and_then(|r| r.handle)
            .map(|handle| format!("@{handle}"))
            .unwrap_or_default();

        self.generation += 1;
        let generation = self.generation;
        let (title, title_rx) = watch::channel(name);
        let callbacks = Arc::new(SessionCallbacks {
            generation,
            completions: self.tasks.sender(),
            links: self.links.clone(),
            opener: Arc::clone(&self.opener),
        });

        self.registry.insert(self.id, self.commands.clone());
        let surface = self.surfaces.show(SurfaceParams {
            url: grant.url,
            storage_path: self.config.storage_path.clone(),
            title: title_rx,
            subtitle,
            callbacks,
            theme: Arc::clone(&self.theme),
        });
        let keepalive = grant
            .query_id
            .map(|query_id| Keepalive::new(query_id, self.config.prolong_interval()));

        tracing::info!(%peer, %agent, query_id = ?grant.query_id, "Session live");
        self.live = Some(LiveSession {
            generation,
            query_id: grant.query_id,
            button_text,
            surface,
            title,
            keepalive,
        });
    }

    fn on_surface(&mut self, generation: u64, event: SurfaceEvent) {
        if self.live.as_ref().map(|live| live.generation) != Some(generation) {
            tracing::debug!(generation, "Ignoring event from a stale surface");
            return;
        }
        match event {
            SurfaceEvent::Close => {
                tracing::debug!("Surface closed by user");
                self.cancel();
            }
            SurfaceEvent::Data(data) => self.send_data(data),
        }
    }

    /// Only simple sessions submit data, and doing so ends them.
    fn send_data(&mut self, data: Bytes) {
        let (Some(ctx), Some(live)) = (self.context.as_ref(), self.live.as_ref()) else {
            return;
        };
        let Some(agent) = ctx.agent else {
            return;
        };
        if ctx.peer != agent || live.query_id.is_some() {
            tracing::debug!(%agent, "Ignoring data from a non-simple session");
            return;
        }
        let payload = SessionData {
            agent,
            random_id: Uuid::new_v4().as_u64_pair().0,
            button_text: live.button_text.clone(),
            data,
        };
        let api = Arc::clone(&self.api);
        self.tasks.detach(
            async move { api.send_session_data(payload).await },
            Completion::DataSent,
        );
        self.cancel();
    }

    fn result_sent(&mut self, query_id: u64) {
        if self.live.as_ref().and_then(|live| live.query_id) == Some(query_id) {
            tracing::debug!(query_id, "Session result consumed");
            self.cancel();
        }
    }

    /// Keepalive tick: replace any prolong request still in flight.
    fn prolong(&mut self) {
        let Some((peer, agent)) = self
            .context
            .as_ref()
            .and_then(|ctx| ctx.agent.map(|agent| (ctx.peer, agent)))
        else {
            return;
        };
        let Some(keepalive) = self.live.as_mut().and_then(|live| live.keepalive.as_mut()) else {
            return;
        };
        if keepalive.pending.take().is_some() {
            tracing::debug!(query_id = keepalive.query_id, "Previous prolong request still pending");
        }
        let request = ProlongRequest {
            context: peer,
            agent,
            query_id: keepalive.query_id,
            silent: true,
        };
        let api = Arc::clone(&self.api);
        keepalive.pending = Some(self.tasks.spawn(
            async move { api.prolong_session(request).await },
            |id, result| Completion::Prolong { id, result },
        ));
    }

    fn on_prolong(&mut self, id: RequestId, result: Result<(), ApiError>) {
        let Some(keepalive) = self.live.as_mut().and_then(|live| live.keepalive.as_mut()) else {
            return;
        };
        if settle(&mut keepalive.pending, id) {
            if let Err(e) = result {
                tracing::debug!(query_id = keepalive.query_id, "Prolong failed: {e}");
            }
        }
    }

    /// Directory refresh; a no-op while one is in flight.
    pub(super) fn refresh_directory(&mut self) {
        if self.directory.is_refreshing() {
            return;
        }
        let api = Arc::clone(&self.api);
        let hash = self.directory.hash();
        let pending = self.tasks.spawn(
            async move { api.get_attach_agents(hash).await },
            |id, result| Completion::Directory { id, result },
        );
        self.directory.begin(pending);
    }

    fn on_directory(&mut self, id: RequestId, result: Result<AgentsSnapshot, ApiError>) {
        if !self.directory.settle(id) {
            return;
        }
        match result {
            Ok(mut snapshot) => {
                if let AgentsSnapshot::Full { peers, .. } = &mut snapshot {
                    self.ingest(std::mem::take(peers));
                }
                self.directory
                    .apply(snapshot, &self.identities, self.icons.as_ref());
            }
            Err(e) => tracing::debug!("Directory refresh failed: {e}"),
        }
    }

    /// Add peer records to the identity cache and follow renames of the
    /// live agent.
    pub(super) fn ingest(&self, peers: Vec<PeerRecord>) {
        if self.identities.ingest(peers) == 0 {
            return;
        }
        let Some(live) = &self.live else {
            return;
        };
        let Some(record) = self
            .context
            .as_ref()
            .and_then(|ctx| ctx.agent)
            .and_then(|agent| self.identities.get(agent))
        else {
            return;
        };
        live.title.send_if_modified(|title| {
            if *title == record.name {
                false
            } else {
                title.clone_from(&record.name);
                true
            }
        });
    }
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}
