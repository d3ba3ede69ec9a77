//! Adding agents to and removing them from the attach surface.

use std::sync::Arc;

use miniapp_core::{
    ApiError, ConsentDecision, Notice, PeerId, WebViewButton,
    api::{AgentStatus, RegistrationState},
};

use super::{
    TrustCheck,
    actor::{Actor, Completion},
    pending::{Pending, RequestId},
};
use crate::directory::parse_agent;

/// Registration-status request in flight.
pub(crate) struct RegistrationRequest {
    pub(crate) agent: PeerId,
    /// Context to open once the agent is on the surface.
    pub(crate) peer: Option<PeerId>,
    pub(crate) start_param: String,
    pub(crate) pending: Pending,
}

/// "Add to attach menu" prompt on screen.
pub(crate) struct AddConfirmation {
    pub(crate) agent: PeerId,
    pub(crate) open: Option<(PeerId, String)>,
    pub(crate) pending: Pending,
}

/// Registration work. A plain add outlives session cancellation; work that
/// would open a session afterwards does not.
#[derive(Default)]
pub(crate) struct Registration {
    pub(crate) request: Option<RegistrationRequest>,
    pub(crate) confirmation: Option<AddConfirmation>,
}

impl Registration {
    /// Drop the work whose follow-up is a session open.
    pub(crate) fn release_session(&mut self) {
        if self.request.take_if(|r| r.peer.is_some()).is_some() {
            tracing::debug!("Dropped registration status request of the closed session");
        }
        if self.confirmation.take_if(|c| c.open.is_some()).is_some() {
            tracing::debug!("Dropped add prompt of the closed session");
        }
    }
}

/// What to do after a successful toggle.
#[derive(Debug)]
pub(crate) enum AfterToggle {
    Nothing,
    /// Open against `(peer, start_param)` if given, then report "added".
    /// `epoch` is the session the toggle was issued for.
    Added {
        open: Option<(PeerId, String)>,
        epoch: u64,
    },
    Removed,
}

impl AfterToggle {
    /// Whether the session this follow-up belongs to has been cancelled.
    fn is_stale(&self, current: u64) -> bool {
        matches!(self, Self::Added { epoch, .. } if *epoch != current)
    }
}

impl Actor {
    pub(super) fn request_add_to_surface(
        &mut self,
        peer: Option<PeerId>,
        agent: PeerId,
        start_param: String,
    ) {
        if !self
            .identities
            .get(agent)
            .is_some_and(|record| record.supports_attach())
        {
            tracing::debug!(%agent, "Agent cannot be added to the attach surface");
            self.notifier.notify(Notice::Unsupported);
            return;
        }
        if let Some(request) = self
            .registration
            .request
            .as_mut()
            .filter(|request| request.agent == agent)
        {
            tracing::debug!(%agent, "Registration status already requested");
            request.peer = peer;
            request.start_param = start_param;
            return;
        }

        let api = Arc::clone(&self.api);
        let pending = self.tasks.spawn(
            async move { api.get_attach_agent(agent).await },
            |id, result| Completion::Registration { id, result },
        );
        self.registration.request = Some(RegistrationRequest {
            agent,
            peer,
            start_param,
            pending,
        });
    }

    pub(super) async fn on_registration_status(
        &mut self,
        id: RequestId,
        result: Result<AgentStatus, ApiError>,
    ) {
        let Some(request) = self
            .registration
            .request
            .take_if(|request| request.pending.id() == id)
        else {
            return;
        };
        let status = match result {
            Ok(status) => status,
            Err(e) => {
                tracing::debug!(agent = %request.agent, "Registration status failed: {e}");
                self.notifier.notify(Notice::Unsupported);
                return;
            }
        };

        self.ingest(status.peers);
        if status.agent.id != request.agent {
            tracing::warn!(
                requested = %request.agent,
                received = %status.agent.id,
                "Registration status for a different agent"
            );
            return;
        }
        let Some(agent) = parse_agent(status.agent, &self.identities) else {
            return;
        };
        let open = request.peer.map(|peer| (peer, request.start_param));

        match status.state {
            RegistrationState::Active => {
                self.refresh_directory();
                match open {
                    Some((peer, start_param)) => {
                        self.open(
                            peer,
                            agent.id,
                            WebViewButton::with_start_param(start_param),
                            TrustCheck::Granted,
                        )
                        .await;
                    }
                    None => self.notifier.notify(Notice::AlreadyAdded),
                }
            }
            RegistrationState::Inactive | RegistrationState::NotRegistered => {
                let gate = self.trust.clone();
                let name = agent.name;
                let pending = self.tasks.spawn(
                    async move { gate.confirm_add(name).await },
                    |id, decision| Completion::AddConsent { id, decision },
                );
                self.registration.confirmation = Some(AddConfirmation {
                    agent: agent.id,
                    open,
                    pending,
                });
            }
        }
    }

    pub(super) fn on_add_consent(&mut self, id: RequestId, decision: ConsentDecision) {
        let Some(confirmation) = self
            .registration
            .confirmation
            .take_if(|confirmation| confirmation.pending.id() == id)
        else {
            return;
        };
        if decision.is_accepted() {
            self.toggle(
                confirmation.agent,
                true,
                AfterToggle::Added {
                    open: confirmation.open,
                    epoch: self.epoch,
                },
            );
        } else {
            tracing::debug!(agent = %confirmation.agent, "Add to attach surface declined");
        }
    }

    pub(super) fn toggle(&mut self, agent: PeerId, enabled: bool, then: AfterToggle) {
        tracing::debug!(%agent, enabled, "Toggling attach agent");
        let api = Arc::clone(&self.api);
        self.tasks.detach(
            async move { api.toggle_attach_agent(agent, enabled).await },
            move |result| Completion::Toggle {
                agent,
                enabled,
                then,
                result,
            },
        );
    }

    pub(super) async fn on_toggled(
        &mut self,
        agent: PeerId,
        enabled: bool,
        then: AfterToggle,
        result: Result<(), ApiError>,
    ) {
        let stale = then.is_stale(self.epoch);
        if let Err(e) = result {
            if stale {
                tracing::debug!(%agent, enabled, "Toggle for a closed session failed: {e}");
            } else {
                tracing::info!(%agent, enabled, "Toggle failed, cancelling session: {e}");
                self.cancel();
            }
            return;
        }
        self.refresh_directory();
        match then {
            AfterToggle::Nothing => {}
            AfterToggle::Added { open, .. } => {
                if stale {
                    tracing::debug!(%agent, "Session closed during toggle, not opening");
                } else if let Some((peer, start_param)) = open {
                    self.open(
                        peer,
                        agent,
                        WebViewButton::with_start_param(start_param),
                        TrustCheck::Granted,
                    )
                    .await;
                }
                self.notifier.notify(Notice::Added);
            }
            AfterToggle::Removed => self.notifier.notify(Notice::Removed),
        }
    }
}
