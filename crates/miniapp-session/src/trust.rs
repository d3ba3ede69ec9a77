//! Trust gate: consent before an agent may open a session.

use std::sync::Arc;

use miniapp_core::{ConsentDecision, ConsentPrompt, ConsentRequest, PeerRecord, TrustStore};

/// Decides whether opening a session needs the user's consent, and records
/// consent once given.
#[derive(Clone)]
pub struct TrustGate {
    store: Arc<dyn TrustStore>,
    prompt: Arc<dyn ConsentPrompt>,
}

impl TrustGate {
    #[must_use]
    pub fn new(store: Arc<dyn TrustStore>, prompt: Arc<dyn ConsentPrompt>) -> Self {
        Self { store, prompt }
    }

    /// False for verified agents and agents the user already trusted.
    ///
    /// A failing store counts as "not trusted".
    pub async fn requires_confirmation(&self, agent: &PeerRecord) -> bool {
        if agent.is_verified() {
            return false;
        }
        match self.store.is_trusted(agent.id).await {
            Ok(trusted) => !trusted,
            Err(e) => {
                tracing::warn!(agent = %agent.id, "Trust lookup failed: {e}");
                true
            }
        }
    }

    /// Ask the user. The trust record is written only on acceptance.
    pub async fn confirm(&self, agent: &PeerRecord) -> ConsentDecision {
        let decision = self
            .prompt
            .ask(ConsentRequest::OpenSession {
                agent_name: agent.name.clone(),
            })
            .await;
        if decision.is_accepted() {
            if let Err(e) = self.store.mark_trusted(agent.id).await {
                tracing::warn!(agent = %agent.id, "Failed to persist trust: {e}");
            }
        }
        tracing::debug!(agent = %agent.id, ?decision, "Consent answered");
        decision
    }

    /// Ask the user to add an agent to the attach surface.
    pub async fn confirm_add(&self, agent_name: String) -> ConsentDecision {
        self.prompt
            .ask(ConsentRequest::AddToSurface { agent_name })
            .await
    }
}

#[cfg(test)]
mod tests {
    use miniapp_core::{BotInfo, PeerId, PeerKind};

    use super::*;
    use crate::{storage::MemoryTrustStore, testing::FakePrompt};

    fn bot(verified: bool) -> PeerRecord {
        PeerRecord {
            id: PeerId(11),
            handle: Some("shopbot".into()),
            name: "Shop".into(),
            kind: PeerKind::Bot(BotInfo {
                supports_attach: true,
                verified,
                menu_button: None,
            }),
        }
    }

    #[tokio::test]
    async fn verified_agents_skip_confirmation() {
        let gate = TrustGate::new(
            Arc::new(MemoryTrustStore::new()),
            Arc::new(FakePrompt::new()),
        );
        assert!(!gate.requires_confirmation(&bot(true)).await);
        assert!(gate.requires_confirmation(&bot(false)).await);
    }

    #[tokio::test]
    async fn trusted_agents_skip_confirmation() {
        let store = Arc::new(MemoryTrustStore::with_trusted([PeerId(11)]));
        let gate = TrustGate::new(store, Arc::new(FakePrompt::new()));
        assert!(!gate.requires_confirmation(&bot(false)).await);
    }

    #[tokio::test]
    async fn accept_persists_and_decline_does_not() {
        let store = Arc::new(MemoryTrustStore::new());
        let prompt = Arc::new(FakePrompt::new());
        let gate = TrustGate::new(
            Arc::clone(&store) as Arc<dyn TrustStore>,
            Arc::clone(&prompt) as Arc<dyn ConsentPrompt>,
        );

        prompt.answer(ConsentDecision::Declined);
        assert_eq!(gate.confirm(&bot(false)).await, ConsentDecision::Declined);
        assert!(store.is_empty());

        prompt.answer(ConsentDecision::Accepted);
        assert_eq!(gate.confirm(&bot(false)).await, ConsentDecision::Accepted);
        assert!(store.is_trusted(PeerId(11)).await.unwrap());

        let asked = prompt.asked();
        assert_eq!(asked.len(), 2);
        assert!(asked[0].text().contains("Shop"));
    }
}
