//! Scripted collaborators for unit tests.

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use bytes::Bytes;
use miniapp_core::{
    ApiError, AttachApi, BotInfo, ConsentDecision, ConsentPrompt, ConsentRequest, IconCache,
    IconRef, MenuButton, Notice, Notifier, PeerId, PeerKind, PeerRecord, Surface,
    SurfaceCallbacks, SurfaceHost, SurfaceParams,
    api::{
        AgentStatus, AgentsSnapshot, OpenRequest, ProlongRequest, ResolvedPeer, SessionData,
        SessionGrant, SimpleGrant, SimpleOpenRequest,
    },
};
use tokio::sync::{oneshot, watch};

use crate::{
    config::SessionConfig,
    identity::IdentityCache,
    orchestrator::{Orchestrator, OrchestratorBuilder, SessionStatus},
    registry::SessionRegistry,
    storage::MemoryTrustStore,
};

/// Remote call made against [`FakeApi`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Agents { hash: i64 },
    Agent(PeerId),
    Toggle { agent: PeerId, enabled: bool },
    Open(OpenRequest),
    OpenSimple(SimpleOpenRequest),
    Prolong(ProlongRequest),
    Resolve(String),
    Data(SessionData),
}

enum Reply<T> {
    Now(Result<T, ApiError>),
    Later(oneshot::Receiver<Result<T, ApiError>>),
}

/// Queue of replies for one remote method. Calls beyond the queue never
/// complete.
pub(crate) struct Script<T> {
    replies: Mutex<VecDeque<Reply<T>>>,
}

impl<T> Default for Script<T> {
    fn default() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
        }
    }
}

impl<T> Script<T> {
    pub(crate) fn ok(&self, value: T) {
        self.push(Reply::Now(Ok(value)));
    }

    pub(crate) fn err(&self, error: ApiError) {
        self.push(Reply::Now(Err(error)));
    }

    /// Reply once the returned sender fires.
    pub(crate) fn later(&self) -> oneshot::Sender<Result<T, ApiError>> {
        let (tx, rx) = oneshot::channel();
        self.push(Reply::Later(rx));
        tx
    }

    fn push(&self, reply: Reply<T>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    async fn next(&self) -> Result<T, ApiError> {
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Now(result)) => result,
            Some(Reply::Later(rx)) => match rx.await {
                Ok(result) => result,
                Err(_) => std::future::pending().await,
            },
            None => std::future::pending().await,
        }
    }
}

/// Decrements a counter when the call future is dropped.
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub(crate) struct FakeApi {
    calls: Mutex<Vec<Call>>,
    pub(crate) agents: Script<AgentsSnapshot>,
    pub(crate) agent: Script<AgentStatus>,
    pub(crate) toggle: Script<()>,
    pub(crate) open: Script<SessionGrant>,
    pub(crate) simple: Script<SimpleGrant>,
    pub(crate) prolong: Script<()>,
    pub(crate) resolve: Script<ResolvedPeer>,
    pub(crate) data: Script<()>,
    prolongs_in_flight: Arc<AtomicUsize>,
}

impl FakeApi {
    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| matches(c)).count()
    }

    pub(crate) fn prolongs_in_flight(&self) -> usize {
        self.prolongs_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl AttachApi for FakeApi {
    async fn get_attach_agents(&self, hash: i64) -> Result<AgentsSnapshot, ApiError> {
        self.record(Call::Agents { hash });
        self.agents.next().await
    }

    async fn get_attach_agent(&self, agent: PeerId) -> Result<AgentStatus, ApiError> {
        self.record(Call::Agent(agent));
        self.agent.next().await
    }

    async fn toggle_attach_agent(&self, agent: PeerId, enabled: bool) -> Result<(), ApiError> {
        self.record(Call::Toggle { agent, enabled });
        self.toggle.next().await
    }

    async fn request_session(&self, request: OpenRequest) -> Result<SessionGrant, ApiError> {
        self.record(Call::Open(request));
        self.open.next().await
    }

    async fn request_simple_session(
        &self,
        request: SimpleOpenRequest,
    ) -> Result<SimpleGrant, ApiError> {
        self.record(Call::OpenSimple(request));
        self.simple.next().await
    }

    async fn prolong_session(&self, request: ProlongRequest) -> Result<(), ApiError> {
        self.record(Call::Prolong(request));
        let _guard = InFlight::enter(&self.prolongs_in_flight);
        self.prolong.next().await
    }

    async fn resolve_handle(&self, handle: &str) -> Result<ResolvedPeer, ApiError> {
        self.record(Call::Resolve(handle.to_string()));
        self.resolve.next().await
    }

    async fn send_session_data(&self, data: SessionData) -> Result<(), ApiError> {
        self.record(Call::Data(data));
        self.data.next().await
    }
}

/// A surface shown by [`FakeSurfaceHost`].
pub(crate) struct ShownSurface {
    pub(crate) url: String,
    pub(crate) subtitle: String,
    pub(crate) title: watch::Receiver<String>,
    pub(crate) callbacks: Arc<dyn SurfaceCallbacks>,
    activations: AtomicUsize,
    dismissed: AtomicBool,
}

impl ShownSurface {
    pub(crate) fn activations(&self) -> usize {
        self.activations.load(Ordering::SeqCst)
    }

    pub(crate) fn is_dismissed(&self) -> bool {
        self.dismissed.load(Ordering::SeqCst)
    }

    pub(crate) fn close(&self) {
        self.callbacks.close();
    }

    pub(crate) fn submit(&self, data: &'static [u8]) {
        self.callbacks.send_data(Bytes::from_static(data));
    }
}

struct FakeSurface(Arc<ShownSurface>);

impl Surface for FakeSurface {
    fn request_activate(&self) {
        self.0.activations.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for FakeSurface {
    fn drop(&mut self) {
        self.0.dismissed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub(crate) struct FakeSurfaceHost {
    shown: Mutex<Vec<Arc<ShownSurface>>>,
}

impl FakeSurfaceHost {
    pub(crate) fn shown(&self) -> Vec<Arc<ShownSurface>> {
        self.shown.lock().unwrap().clone()
    }

    pub(crate) fn last(&self) -> Arc<ShownSurface> {
        Arc::clone(self.shown.lock().unwrap().last().unwrap())
    }
}

impl SurfaceHost for FakeSurfaceHost {
    fn show(&self, params: SurfaceParams) -> Box<dyn Surface> {
        let shown = Arc::new(ShownSurface {
            url: params.url,
            subtitle: params.subtitle,
            title: params.title,
            callbacks: params.callbacks,
            activations: AtomicUsize::new(0),
            dismissed: AtomicBool::new(false),
        });
        self.shown.lock().unwrap().push(Arc::clone(&shown));
        Box::new(FakeSurface(shown))
    }
}

/// Consent prompt answering from a queue. With an empty queue the prompt
/// stays open forever.
#[derive(Default)]
pub(crate) struct FakePrompt {
    answers: Mutex<VecDeque<ConsentDecision>>,
    asked: Mutex<Vec<ConsentRequest>>,
}

impl FakePrompt {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn answer(&self, decision: ConsentDecision) {
        self.answers.lock().unwrap().push_back(decision);
    }

    pub(crate) fn asked(&self) -> Vec<ConsentRequest> {
        self.asked.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConsentPrompt for FakePrompt {
    async fn ask(&self, request: ConsentRequest) -> ConsentDecision {
        self.asked.lock().unwrap().push(request);
        let answer = self.answers.lock().unwrap().pop_front();
        match answer {
            Some(decision) => decision,
            None => std::future::pending().await,
        }
    }
}

#[derive(Default)]
pub(crate) struct RecordingNotifier(Mutex<Vec<Notice>>);

impl RecordingNotifier {
    pub(crate) fn notices(&self) -> Vec<Notice> {
        self.0.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.0.lock().unwrap().push(notice);
    }
}

#[derive(Default)]
pub(crate) struct RecordingIcons(Mutex<Vec<i64>>);

impl RecordingIcons {
    pub(crate) fn pinned(&self) -> Vec<i64> {
        self.0.lock().unwrap().clone()
    }
}

impl IconCache for RecordingIcons {
    fn pin(&self, icon: &IconRef) {
        self.0.lock().unwrap().push(icon.id);
    }
}

/// An attach-capable bot record.
pub(crate) fn bot(id: i64, handle: &str) -> PeerRecord {
    PeerRecord {
        id: PeerId(id),
        handle: Some(handle.to_string()),
        name: format!("Bot {id}"),
        kind: PeerKind::Bot(BotInfo {
            supports_attach: true,
            verified: false,
            menu_button: Some(MenuButton {
                url: format!("https://{handle}.example/menu"),
                text: "Menu".to_string(),
            }),
        }),
    }
}

pub(crate) fn user(id: i64, handle: &str) -> PeerRecord {
    PeerRecord {
        id: PeerId(id),
        handle: Some(handle.to_string()),
        name: format!("User {id}"),
        kind: PeerKind::User,
    }
}

/// An orchestrator wired to fakes.
pub(crate) struct Harness {
    pub(crate) api: Arc<FakeApi>,
    pub(crate) surfaces: Arc<FakeSurfaceHost>,
    pub(crate) prompt: Arc<FakePrompt>,
    pub(crate) notices: Arc<RecordingNotifier>,
    pub(crate) trust: Arc<MemoryTrustStore>,
    pub(crate) registry: Arc<SessionRegistry>,
    pub(crate) identities: Arc<IdentityCache>,
    pub(crate) orchestrator: Orchestrator,
}

impl Harness {
    pub(crate) fn new() -> Self {
        Self::with_registry(Arc::new(SessionRegistry::new()))
    }

    pub(crate) fn with_registry(registry: Arc<SessionRegistry>) -> Self {
        let api = Arc::new(FakeApi::default());
        let surfaces = Arc::new(FakeSurfaceHost::default());
        let prompt = Arc::new(FakePrompt::new());
        let notices = Arc::new(RecordingNotifier::default());
        let trust = Arc::new(MemoryTrustStore::new());
        let identities = Arc::new(IdentityCache::new());
        let orchestrator = OrchestratorBuilder::new(
            Arc::clone(&api) as Arc<dyn AttachApi>,
            Arc::clone(&surfaces) as Arc<dyn SurfaceHost>,
            Arc::clone(&prompt) as Arc<dyn ConsentPrompt>,
            Arc::clone(&notices) as Arc<dyn Notifier>,
            Arc::clone(&trust) as Arc<dyn miniapp_core::TrustStore>,
        )
        .registry(Arc::clone(&registry))
        .identities(Arc::clone(&identities))
        .config(SessionConfig {
            link_hosts: vec!["example.org".to_string()],
            ..SessionConfig::default()
        })
        .spawn();
        Self {
            api,
            surfaces,
            prompt,
            notices,
            trust,
            registry,
            identities,
            orchestrator,
        }
    }

    /// Let spawned requests and the orchestrator run until idle.
    pub(crate) async fn settle(&self) -> SessionStatus {
        for _ in 0..20 {
            tokio::task::yield_now().await;
            self.orchestrator.status().await.unwrap();
        }
        self.orchestrator.status().await.unwrap()
    }
}
