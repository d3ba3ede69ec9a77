//! Console walkthrough of a mini-app session against an in-process remote.
//!
//! Run with: cargo run -p console-demo [config.json]
//!
//! Set `RUST_LOG=debug` to watch the orchestrator's transitions.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use futures::StreamExt;
use miniapp_core::{
    Agent, ApiError, AttachApi, BotInfo, MenuButton, Notice, Notifier, PeerId, PeerKind,
    PeerRecord, Surface, SurfaceHost, SurfaceParams, WebViewButton,
    api::{
        AgentStatus, AgentsSnapshot, OpenRequest, ProlongRequest, RegistrationState, ResolvedPeer,
        SessionData, SessionGrant, SimpleGrant, SimpleOpenRequest,
    },
    consent::AutoAccept,
};
use miniapp_session::{
    OrchestratorBuilder, SessionConfig, SessionRegistry, storage::MemoryTrustStore,
};
use tokio::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SHOP: PeerId = PeerId(7);
const CHAT: PeerId = PeerId(1);

fn shop_record() -> PeerRecord {
    PeerRecord {
        id: SHOP,
        handle: Some("shopbot".to_string()),
        name: "Shop".to_string(),
        kind: PeerKind::Bot(BotInfo {
            supports_attach: true,
            verified: false,
            menu_button: Some(MenuButton {
                url: "https://shop.example/menu".to_string(),
                text: "Catalog".to_string(),
            }),
        }),
    }
}

fn shop_agent(inactive: bool) -> Agent {
    Agent {
        id: SHOP,
        name: "Shop".to_string(),
        icon: None,
        inactive,
    }
}

/// Remote that knows one bot and grants every session.
#[derive(Default)]
struct DemoApi {
    next_query: AtomicU64,
    attached: Mutex<bool>,
}

#[async_trait]
impl AttachApi for DemoApi {
    async fn get_attach_agents(&self, hash: i64) -> Result<AgentsSnapshot, ApiError> {
        let attached = *self.attached.lock().await;
        let current = i64::from(attached) + 1;
        if hash == current {
            return Ok(AgentsSnapshot::NotModified);
        }
        Ok(AgentsSnapshot::Full {
            hash: current,
            agents: if attached { vec![shop_agent(false)] } else { vec![] },
            peers: vec![shop_record()],
        })
    }

    async fn get_attach_agent(&self, agent: PeerId) -> Result<AgentStatus, ApiError> {
        if agent != SHOP {
            return Err(ApiError::rejected(400, "BOT_INVALID"));
        }
        let attached = *self.attached.lock().await;
        Ok(AgentStatus {
            agent: shop_agent(!attached),
            state: if attached {
                RegistrationState::Active
            } else {
                RegistrationState::NotRegistered
            },
            peers: vec![shop_record()],
        })
    }

    async fn toggle_attach_agent(&self, _agent: PeerId, enabled: bool) -> Result<(), ApiError> {
        *self.attached.lock().await = enabled;
        Ok(())
    }

    async fn request_session(&self, request: OpenRequest) -> Result<SessionGrant, ApiError> {
        let query_id = self.next_query.fetch_add(1, Ordering::Relaxed) + 1;
        let start = request.start_param.unwrap_or_default();
        Ok(SessionGrant {
            query_id,
            url: format!("https://shop.example/app?start={start}"),
        })
    }

    async fn request_simple_session(
        &self,
        request: SimpleOpenRequest,
    ) -> Result<SimpleGrant, ApiError> {
        Ok(SimpleGrant { url: request.url })
    }

    async fn prolong_session(&self, request: ProlongRequest) -> Result<(), ApiError> {
        tracing::info!(query_id = request.query_id, "Remote: session prolonged");
        Ok(())
    }

    async fn resolve_handle(&self, handle: &str) -> Result<ResolvedPeer, ApiError> {
        if handle.eq_ignore_ascii_case("shopbot") {
            Ok(ResolvedPeer {
                peer: Some(SHOP),
                peers: vec![shop_record()],
            })
        } else {
            Err(ApiError::rejected(400, "USERNAME_NOT_OCCUPIED"))
        }
    }

    async fn send_session_data(&self, data: SessionData) -> Result<(), ApiError> {
        tracing::info!(bytes = data.data.len(), "Remote: received session data");
        Ok(())
    }
}

/// Prints surfaces instead of rendering them.
struct ConsoleSurfaces;

struct ConsoleSurface {
    url: String,
}

impl Surface for ConsoleSurface {
    fn request_activate(&self) {
        println!("[surface] activate {}", self.url);
    }
}

impl Drop for ConsoleSurface {
    fn drop(&mut self) {
        println!("[surface] dismissed {}", self.url);
    }
}

impl SurfaceHost for ConsoleSurfaces {
    fn show(&self, params: SurfaceParams) -> Box<dyn Surface> {
        println!(
            "[surface] show {} \"{}\" {}",
            params.url,
            *params.title.borrow(),
            params.subtitle
        );
        Box::new(ConsoleSurface { url: params.url })
    }
}

struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, notice: Notice) {
        println!("[notice] {notice}");
    }
}

async fn load_config() -> anyhow::Result<SessionConfig> {
    match std::env::args().nth(1) {
        Some(path) => {
            let json = tokio::fs::read_to_string(&path).await?;
            Ok(SessionConfig::from_json_str(&json)?)
        }
        None => Ok(SessionConfig {
            prolong_interval_secs: 1,
            ..SessionConfig::default()
        }),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = load_config().await?;
    let registry = Arc::new(SessionRegistry::new());
    let orchestrator = OrchestratorBuilder::new(
        Arc::new(DemoApi::default()),
        Arc::new(ConsoleSurfaces),
        Arc::new(AutoAccept),
        Arc::new(ConsoleNotifier),
        Arc::new(MemoryTrustStore::new()),
    )
    .registry(Arc::clone(&registry))
    .config(config)
    .spawn();

    let mut updates = orchestrator.agent_updates();
    tokio::spawn(async move {
        while let Some(agents) = updates.next().await {
            let names: Vec<&str> = agents.iter().map(|a| a.name.as_str()).collect();
            println!("[directory] {names:?}");
        }
    });

    orchestrator.refresh_directory()?;
    orchestrator.open_by_handle(CHAT, "@ShopBot", "welcome")?;
    tokio::time::sleep(Duration::from_millis(2500)).await;
    let status = orchestrator.status().await?;
    println!("[status] {:?} query={:?}", status.state, status.query_id);

    orchestrator.open_menu(SHOP)?;
    tokio::time::sleep(Duration::from_millis(200)).await;
    println!("[status] {:?}", orchestrator.state().await?);

    orchestrator.open_simple(
        SHOP,
        WebViewButton {
            url: "https://shop.example/form".to_string(),
            text: "Order".to_string(),
            start_param: String::new(),
        },
    )?;
    tokio::time::sleep(Duration::from_millis(200)).await;

    println!("[registry] {} live session(s)", registry.len());
    registry.cancel_all();
    tokio::time::sleep(Duration::from_millis(100)).await;
    println!("[status] {:?}", orchestrator.state().await?);

    orchestrator.remove_from_surface(SHOP)?;
    tokio::time::sleep(Duration::from_millis(200)).await;
    Ok(())
}
