//! Common test setup.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use api::ApiState;
use auth_client::AuthClient;
use backplane::{Backplane, LocalBackplane};
use event_store::{BehaviorStore, MemoryStore, SessionCache};
use gateway::{GatewayConfig, GatewayState};

use crate::mocks::FailingStore;

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Test context wiring the real gateway and API routers over the
/// in-memory store and mock auth.
pub struct TestContext {
    pub store: Arc<FailingStore>,
    pub sessions: SessionCache,
    pub backplane: Arc<LocalBackplane>,
    pub auth: AuthClient,
    pub gateway_state: Arc<GatewayState>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_gateway_config(GatewayConfig::default())
    }

    pub fn with_gateway_config(config: GatewayConfig) -> Self {
        let store = Arc::new(FailingStore::new());
        let sessions = SessionCache::new();
        let backplane = Arc::new(LocalBackplane::new());
        let auth = AuthClient::new("mock");

        let gateway_state = Arc::new(GatewayState::new(
            config,
            auth.clone(),
            store.clone() as Arc<dyn BehaviorStore>,
            backplane.clone() as Arc<dyn Backplane>,
            sessions.clone(),
        ));

        Self {
            store,
            sessions,
            backplane,
            auth,
            gateway_state,
        }
    }

    /// The query API router alone, for axum-test drivers.
    pub fn api_router(&self) -> Router {
        api::router(ApiState::new(
            self.store.clone() as Arc<dyn BehaviorStore>,
            self.auth.clone(),
            self.sessions.clone(),
        ))
    }

    /// The full application router as the binary assembles it.
    pub fn app(&self) -> Router {
        gateway::router(self.gateway_state.clone()).merge(self.api_router())
    }

    /// Backing store for seeding and assertions.
    pub fn memory(&self) -> &MemoryStore {
        self.store.inner()
    }

    pub fn set_store_failure(&self, fail: bool) {
        self.store.set_fail_writes(fail);
    }

    /// Serve the app on an ephemeral port for real-socket tests.
    pub async fn serve(&self) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral port");
        let addr = listener.local_addr().expect("local addr");
        let app = self.app();
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .expect("test server");
        });
        addr
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Open a client socket against a served gateway.
pub async fn ws_connect(
    addr: SocketAddr,
    token: Option<&str>,
) -> Result<WsClient, tokio_tungstenite::tungstenite::Error> {
    let url = match token {
        Some(token) => format!("ws://{}/ws?token={}", addr, token),
        None => format!("ws://{}/ws", addr),
    };
    connect_async(url).await.map(|(stream, _)| stream)
}

/// Next text frame as JSON; panics on close or transport error.
pub async fn next_json(ws: &mut WsClient) -> serde_json::Value {
    loop {
        match ws.next().await.expect("socket closed").expect("ws error") {
            Message::Text(text) => return serde_json::from_str(&text).expect("invalid json"),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {:?}", other),
        }
    }
}

/// Read frames until `count` acks have been seen; returns just the acks.
pub async fn collect_acks(ws: &mut WsClient, count: usize) -> Vec<serde_json::Value> {
    let mut acks = Vec::with_capacity(count);
    while acks.len() < count {
        let frame = next_json(ws).await;
        if frame["event"] == "ack" {
            acks.push(frame);
        }
    }
    acks
}
