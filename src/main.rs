//! Pulse behavior tracking pipeline
//!
//! Real-time pipeline handling:
//! - WebSocket gateway with auth, sessions, and connection rate limiting
//! - Event normalization and enrichment for twelve behavior kinds
//! - ClickHouse event/session store with aggregation queries
//! - Broadcast fan-out to identity topics and the analytics room
//! - HTTP analytics query API

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};

use api::ApiState;
use auth_client::AuthClient;
use backplane::{Backplane, LocalBackplane};
use event_store::{
    init_schema, BehaviorStore, ClickHouseClient, ClickHouseStore, MemoryStore, SessionCache,
    StoreConfig,
};
use gateway::{GatewayConfig, GatewayState};
use telemetry::{health, init_tracing_from_env};

/// Application configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Config {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,

    /// Auth service URL for token validation; "mock" validates locally
    #[serde(default = "default_auth_url")]
    auth_url: String,

    #[serde(default)]
    gateway: GatewayConfig,

    #[serde(default)]
    store: StoreConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_auth_url() -> String {
    "mock".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            auth_url: default_auth_url(),
            gateway: GatewayConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // rustls 0.23+ requires explicit crypto provider selection
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing_from_env();

    info!("Starting Pulse v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;
    info!(
        backend = %config.store.backend,
        permissive = config.gateway.permissive,
        "Loaded configuration"
    );

    let store = build_store(&config.store).await?;
    check_health(store.as_ref()).await;

    let auth = AuthClient::new(&config.auth_url);
    health().auth.set_healthy();

    let sessions = SessionCache::new();
    let backplane: Arc<dyn Backplane> = Arc::new(LocalBackplane::new());

    let gateway_state = Arc::new(GatewayState::new(
        config.gateway.clone(),
        auth.clone(),
        store.clone(),
        backplane,
        sessions.clone(),
    ));
    let api_state = ApiState::new(store, auth, sessions);

    let app = gateway::router(gateway_state).merge(api::router(api_state));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid server address")?;

    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    // ConnectInfo gives the upgrade handler the peer address
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    info!("Shutdown complete");
    Ok(())
}

/// Build the configured store backend.
async fn build_store(config: &StoreConfig) -> Result<Arc<dyn BehaviorStore>> {
    match config.backend.as_str() {
        "memory" => {
            info!("Using in-memory store (single instance only)");
            Ok(Arc::new(MemoryStore::new()))
        }
        "clickhouse" => {
            let client = ClickHouseClient::new(config.clone());
            if let Err(e) = init_schema(&client).await {
                error!("Failed to initialize ClickHouse schema: {}", e);
                // Continue anyway - schema might already exist
            }
            Ok(Arc::new(ClickHouseStore::new(client)))
        }
        other => anyhow::bail!("unknown store backend: {}", other),
    }
}

/// Check store health on startup.
async fn check_health(store: &dyn BehaviorStore) {
    match store.ping().await {
        Ok(()) => {
            health().store.set_healthy();
            info!("Store connection: healthy");
        }
        Err(e) => {
            health().store.set_unhealthy(e.to_string());
            error!("Store connection: unhealthy: {}", e);
        }
    }
}

/// Load configuration from files and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        .add_source(config::Config::try_from(&Config::default())?)
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("PULSE")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: Config = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    // Manual overrides for nested config from environment
    // The config crate's nested parsing doesn't work reliably with underscored field names
    if let Ok(backend) = std::env::var("PULSE_STORE_BACKEND") {
        config.store.backend = backend;
    }
    if let Ok(url) = std::env::var("PULSE_STORE_URL") {
        config.store.url = url;
    }
    if let Ok(database) = std::env::var("PULSE_STORE_DATABASE") {
        config.store.database = database;
    }
    if let Ok(username) = std::env::var("PULSE_STORE_USERNAME") {
        config.store.username = Some(username);
    }
    if let Ok(password) = std::env::var("PULSE_STORE_PASSWORD") {
        config.store.password = Some(password);
    }
    if let Ok(permissive) = std::env::var("PULSE_GATEWAY_PERMISSIVE") {
        config.gateway.permissive = permissive == "true" || permissive == "1";
    }
    if let Ok(endpoint) = std::env::var("PULSE_GATEWAY_GEO_ENDPOINT") {
        config.gateway.geo_endpoint = endpoint;
    }
    if let Ok(auth_url) = std::env::var("PULSE_AUTH_URL") {
        config.auth_url = auth_url;
    }

    Ok(config)
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
