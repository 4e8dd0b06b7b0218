mod cache;
mod config;
mod db;
mod error;
mod middleware;
mod models;
mod routes;
mod services;

use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::cache::{KvCache, MemoryCache, RedisCache};
use crate::config::{Config, MutableConfig};
use crate::db::Database;
use crate::services::catalog::AppCatalog;
use crate::services::engine_client::EngineClient;
use crate::services::integration_store::IntegrationStore;
use crate::services::integration_sync::IntegrationSync;
use crate::services::integrations::IntegrationService;
use crate::services::node_cache::NodeCache;
use crate::services::oauth_flow::OAuthFlow;
use crate::services::oauth_state::OAuthStateStore;
use crate::services::provider_config::ProviderConfigResolver;
use crate::services::resources::ResourceCatalog;
use crate::services::settings::{AppSettingsStore, CredentialSettingsStore};
use crate::services::token_store::TokenStore;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: MutableConfig,
    pub engine: Arc<EngineClient>,
    pub node_cache: NodeCache,
    pub oauth: OAuthFlow,
    pub integrations: IntegrationService,
    pub resources: ResourceCatalog,
    pub catalog: AppCatalog,
}

impl AppState {
    /// Wire every service against one database, cache and HTTP client.
    pub fn new(
        config: Config,
        db: Database,
        cache: Arc<dyn KvCache>,
        http_client: reqwest::Client,
    ) -> anyhow::Result<Self> {
        let engine = Arc::new(EngineClient::new(
            &config.engine_base_url,
            config.engine_api_key.clone(),
            config.engine_timeout_secs,
        )?);

        let tokens = TokenStore::new(db.clone());
        let store = IntegrationStore::new(db.clone());
        let credentials = CredentialSettingsStore::new(db.clone());
        let sync = IntegrationSync::new(engine.clone(), store.clone(), config.product_name.clone());

        let oauth = OAuthFlow::new(
            http_client,
            ProviderConfigResolver::new(credentials.clone(), config.provider_credentials.clone()),
            credentials,
            OAuthStateStore::new(cache),
            tokens.clone(),
            AppSettingsStore::new(db.clone()),
            sync.clone(),
            config.default_oauth_redirect(),
        );

        Ok(Self {
            node_cache: NodeCache::new(db.clone(), engine.clone()),
            integrations: IntegrationService::new(store, sync, tokens.clone(), engine.clone()),
            resources: ResourceCatalog::new(engine.clone(), tokens),
            catalog: AppCatalog::new(db.clone()),
            oauth,
            engine,
            config: Arc::new(RwLock::new(config)),
            db,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let log_level = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info".to_string())
        .parse()
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting Flowbridge integration broker");

    let config = Config::from_env()?;
    info!("Configuration loaded from environment");

    let db = Database::new(&config.database_url).await?;
    info!("Database connected (Turso/libSQL)");

    db.run_migrations().await?;
    info!("Database migrations completed");

    let cache: Arc<dyn KvCache> = if config.enable_redis {
        let redis_config = deadpool_redis::Config::from_url(&config.redis_url);
        let pool = redis_config.create_pool(Some(deadpool_redis::Runtime::Tokio1))?;
        info!("Redis connected");
        Arc::new(RedisCache::new(pool))
    } else {
        info!("Redis disabled, OAuth state kept in memory");
        Arc::new(MemoryCache::new())
    };

    let http_client = reqwest::Client::builder()
        .pool_max_idle_per_host(10)
        .tcp_nodelay(true)
        .timeout(Duration::from_secs(60))
        .build()?;

    if config.engine_api_key.is_none() {
        warn!("ENGINE_API_KEY not set, workflows will be saved locally only");
    }
    if config.webhook_secret.is_none() {
        warn!("WEBHOOK_SECRET not set, webhook callbacks are accepted unsigned");
    }

    let addr = SocketAddr::from((config.host.parse::<std::net::IpAddr>()?, config.port));
    let state = Arc::new(AppState::new(config, db, cache, http_client)?);

    let app = routes::create_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CompressionLayer::new())
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any)
                    .max_age(Duration::from_secs(3600)),
            ),
    );

    info!("Server running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
