use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::{AppConfig, EventsConfig};
use crate::rate_limit::RateLimiter;
use crate::{bootstrap, handlers, middleware as app_middleware, realtime};
use stockroom_core::CacheVersionStamp;
use stockroom_core::events::AuditBroadcaster;
use stockroom_db_memory::{InMemoryAuditStore, InMemoryStorage};
use stockroom_engine::{AssignmentEngine, AuditService};
use stockroom_storage::{DynAssetStorage, EventedAuditStore};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: AssignmentEngine,
    pub audit: AuditService,
    pub storage: DynAssetStorage,
    pub broadcaster: Arc<AuditBroadcaster>,
    pub stamp: Arc<CacheVersionStamp>,
    pub limiter: Arc<RateLimiter>,
    pub events: EventsConfig,
    pub base_url: String,
}

/// Wire up storage, engine and services, seed the directories, and build the
/// router.
pub async fn build_app(cfg: &AppConfig) -> anyhow::Result<Router> {
    let storage: DynAssetStorage = InMemoryStorage::new_shared();
    let broadcaster = Arc::new(AuditBroadcaster::with_capacity(cfg.events.buffer_size));
    let audit_store = Arc::new(EventedAuditStore::new(
        InMemoryAuditStore::new(),
        broadcaster.clone(),
    ));
    let audit = AuditService::new(audit_store).with_max_page_size(cfg.events.max_page_size);
    let stamp = CacheVersionStamp::new_shared();
    let engine = AssignmentEngine::new(storage.clone(), audit.clone(), stamp.clone())
        .with_max_attempts(cfg.engine.max_attempts);

    bootstrap::seed_directories(&storage, &cfg.bootstrap).await?;

    let state = AppState {
        engine,
        audit,
        storage,
        broadcaster,
        stamp,
        limiter: Arc::new(RateLimiter::new(cfg.rate_limit.clone())),
        events: cfg.events.clone(),
        base_url: cfg.base_url(),
    };

    Ok(router(state))
}

fn router(state: AppState) -> Router {
    Router::new()
        // Health and info endpoints
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        // Assignment lifecycle
        .route("/assign", post(handlers::assign))
        .route("/release", post(handlers::release))
        .route("/assignments/{id}", get(handlers::get_assignment))
        // Audit ledger and delivery
        .route("/audit/create", post(handlers::audit_create))
        .route("/audit/events", get(handlers::audit_events))
        .route("/audit/events/ws", get(realtime::audit_events_ws))
        .route("/audit/events/{id}", get(handlers::audit_get))
        // Middleware stack
        .layer(middleware::from_fn(app_middleware::request_id))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub struct StockroomServer {
    addr: SocketAddr,
    app: Router,
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    pub async fn build(self) -> anyhow::Result<StockroomServer> {
        let app = build_app(&self.config).await?;
        Ok(StockroomServer {
            addr: self.addr,
            app,
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StockroomServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
