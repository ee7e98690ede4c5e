//! PlasmaHub API Gateway
//!
//! The entry point for all external API requests. Handles:
//! - Bearer JWT authentication
//! - Provider search proxying (Google Scholar, PubMed, USPTO)
//! - Paper library persistence and deduplication
//! - LLM analysis operations
//! - Observability (logging, metrics, request IDs)

mod handlers;
mod middleware;

use axum::{
    extract::FromRef,
    routing::{delete, get, post, put},
    Router,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use plasmahub_common::{
    auth::JwtManager,
    config::AppConfig,
    db::DbPool,
    llm::LlmClient,
    metrics,
    providers::{PubMedProvider, ScholarProvider, UsptoProvider},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Upstream provider clients, built once at startup. A provider whose API
/// key is missing stays `None` and its endpoint reports a configuration
/// error instead of failing the whole service.
pub struct ProviderRegistry {
    pub scholar: Option<ScholarProvider>,
    pub pubmed: PubMedProvider,
    pub uspto: Option<UsptoProvider>,
}

impl ProviderRegistry {
    fn new(config: &AppConfig) -> anyhow::Result<Self> {
        let scholar = if config.providers.serpapi_key.is_some() {
            Some(ScholarProvider::new(&config.providers)?)
        } else {
            warn!("providers.serpapi_key not set - Google Scholar search disabled");
            None
        };

        let uspto = if config.providers.patentsview_key.is_some() {
            Some(UsptoProvider::new(&config.providers)?)
        } else {
            warn!("providers.patentsview_key not set - USPTO search disabled");
            None
        };

        Ok(Self {
            scholar,
            pubmed: PubMedProvider::new(&config.providers)?,
            uspto,
        })
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DbPool,
    pub jwt: JwtManager,
    pub llm: LlmClient,
    pub providers: Arc<ProviderRegistry>,
    pub prometheus: PrometheusHandle,
}

impl FromRef<AppState> for JwtManager {
    fn from_ref(state: &AppState) -> Self {
        state.jwt.clone()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.observability.log_level.clone()));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    if config.observability.json_logging {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!("Starting PlasmaHub API Gateway v{}", plasmahub_common::VERSION);

    let config = Arc::new(config);

    // Initialize metrics
    let prometheus = PrometheusBuilder::new().install_recorder()?;
    metrics::register_metrics();

    // Initialize database connection
    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;

    // Build shared clients
    let jwt = JwtManager::new(&config.auth.jwt_secret, config.auth.jwt_audience.as_deref());
    let llm = LlmClient::new(&config.llm)?;
    let providers = Arc::new(ProviderRegistry::new(&config)?);

    // Create app state
    let state = AppState {
        config: config.clone(),
        db,
        jwt,
        llm,
        providers,
        prometheus,
    };

    // Build the router
    let app = create_router(state, &config);

    // Start the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState, config: &AppConfig) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // API routes
    let api_routes = Router::new()
        // Provider search endpoints
        .route("/scholar", get(handlers::search::scholar_search))
        .route("/pubmed/search", get(handlers::search::pubmed_search))
        .route("/uspto/search", post(handlers::search::uspto_search))
        // Paper library endpoints
        .route("/papers/save", post(handlers::papers::save_papers))
        .route("/saved-papers", get(handlers::papers::list_papers))
        .route("/papers/{id}", get(handlers::papers::get_paper))
        .route("/papers/{id}", delete(handlers::papers::delete_paper))
        // LLM analysis endpoints
        .route("/analyze-papers", post(handlers::analysis::analyze_papers))
        .route("/research-analysis", post(handlers::analysis::research_analysis))
        .route("/generate-introduction", post(handlers::analysis::generate_introduction))
        .route("/generate-paper-plan", post(handlers::analysis::generate_paper_plan))
        .route("/analyses", get(handlers::analysis::list_analyses))
        .route("/introductions", get(handlers::analysis::list_introductions))
        .route("/paper-plans", get(handlers::analysis::list_plans))
        // Trend aggregation
        .route("/trends", get(handlers::trends::get_trends))
        // Search history
        .route("/search-history", get(handlers::history::list_history))
        // Settings
        .route("/settings", get(handlers::settings::list_settings))
        .route("/settings/{key}", get(handlers::settings::get_setting))
        .route("/settings/{key}", put(handlers::settings::put_setting));

    let mut app = Router::new()
        // Health and metrics endpoints (no auth)
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .route("/metrics", get(handlers::health::prometheus_metrics))
        .nest("/api", api_routes);

    if config.rate_limit.enabled {
        app = app.layer(axum::middleware::from_fn_with_state(
            middleware::rate_limit::RateLimitState::new(&config.rate_limit),
            middleware::rate_limit::rate_limit,
        ));
    }

    app.layer(axum::middleware::from_fn(middleware::metrics::track_requests))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
