use std::sync::Arc;

use axum::{http::HeaderValue, routing::get};
use axum_prometheus::PrometheusMetricLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lopbox_server::config::Config;
use lopbox_server::db;
use lopbox_server::routes::build_router;
use lopbox_server::scrape::ScrapeService;
use lopbox_server::state::AppState;

#[tokio::main]
async fn main() {
    // JSON logs in production, human-readable in dev.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "lopbox_server=info,tower_http=info,sqlx=warn"
            .parse()
            .unwrap()
    });

    if std::env::var("APP_ENV").as_deref() == Ok("production") {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("🚀 Lopbox Server starting...");

    let config = Config::from_env().expect("Failed to load configuration");
    info!("📝 Configuration loaded");

    let pool = db::create_pool(&config)
        .await
        .expect("Failed to create database pool");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run database migrations");
    info!("✅ Database migrations applied");

    db::health_check(&pool)
        .await
        .expect("Database health check failed");
    info!("✅ Database health check passed");

    if config.admin_secret_key.is_none() {
        tracing::warn!("ADMIN_SECRET_KEY not set, admin self-registration is disabled");
    }

    // The browser itself is launched on the first dynamic scrape.
    let scraper = Arc::new(
        ScrapeService::with_chrome(config.chrome_executable.clone())
            .expect("Failed to initialise metadata scraper"),
    );

    let cors = if config.is_dev {
        info!("🔓 CORS: permissive (dev mode)");
        CorsLayer::permissive()
    } else if config.allowed_origins.is_empty() {
        tracing::warn!(
            "🔒 CORS: restrictive (production mode). \
             Cross-origin requests will be denied. \
             Set ALLOWED_ORIGINS to allow specific origins."
        );
        CorsLayer::new()
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| match o.parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!("Ignoring invalid CORS origin: {}", o);
                    None
                }
            })
            .collect();
        info!("🔒 CORS: {} allowed origin(s)", origins.len());
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let addr = config.server_addr();

    let app_state = AppState {
        pool,
        jwt_secret: Arc::from(config.jwt_secret),
        jwt_expiry_minutes: config.jwt_expiry_minutes,
        admin_secret_key: config.admin_secret_key.map(Arc::from),
        scraper: scraper.clone(),
    };

    let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();

    let app = build_router(app_state)
        .route(
            "/metrics",
            get(move || async move { metric_handle.render() }),
        )
        .layer(TraceLayer::new_for_http())
        .layer(prometheus_layer)
        .layer(cors);

    info!("🎧 Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server failed to start");

    info!("Shutting down metadata scraper");
    scraper.shutdown().await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
