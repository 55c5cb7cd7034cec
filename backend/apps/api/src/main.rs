//! API Server Entry Point
//!
//! Application entry point and server initialization.
//! Uses `anyhow` for startup errors, but request-level
//! errors should use `trial::TrialError` / `kernel::error::AppError`.

mod settings;

use std::net::SocketAddr;

use axum::{
    Router,
    http::{Method, header},
};
use chrono::Duration;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowMethods, Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trial::{
    InMemoryTrialRepository, PgTrialRepository, RateLimiterBackend, StoreHandle, trial_router,
};

use crate::settings::{Settings, StoreKind};

/// Records and rate-limit windows older than this are purged at startup
const RETENTION_HOURS: i64 = 24;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "api=info,trial=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env()?;

    let api = match settings.store {
        StoreKind::Memory => {
            if settings.rate_limit_backend == StoreKind::Postgres {
                anyhow::bail!("RATE_LIMIT_BACKEND=postgres requires TRIAL_STORE=postgres");
            }
            tracing::warn!("Using in-memory trial store; state is lost on restart");
            trial_router(
                StoreHandle::configured(InMemoryTrialRepository::new()),
                RateLimiterBackend::memory(),
                settings.trial.clone(),
            )
        }
        StoreKind::Postgres => match settings.database_url.as_deref() {
            Some(database_url) => {
                let repo = connect_postgres(database_url, &settings).await?;
                let rate_limiter = match settings.rate_limit_backend {
                    StoreKind::Postgres => RateLimiterBackend::Postgres(repo.clone()),
                    StoreKind::Memory => RateLimiterBackend::memory(),
                };
                tracing::info!(backend = rate_limiter.name(), "Rate limiter ready");
                trial_router(
                    StoreHandle::configured(repo),
                    rate_limiter,
                    settings.trial.clone(),
                )
            }
            None => {
                tracing::warn!("DATABASE_URL not set; trial endpoints will report not configured");
                trial_router(
                    StoreHandle::<PgTrialRepository>::NotConfigured,
                    RateLimiterBackend::memory(),
                    settings.trial.clone(),
                )
            }
        },
    };

    // Public trial endpoint: any origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(AllowMethods::list([
            Method::GET,
            Method::POST,
            Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::list([header::CONTENT_TYPE]));

    // Static UI, with index.html for unknown paths
    let static_files = ServeDir::new(&settings.static_dir)
        .not_found_service(ServeFile::new(settings.static_dir.join("index.html")));

    // Build router
    let app = Router::new()
        .nest("/api", api)
        .fallback_service(static_files)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    tracing::info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Connect, migrate and purge old data
async fn connect_postgres(
    database_url: &str,
    settings: &Settings,
) -> anyhow::Result<PgTrialRepository> {
    let pool = PgPoolOptions::new()
        .max_connections(settings.database_max_connections)
        .connect(database_url)
        .await?;

    tracing::info!("Connected to database");

    // Run migrations
    sqlx::migrate!("../../../database/migrations")
        .run(&pool)
        .await?;

    tracing::info!("Migrations completed");

    let repo = PgTrialRepository::new(pool);

    // Startup cleanup: errors here should not prevent server startup
    match repo.cleanup_expired(Duration::hours(RETENTION_HOURS)).await {
        Ok((records, rate_limits)) => {
            tracing::info!(
                records_deleted = records,
                rate_limits_deleted = rate_limits,
                "Trial data cleanup completed"
            );
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Trial data cleanup failed, continuing anyway"
            );
        }
    }

    Ok(repo)
}
