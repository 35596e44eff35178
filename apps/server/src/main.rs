mod db;
mod error;
mod handlers;
mod models;
mod rate_limit;
mod scheduler;

use axum::{
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
    Router,
};
use sqlx::sqlite::SqlitePoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use rate_limit::{rate_limit_export, rate_limit_mutation, rate_limit_public, RateLimiter};
use scheduler::Scheduler;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub scheduler: Scheduler,
    pub mp_access_token: String,
    pub started_at: Instant,
}

/// Rate limit cleanup interval (seconds).
const RATE_LIMIT_CLEANUP_SECS: u64 = 300;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = EnvFilter::from_default_env().add_directive("info".parse()?);
    let fmt_layer = tracing_subscriber::fmt::layer();
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:agenda.db?mode=rwc".into());
    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".into());

    // ── Optional env vars ──
    let mp_access_token = std::env::var("MP_ACCESS_TOKEN").unwrap_or_default();
    let webapp_url = std::env::var("WEBAPP_URL").unwrap_or_default();

    if mp_access_token.is_empty() {
        tracing::warn!("MP_ACCESS_TOKEN not set — checkout will fail");
    }

    // ── Database ──
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    db::run_migrations(&pool).await?;

    let state = Arc::new(AppState {
        db: pool.clone(),
        scheduler: Scheduler::new(pool),
        mp_access_token,
        started_at: Instant::now(),
    });

    // ── Rate limiter + cleanup task ──
    let rate_limiter = RateLimiter::new();
    let cleanup_limiter = rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(tokio::time::Duration::from_secs(RATE_LIMIT_CLEANUP_SECS));
        loop {
            interval.tick().await;
            cleanup_limiter.cleanup();
        }
    });

    // ── CORS: whitelist WEBAPP_URL when configured, otherwise allow any ──
    let cors = if !webapp_url.is_empty() {
        let origin: axum::http::HeaderValue =
            webapp_url.parse().map_err(|_| {
                anyhow::anyhow!("WEBAPP_URL must be a valid origin, got '{}'", webapp_url)
            })?;
        CorsLayer::new()
            .allow_origin(AllowOrigin::list([origin]))
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    // ── Router (4 groups with per-group rate limits) ──

    // 1. No-limit: health check + payment webhook
    let no_limit_routes = Router::new()
        .route("/api/health", get(handlers::health::health))
        .route(
            "/api/checkout/webhook",
            post(handlers::checkout::checkout_webhook),
        );

    // 2. Public reads (60 req/min)
    let public_routes = Router::new()
        .route("/api/clients", get(handlers::clients::list_clients))
        .route(
            "/api/professionals",
            get(handlers::professionals::list_professionals),
        )
        .route("/api/services", get(handlers::services::list_services))
        .route("/api/inventory", get(handlers::inventory::list_inventory))
        .route(
            "/api/appointments",
            get(handlers::appointments::list_appointments),
        )
        .route(
            "/api/appointments/{id}",
            get(handlers::appointments::get_appointment),
        )
        .route(
            "/api/reports/finance",
            get(handlers::reports::finance_summary),
        )
        .layer(from_fn_with_state(rate_limiter.clone(), rate_limit_public));

    // 3. Mutations (30 req/min)
    let mutation_routes = Router::new()
        .route("/api/clients", post(handlers::clients::create_client))
        .route("/api/clients/{id}", put(handlers::clients::update_client))
        .route(
            "/api/clients/{id}",
            delete(handlers::clients::delete_client),
        )
        .route(
            "/api/professionals",
            post(handlers::professionals::create_professional),
        )
        .route(
            "/api/professionals/{id}",
            put(handlers::professionals::update_professional),
        )
        .route(
            "/api/professionals/{id}",
            delete(handlers::professionals::delete_professional),
        )
        .route("/api/services", post(handlers::services::create_service))
        .route(
            "/api/services/{id}",
            put(handlers::services::update_service),
        )
        .route(
            "/api/services/{id}",
            delete(handlers::services::delete_service),
        )
        .route(
            "/api/appointments",
            post(handlers::appointments::create_appointment),
        )
        .route(
            "/api/appointments/{id}",
            put(handlers::appointments::update_appointment),
        )
        .route(
            "/api/appointments/{id}",
            delete(handlers::appointments::delete_appointment),
        )
        .route("/api/inventory", post(handlers::inventory::create_item))
        .route(
            "/api/inventory/{id}",
            put(handlers::inventory::update_item),
        )
        .route(
            "/api/inventory/{id}",
            delete(handlers::inventory::delete_item),
        )
        .route(
            "/api/inventory/import",
            post(handlers::inventory::import_items),
        )
        .route("/api/checkout", post(handlers::checkout::create_checkout))
        .layer(from_fn_with_state(
            rate_limiter.clone(),
            rate_limit_mutation,
        ));

    // 4. Export: builds whole workbooks (10 req/5min)
    let export_routes = Router::new()
        .route("/api/export", get(handlers::export::export))
        .layer(from_fn_with_state(rate_limiter.clone(), rate_limit_export));

    let app = Router::new()
        .merge(no_limit_routes)
        .merge(public_routes)
        .merge(mutation_routes)
        .merge(export_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    let addr = format!("{}:{}", host, port);
    tracing::info!("Agenda server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
