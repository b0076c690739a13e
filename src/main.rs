use anyhow::Context;
use axum::{http::HeaderValue, routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hotel_booking::{
    config::Config,
    controllers,
    database::Database,
    services::{
        notification::{LogMailer, Mailer, SmtpMailer},
        payment::PaymentGatewayClient,
    },
    store::PgBookingStore,
    AppState,
};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env().context("Invalid configuration")?;

    let filter = tracing_subscriber::EnvFilter::new(&config.app.rust_log);
    if config.app.log_format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    info!("Starting Hotel Booking API ({})", config.app.environment);

    // Connect to the database
    let db = Database::connect(&config.database)
        .await
        .context("Failed to connect to database")?;
    info!("Database connected");

    db.run_migrations().await.context("Failed to run migrations")?;

    let store = Arc::new(PgBookingStore::new(&db));
    let gateway = Arc::new(
        PaymentGatewayClient::from_config(&config.payment, &config.circuit_breaker)
            .context("Failed to build payment gateway client")?,
    );
    let mailer: Arc<dyn Mailer> = match &config.smtp {
        Some(smtp) => Arc::new(SmtpMailer::from_config(smtp).context("Invalid SMTP settings")?),
        None => {
            warn!("SMTP_HOST is not set, booking emails will only be logged");
            Arc::new(LogMailer)
        }
    };

    // Shared state and background tasks (sweeper, notifications) start here, once
    let (app_state, background) = AppState::start(config.clone(), store, gateway, mailer);

    let cors = CorsLayer::new()
        .allow_origin(
            config
                .cors
                .allowed_origin
                .parse::<HeaderValue>()
                .context("Invalid CORS_ALLOWED_ORIGIN")?,
        )
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(|| async { "Hotel Booking API v1.0" }))
        .merge(controllers::routes())
        .with_state(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.app.host, config.app.port)
        .parse()
        .context("Invalid HOST/PORT")?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped, waiting for background tasks");
    background.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
