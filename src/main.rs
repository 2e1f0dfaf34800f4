use std::sync::Arc;

use anyhow::Context;
use crm_sync_backend::config::Config;
use crm_sync_backend::db::postgres_sync_repository::PostgresSyncRepository;
use crm_sync_backend::db::postgres_workflow_run_repository::PostgresWorkflowRunRepository;
use crm_sync_backend::routes::build_router;
use crm_sync_backend::services::clickup::ClickUpClient;
use crm_sync_backend::services::processor::HttpProcessorWaker;
use crm_sync_backend::sync::Synchronizer;
use crm_sync_backend::{worker, AppState};
use reqwest::Client;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            std::process::exit(1);
        }
    };

    let _sentry = config.sentry_dsn.as_deref().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });
    init_tracing(config.sentry_dsn.is_some());

    let pool = establish_connection(&config.database_url).await?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run database migrations")?;

    let http_client = Client::builder()
        .timeout(config.http_timeout)
        .build()
        .context("failed to build HTTP client")?;

    let tracker = Arc::new(ClickUpClient::new(
        http_client.clone(),
        &config.clickup_api_base_url,
        &config.clickup_api_token,
        config.http_timeout,
    ));
    let waker = Arc::new(HttpProcessorWaker::new(
        http_client,
        config.processor_wake_url.clone(),
        config.processor_secret.clone(),
        config.http_timeout,
    ));
    let synchronizer = Synchronizer::new(
        tracker,
        Arc::new(PostgresSyncRepository { pool: pool.clone() }),
        config.sync_settings(),
    );

    let bind_addr = config.bind_addr;
    let sync_interval = config.sync_interval;
    let state = AppState {
        ledger: Arc::new(PostgresWorkflowRunRepository { pool }),
        synchronizer: synchronizer.clone(),
        waker,
        config: Arc::new(config),
    };

    worker::start_background_workers(synchronizer, sync_interval);

    let app = build_router(state);
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!(%bind_addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}

fn init_tracing(with_sentry: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(with_sentry.then(sentry_tracing::layer));
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

/// Establish a connection to the database and verify it.
async fn establish_connection(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .context("failed to connect to the database")?;

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .context("failed to verify database connection")?;

    info!("connected to the database");
    Ok(pool)
}
