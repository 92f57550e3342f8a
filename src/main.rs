use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gatekeeper::config::AppConfig;
use gatekeeper::infra::audit::LogAuditSink;
use gatekeeper::infra::db;
use gatekeeper::security::config::SecurityConfig;
use gatekeeper::state::AppState;
use gatekeeper::store::PgStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    let security = SecurityConfig::from_env();

    let pool = db::connect().await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let store = Arc::new(PgStore::new(pool));
    let audit = Arc::new(LogAuditSink);
    let state = AppState::new(config, security, store, audit);

    let app = gatekeeper::router(state.clone());
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
