use anyhow::{Context, Result};
use tracing::info;

use campus_events_lib::{server, Settings, Variant};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    campus_events_lib::init_tracing(std::io::stderr);

    let settings = Settings::load(Variant::Service)?;
    let addr = settings.server_addr.clone();
    let cors_origin = settings.cors_origin.clone();

    let state = server::AppState::live(settings);
    let app = server::router(state, &cors_origin)?;

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, %cors_origin, "campus events service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutting down");
    }
}
