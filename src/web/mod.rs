//! HTTP control panel: JSON status and remote control over the same
//! playback and hub state the chat commands use.

pub mod api;
pub mod error;
pub mod state;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};
use tracing::info;

pub use state::{AppState, BotDirectory, GuildSummary};

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/status", get(api::status))
        .route("/guilds", get(api::guilds))
        .route("/guild/:id/music", get(api::music))
        .route("/guild/:id/music/control", post(api::control))
        .route("/guild/:id/music/volume", post(api::volume))
        .route("/guild/:id/voice-channels", get(api::voice_channels));

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(state: AppState, addr: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding web panel on {addr}"))?;
    info!("🌐 Panel web escuchando en http://{}", addr);

    axum::serve(listener, router(state))
        .await
        .context("web panel server")?;
    Ok(())
}
