use anyhow::{Context, Result};
use serenity::{
    model::{gateway::GatewayIntents, id::ChannelId},
    Client,
};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info, warn};

mod audio;
mod bot;
mod config;
mod error;
mod hub;
mod relay;
mod sources;
mod storage;
mod ui;
mod web;

use crate::audio::{
    output::{SongbirdConnector, SongbirdOutput},
    player::AudioPlayer,
    session::VoiceSessions,
};
use crate::bot::{RelayTuneBot, ShardManagerContainer};
use crate::config::Config;
use crate::hub::HubProvisioner;
use crate::relay::{MessageRelay, RelayRoute};
use crate::sources::{
    spotify::SpotifyClient, youtube::YouTubeClient, CatalogLookup, SmartResolver,
};
use crate::storage::HubChannelStore;
use crate::web::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("relay_tune=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Relay Tune v{}", env!("CARGO_PKG_VERSION"));

    // Sin token no hay nada que hacer: se aborta antes de conectar
    let config = Arc::new(Config::load()?);

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        let version = health_check(&config.ytdlp_path).await?;
        println!("OK (yt-dlp {})", version);
        return Ok(());
    }

    info!("{}", config.summary());

    // Canal hub persistido por servidor
    let store = Arc::new(HubChannelStore::load(config.hub_config_path()).await?);

    // Resolución de tracks: Spotify (opcional) + yt-dlp
    let catalog: Option<Arc<dyn CatalogLookup>> = match config.spotify_credentials() {
        Some((id, secret)) => match SpotifyClient::new(id, secret) {
            Ok(client) => {
                info!("🟢 Spotify habilitado");
                Some(Arc::new(client) as Arc<dyn CatalogLookup>)
            }
            Err(e) => {
                warn!("⚠️ No se pudo inicializar Spotify: {}", e);
                None
            }
        },
        None => {
            info!("ℹ️ Credenciales de Spotify no configuradas, solo búsqueda en YouTube");
            None
        }
    };

    let youtube = YouTubeClient::new(config.ytdlp_path.clone());
    match youtube.verify().await {
        Ok(version) => info!("✅ yt-dlp disponible: {}", version),
        Err(e) => warn!("⚠️ yt-dlp no disponible, la reproducción fallará: {}", e),
    }
    let resolver = Arc::new(SmartResolver::new(catalog, Arc::new(youtube)));

    // Audio: songbird + driver de reproducción
    let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();
    let songbird = Songbird::serenity();
    let output = Arc::new(SongbirdOutput::new(
        Arc::clone(&songbird),
        reqwest::Client::new(),
        events_tx,
    ));
    let player = Arc::new(AudioPlayer::new(
        resolver.clone(),
        output,
        config.default_volume,
    ));
    let sessions = Arc::new(VoiceSessions::new(
        Arc::new(SongbirdConnector::new(Arc::clone(&songbird))),
        Arc::clone(&player),
    ));

    let hub = Arc::new(HubProvisioner::new(store));
    let relay = MessageRelay::new(RelayRoute {
        source: config.source_channel_id.map(ChannelId::new),
        target: config.target_channel_id.map(ChannelId::new),
    });

    let panel = config
        .web_panel_enabled
        .then(|| AppState::new(Arc::clone(&sessions), Arc::clone(&hub)));

    // Intents necesarios: relay, voz y miembros para contar canales
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MEMBERS;

    let handler = RelayTuneBot::new(
        Arc::clone(&config),
        sessions,
        hub,
        relay,
        resolver,
        panel.clone(),
    );

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    client
        .data
        .write()
        .await
        .insert::<ShardManagerContainer>(Arc::clone(&client.shard_manager));

    tokio::spawn(bot::events::run_playback_driver(
        events_rx,
        player,
        Arc::clone(&client.http),
    ));

    if let Some(state) = panel {
        let addr = config.web_panel_addr();
        tokio::spawn(async move {
            if let Err(e) = web::serve(state, &addr).await {
                error!("❌ Error en el panel web: {:?}", e);
            }
        });
    }

    // Iniciar bot
    let shard_manager = Arc::clone(&client.shard_manager);
    info!("🚀 Bot iniciado exitosamente");
    tokio::select! {
        result = client.start() => {
            if let Err(why) = result {
                error!("Error al ejecutar cliente: {:?}", why);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("⚠️ Señal de shutdown recibida, cerrando...");
            shard_manager.shutdown_all().await;
        }
    }

    Ok(())
}

/// Verifica que el extractor configurado responde.
async fn health_check(ytdlp_path: &str) -> Result<String> {
    YouTubeClient::new(ytdlp_path)
        .verify()
        .await
        .with_context(|| format!("yt-dlp no disponible en '{}'", ytdlp_path))
}
